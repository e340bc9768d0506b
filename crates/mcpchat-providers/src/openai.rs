//! OpenAI-compatible chat completions provider (OpenRouter by default).

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use mcpchat_core::{LlmConfig, Message, ProviderError, Role, ToolCall};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use crate::sse::{SseDecoder, SseEvent};
use crate::traits::{
    CompletionRequest, CompletionResponse, FinishReason, Provider, TextStream, Usage,
};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

const PROVIDER_ID: &str = "openai";

/// Provider speaking the OpenAI chat completions wire format.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
    site_url: Option<String>,
    site_name: Option<String>,
}

impl OpenAIProvider {
    /// Create a new provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: LlmConfig::default().model,
            site_url: None,
            site_name: None,
        }
    }

    /// Build from the `[llm]` config section.
    pub fn from_config(config: &LlmConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .resolve_api_key()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ProviderError::NotConfigured {
                provider: PROVIDER_ID.to_string(),
                env_var: config.api_key_env.clone(),
            })?;

        let mut provider = Self::new(api_key)
            .with_base_url(&config.base_url)
            .with_default_model(&config.model);
        provider.site_url = config.site_url.clone();
        provider.site_name = config.site_name.clone();
        Ok(provider)
    }

    /// Set a custom base URL. A trailing slash is dropped.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model used when a request names none.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Set the attribution headers OpenRouter uses for rankings.
    pub fn with_site(mut self, url: impl Into<String>, name: impl Into<String>) -> Self {
        self.site_url = Some(url.into());
        self.site_name = Some(name.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> ChatRequest {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        let (tools, tool_choice) = if request.functions.is_empty() {
            (None, None)
        } else {
            let tools = request
                .functions
                .iter()
                .map(|f| ChatTool {
                    tool_type: "function".to_string(),
                    function: ChatFunction {
                        name: f.name.clone(),
                        description: f.description.clone(),
                        parameters: f.parameters.clone(),
                    },
                })
                .collect();
            (Some(tools), Some("auto".to_string()))
        };

        ChatRequest {
            model,
            messages: request.messages.iter().map(convert_message).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools,
            tool_choice,
            stream,
        }
    }

    fn post(&self, body: &ChatRequest) -> RequestBuilder {
        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");

        if let Some(ref url) = self.site_url {
            req = req.header("HTTP-Referer", url);
        }
        if let Some(ref name) = self.site_name {
            req = req.header("X-Title", name);
        }
        req.json(body)
    }

    async fn send(&self, body: &ChatRequest) -> anyhow::Result<reqwest::Response> {
        let response = self.post(body).send().await.map_err(|e| ProviderError::NetworkError {
            provider: PROVIDER_ID.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_text, "Chat completion request failed");
            return Err(status_error(status, error_text).into());
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<CompletionResponse> {
        let body = self.build_request(&request, false);
        debug!(messages = body.messages.len(), functions = request.functions.len(), "Sending chat completion");

        let response = self.send(&body).await?;
        let api_response: ChatResponse = response.json().await?;
        Ok(parse_response(api_response)?)
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete_stream(&self, request: CompletionRequest) -> anyhow::Result<TextStream> {
        let body = self.build_request(&request, true);
        debug!(messages = body.messages.len(), "Sending streaming chat completion");

        let response = self.send(&body).await?;
        let byte_stream = response.bytes_stream();

        // One network chunk can complete several events; the queue holds the
        // deltas not yet handed out.
        let text_stream = stream::unfold(
            (byte_stream, SseDecoder::new(), VecDeque::new(), false),
            |(mut byte_stream, mut decoder, mut pending, mut done)| async move {
                loop {
                    if let Some(delta) = pending.pop_front() {
                        return Some((Ok(delta), (byte_stream, decoder, pending, done)));
                    }
                    if done {
                        return None;
                    }

                    let events = match byte_stream.next().await {
                        Some(Ok(bytes)) => decoder.feed(&bytes),
                        Some(Err(e)) => {
                            done = true;
                            let err = ProviderError::StreamError {
                                provider: PROVIDER_ID.to_string(),
                                message: e.to_string(),
                            };
                            return Some((Err(anyhow::Error::from(err)), (byte_stream, decoder, pending, done)));
                        }
                        None => {
                            done = true;
                            decoder.finish().into_iter().collect()
                        }
                    };

                    for event in events {
                        match event {
                            SseEvent::Done => {
                                done = true;
                                break;
                            }
                            SseEvent::Data(data) => match parse_stream_delta(&data) {
                                Ok(Some(delta)) => pending.push_back(delta),
                                Ok(None) => {}
                                Err(e) => warn!(error = %e, "Skipping malformed stream event"),
                            },
                        }
                    }
                }
            },
        );

        Ok(Box::pin(text_stream))
    }
}

fn status_error(status: StatusCode, body: String) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthenticationFailed {
            provider: PROVIDER_ID.to_string(),
            message: body,
        },
        _ => ProviderError::api_error(PROVIDER_ID, status.as_u16(), body),
    }
}

fn convert_message(message: &Message) -> ChatMessage {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
        Role::Tool => "tool",
    };

    let tool_calls = if message.tool_calls.is_empty() {
        None
    } else {
        Some(
            message
                .tool_calls
                .iter()
                .map(|tc| ChatToolCall {
                    id: tc.id.clone(),
                    tool_type: "function".to_string(),
                    function: ChatFunctionCall {
                        name: tc.name.clone(),
                        arguments: tc.arguments.clone(),
                    },
                })
                .collect(),
        )
    };

    ChatMessage {
        role: role.to_string(),
        content: Some(message.content.clone()),
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
        name: message.name.clone(),
    }
}

fn parse_response(response: ChatResponse) -> Result<CompletionResponse, ProviderError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::EmptyResponse {
            provider: PROVIDER_ID.to_string(),
        })?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCall::new(tc.id, tc.function.name, tc.function.arguments))
        .collect();

    let finish_reason = choice
        .finish_reason
        .as_deref()
        .map(FinishReason::from_wire)
        .unwrap_or(FinishReason::Stop);

    let usage = response
        .usage
        .map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        content: choice.message.content,
        tool_calls,
        finish_reason,
        usage,
    })
}

/// Text delta of one stream event, if it carries any.
fn parse_stream_delta(data: &str) -> Result<Option<String>, serde_json::Error> {
    let chunk: StreamChunkResponse = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|text| !text.is_empty()))
}

// Wire types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    tool_type: String,
    function: ChatFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamChunkResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
