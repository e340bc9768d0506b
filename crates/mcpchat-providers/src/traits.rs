//! Provider trait definitions.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use mcpchat_core::{FunctionDeclaration, Message, ToolCall};
use serde::{Deserialize, Serialize};

/// Request for a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    /// Full conversation, system message included
    pub messages: Vec<Message>,
    /// Functions the model may call; empty disables function calling
    #[serde(default)]
    pub functions: Vec<FunctionDeclaration>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            functions: Vec::new(),
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_functions(mut self, functions: Vec<FunctionDeclaration>) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Response from a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Text of the reply; absent when the model only requested calls
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

impl CompletionResponse {
    /// A plain text reply.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
        }
    }

    /// A reply requesting function calls.
    pub fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls,
            finish_reason: FinishReason::ToolUse,
            usage: Usage::default(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Reason the completion finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    /// Hit max tokens limit
    MaxTokens,
    /// Function calls requested
    ToolUse,
    ContentFilter,
}

impl FinishReason {
    pub(crate) fn from_wire(reason: &str) -> Self {
        match reason {
            "length" => FinishReason::MaxTokens,
            "tool_calls" | "function_call" => FinishReason::ToolUse,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        }
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Text deltas of a streamed reply, in arrival order.
pub type TextStream = Pin<Box<dyn Stream<Item = anyhow::Result<String>> + Send>>;

/// An LLM backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identifier, used in logs and errors.
    fn id(&self) -> &str;

    /// Check if provider is configured and ready.
    fn is_configured(&self) -> bool;

    /// Send the conversation and wait for the whole reply.
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<CompletionResponse>;

    /// Send the conversation and stream the reply text.
    async fn complete_stream(&self, request: CompletionRequest) -> anyhow::Result<TextStream>;
}
