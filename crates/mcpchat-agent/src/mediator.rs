//! Tool-call mediation between an LLM conversation and the tool servers.
//!
//! The [`ToolCallMediator`] owns the conversation and drives one turn at a
//! time:
//!
//! ```text
//! AwaitingUserInput -> SentToBackend -> PlainAnswer ----------------------------> AnswerReady
//!                                    -> ToolCallDetected -> ToolExecuted
//!                                                        -> SentFollowUp -------> AnswerReady
//! (any failure after SentToBackend) -----------------------------------------> AnswerFailed
//! ```
//!
//! Structured mode relies on the backend's function-calling channel and the
//! [`BridgeFunction`] set. Streaming mode relies on the tagged-block
//! convention parsed by [`TaggedBlockParser`].

use std::sync::Arc;

use async_stream::stream;
use futures::{Stream, StreamExt};
use mcpchat_core::{Conversation, LlmConfig, Message, ToolCall};
use mcpchat_mcp::{render_capability_catalog, McpError, ToolHost};
use mcpchat_providers::{CompletionRequest, Provider};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::bridge::BridgeFunction;
use crate::modes::MediatorMode;
use crate::tagged::{TaggedBlockParser, CLOSE_DELIMITER};

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised inside a mediated turn.
#[derive(Error, Debug)]
pub enum MediatorError {
    /// Function-call arguments were not valid JSON for the function.
    #[error("malformed arguments for '{function}': {source}")]
    ArgumentDecode {
        function: String,
        #[source]
        source: serde_json::Error,
    },

    /// The LLM backend could not be reached or answered with an error.
    #[error("backend communication failed: {0}")]
    Backend(#[from] anyhow::Error),

    /// A streamed reply opened a tool-call block that could not be decoded.
    #[error("malformed tool call block: {0}")]
    TaggedCall(String),

    /// The tool host rejected or failed the call.
    #[error("{0}")]
    Dispatch(#[from] McpError),

    #[error("Function {0} not found.")]
    UnknownFunction(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// A turn was started through the entry point of the other mode.
    #[error("mediator is in {0:?} mode")]
    ModeMismatch(MediatorMode),
}

impl From<MediatorError> for mcpchat_core::Error {
    fn from(e: MediatorError) -> Self {
        match e {
            MediatorError::Dispatch(inner) => inner.into(),
            other => mcpchat_core::Error::Mediator(other.to_string()),
        }
    }
}

pub type MediatorResult<T> = Result<T, MediatorError>;

// ============================================================================
// Configuration
// ============================================================================

/// Base instructions placed at the top of the priming message.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant with access to MCP(Model Context Protocol) Servers.\
MCP is a powerful protocol allows you to interact with other tools. MCP Servers provide different tools.\
You can use the function execute_tool, with 'server name', 'tool name' and 'arguments', to access other tools.\
After receiving a tool's response, transform the raw data into a natural, conversational response.";

/// Extra instructions for streaming mode.
pub const TAGGED_CALL_PROMPT: &str = "If you want to use MCP tool, your response should start with <MCP_CALL>, \
and a JSON string in following format.\n\
{    \"server\": <server_name>,    \"tool\": <tool_name>,    \"args\": <JSON_string_args>}\n\
IMPORTANT: DO NOT contain any other message if you want to use other tool";

/// Configuration for the mediator.
#[derive(Debug, Clone)]
pub struct MediatorConfig {
    /// Model identifier; empty means the provider's default.
    pub model: String,
    pub system_prompt: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            max_tokens: None,
            temperature: None,
        }
    }
}

impl MediatorConfig {
    /// Take model and sampling settings from the `[llm]` section.
    pub fn from_llm(llm: &LlmConfig) -> Self {
        Self {
            model: llm.model.clone(),
            max_tokens: llm.max_tokens,
            temperature: llm.temperature,
            ..Default::default()
        }
    }
}

/// Where the current (or last) turn stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingUserInput,
    SentToBackend,
    PlainAnswer,
    ToolCallDetected,
    ToolExecuted,
    SentFollowUp,
    AnswerReady,
    AnswerFailed,
}

impl TurnState {
    /// Between `SentToBackend` and the final answer.
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            Self::SentToBackend | Self::ToolCallDetected | Self::ToolExecuted | Self::SentFollowUp
        )
    }
}

// ============================================================================
// Mediator
// ============================================================================

/// Bridges conversational turns with tool execution.
pub struct ToolCallMediator {
    provider: Arc<dyn Provider>,
    host: Arc<dyn ToolHost>,
    config: MediatorConfig,
    mode: MediatorMode,
    conversation: Conversation,
    turn_state: TurnState,
}

impl ToolCallMediator {
    /// Create a mediator with default configuration.
    pub fn new(provider: Arc<dyn Provider>, host: Arc<dyn ToolHost>, mode: MediatorMode) -> Self {
        Self {
            provider,
            host,
            config: MediatorConfig::default(),
            mode,
            conversation: Conversation::new(),
            turn_state: TurnState::AwaitingUserInput,
        }
    }

    pub fn builder() -> MediatorBuilder {
        MediatorBuilder::new()
    }

    pub fn mode(&self) -> MediatorMode {
        self.mode
    }

    pub fn config(&self) -> &MediatorConfig {
        &self.config
    }

    /// The conversation so far.
    pub fn history(&self) -> &Conversation {
        &self.conversation
    }

    /// Drop the whole conversation, priming message included.
    pub fn clear_history(&mut self) {
        self.conversation.clear();
        self.turn_state = TurnState::AwaitingUserInput;
    }

    /// State reached by the latest turn. A turn whose stream was dropped
    /// early keeps the in-progress state it stopped at until the next turn
    /// begins.
    pub fn last_turn_state(&self) -> TurnState {
        self.turn_state
    }

    /// Each mode has exactly one entry point; the priming message differs
    /// between them.
    fn begin_turn(&mut self, mode: MediatorMode) -> MediatorResult<()> {
        if self.mode != mode {
            return Err(MediatorError::ModeMismatch(self.mode));
        }
        if self.turn_state.is_in_progress() {
            warn!(state = ?self.turn_state, "Previous turn was abandoned before it finished");
        }
        self.turn_state = TurnState::AwaitingUserInput;
        Ok(())
    }

    /// Append the capability-priming system message.
    ///
    /// No-op (returns `false`) when the conversation already has messages.
    pub async fn prime(&mut self) -> bool {
        if !self.conversation.is_empty() {
            return false;
        }

        let servers = self.host.list_servers();
        let catalog = render_capability_catalog(self.host.as_ref()).await;
        let prompt = match self.mode {
            MediatorMode::Structured => self.config.system_prompt.clone(),
            MediatorMode::Streaming => format!("{}{}", self.config.system_prompt, TAGGED_CALL_PROMPT),
        };

        debug!(servers = servers.len(), "Priming conversation");
        self.conversation
            .prime(format!("{}\nAvailable MCP servers: {:?}\n{}", prompt, servers, catalog))
    }

    fn request(&self, with_functions: bool) -> CompletionRequest {
        let request = CompletionRequest::new(&self.config.model, self.conversation.messages().to_vec())
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature);
        if with_functions {
            request.with_functions(BridgeFunction::declarations())
        } else {
            request
        }
    }

    // ------------------------------------------------------------------------
    // Structured mode
    // ------------------------------------------------------------------------

    /// Run one turn over the function-calling channel.
    ///
    /// Returns the final answer, or `None` when the backend failed or the
    /// mediator is in streaming mode; the failure is logged and the history
    /// keeps what was appended before it.
    pub async fn send_message(&mut self, content: &str) -> Option<String> {
        match self.run_structured(content).await {
            Ok(answer) => {
                self.turn_state = TurnState::AnswerReady;
                Some(answer)
            }
            Err(e) => {
                error!(error = %e, "Error communicating with LLM");
                self.turn_state = TurnState::AnswerFailed;
                None
            }
        }
    }

    async fn run_structured(&mut self, content: &str) -> MediatorResult<String> {
        self.begin_turn(MediatorMode::Structured)?;
        self.prime().await;
        self.conversation.push(Message::user(content));

        self.turn_state = TurnState::SentToBackend;
        let response = self.provider.complete(self.request(true)).await?;

        if !response.has_tool_calls() {
            self.turn_state = TurnState::PlainAnswer;
            let answer = response.content.unwrap_or_default();
            self.conversation.push(Message::assistant(&answer));
            return Ok(answer);
        }

        self.turn_state = TurnState::ToolCallDetected;
        let mut results = Vec::with_capacity(response.tool_calls.len());
        for call in &response.tool_calls {
            let text = self.call_bridge(call).await;
            results.push(Message::tool_result(call, text));
        }

        self.conversation.push(Message::assistant_with_calls(
            response.content.unwrap_or_default(),
            response.tool_calls,
        ));
        for result in results {
            self.conversation.push(result);
        }
        self.turn_state = TurnState::ToolExecuted;

        self.turn_state = TurnState::SentFollowUp;
        let follow_up = self.provider.complete(self.request(false)).await?;
        let answer = follow_up.content.unwrap_or_default();
        self.conversation.push(Message::assistant(&answer));
        Ok(answer)
    }

    /// Dispatch one function call; every failure becomes result text.
    async fn call_bridge(&self, call: &ToolCall) -> String {
        let function = match call.name.parse::<BridgeFunction>() {
            Ok(function) => function,
            Err(e) => {
                warn!(function = %call.name, "Backend requested an unknown function");
                return format!("Error: {}", e);
            }
        };

        info!(function = %function, args = %call.arguments, "Call function");
        match function.dispatch(self.host.as_ref(), call).await {
            Ok(text) => text,
            Err(e) => {
                let text = format!("Error calling function {}: {}", call.name, e);
                error!(function = %call.name, error = %e, "Function call failed");
                text
            }
        }
    }

    // ------------------------------------------------------------------------
    // Streaming mode
    // ------------------------------------------------------------------------

    /// Run one turn in streaming mode, yielding reply text as it arrives.
    ///
    /// A reply opening with the tagged block is relayed too; after the tool
    /// runs, [`CLOSE_DELIMITER`] and a newline are yielded, followed by the
    /// follow-up reply. Failures end the stream early and are logged, and so
    /// does calling this on a mediator in structured mode. Dropping the
    /// stream abandons the turn where it stands.
    pub fn send_message_stream<'a>(&'a mut self, content: &str) -> impl Stream<Item = String> + Send + 'a {
        let content = content.to_string();

        stream! {
            if let Err(e) = self.begin_turn(MediatorMode::Streaming) {
                self.fail(e);
                return;
            }
            self.prime().await;
            self.conversation.push(Message::user(content));

            self.turn_state = TurnState::SentToBackend;
            let mut fragments = match self.provider.complete_stream(self.request(false)).await {
                Ok(fragments) => fragments,
                Err(e) => {
                    self.fail(e.into());
                    return;
                }
            };

            let mut parser = TaggedBlockParser::new();
            while let Some(item) = fragments.next().await {
                match item {
                    Ok(fragment) => {
                        if let Some(text) = parser.push(&fragment) {
                            yield text;
                        }
                    }
                    Err(e) => {
                        self.fail(e.into());
                        return;
                    }
                }
            }
            if let Some(text) = parser.finish() {
                yield text;
            }
            self.conversation.push(Message::assistant(parser.text()));

            let call = match parser.tool_call() {
                Ok(Some(call)) => call,
                Ok(None) => {
                    self.turn_state = TurnState::PlainAnswer;
                    self.turn_state = TurnState::AnswerReady;
                    return;
                }
                Err(e) => {
                    self.fail(e);
                    return;
                }
            };

            self.turn_state = TurnState::ToolCallDetected;
            info!(server = %call.server, tool = %call.tool, "Tagged tool call");
            let follow_up = match self.host.execute_tool(&call.server, &call.tool, call.args).await {
                Ok(result) => format!("The tool result: {}", result),
                Err(e) => {
                    error!(server = %call.server, tool = %call.tool, error = %e, "Tagged tool call failed");
                    format!("The tool call failed: {}", e)
                }
            };
            self.conversation.push(Message::user(follow_up));
            self.turn_state = TurnState::ToolExecuted;
            yield format!("{}\n", CLOSE_DELIMITER);

            self.turn_state = TurnState::SentFollowUp;
            let mut fragments = match self.provider.complete_stream(self.request(false)).await {
                Ok(fragments) => fragments,
                Err(e) => {
                    self.fail(e.into());
                    return;
                }
            };

            let mut answer = String::new();
            while let Some(item) = fragments.next().await {
                match item {
                    Ok(fragment) => {
                        answer.push_str(&fragment);
                        yield fragment;
                    }
                    Err(e) => {
                        self.fail(e.into());
                        return;
                    }
                }
            }
            self.conversation.push(Message::assistant(answer));
            self.turn_state = TurnState::AnswerReady;
        }
    }

    fn fail(&mut self, e: MediatorError) {
        error!(error = %e, "Turn failed");
        self.turn_state = TurnState::AnswerFailed;
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`ToolCallMediator`].
pub struct MediatorBuilder {
    provider: Option<Arc<dyn Provider>>,
    host: Option<Arc<dyn ToolHost>>,
    config: MediatorConfig,
    mode: MediatorMode,
}

impl Default for MediatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MediatorBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            host: None,
            config: MediatorConfig::default(),
            mode: MediatorMode::default(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn host(mut self, host: Arc<dyn ToolHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn mode(mut self, mode: MediatorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn config(mut self, config: MediatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn build(self) -> MediatorResult<ToolCallMediator> {
        let provider = self
            .provider
            .ok_or_else(|| MediatorError::NotConfigured("provider is required".to_string()))?;
        let host = self
            .host
            .ok_or_else(|| MediatorError::NotConfigured("tool host is required".to_string()))?;

        Ok(ToolCallMediator {
            provider,
            host,
            config: self.config,
            mode: self.mode,
            conversation: Conversation::new(),
            turn_state: TurnState::AwaitingUserInput,
        })
    }
}
