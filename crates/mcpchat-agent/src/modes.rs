//! Mediator modes.

use serde::{Deserialize, Serialize};

/// How the LLM signals that it wants a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediatorMode {
    /// Function-calling channel of the backend
    #[default]
    Structured,
    /// Tagged block at the start of a streamed reply
    Streaming,
}
