//! # mcpchat-agent
//!
//! Tool-call mediation for mcpchat.
//!
//! This crate provides:
//! - [`ToolCallMediator`] in structured (function-calling) and streaming modes
//! - The closed [`BridgeFunction`] set declared to the LLM
//! - [`TaggedBlockParser`] for tool calls embedded in streamed replies

pub mod bridge;
pub mod mediator;
pub mod modes;
pub mod tagged;

pub use bridge::{BridgeFunction, ExecuteToolArgs, ListToolsArgs};
pub use mediator::{
    MediatorBuilder, MediatorConfig, MediatorError, MediatorResult, ToolCallMediator, TurnState,
    SYSTEM_PROMPT, TAGGED_CALL_PROMPT,
};
pub use modes::MediatorMode;
pub use tagged::{TaggedBlockParser, TaggedCall, CLOSE_DELIMITER, OPEN_DELIMITER};
