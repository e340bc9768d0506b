//! # mcpchat-core
//!
//! Core types shared by the mcpchat crates.
//!
//! This crate provides:
//! - Conversation primitives (roles, messages, the append-only conversation)
//! - Tool-call and function-declaration types for the LLM function channel
//! - Layered configuration (LLM backend, retry policy, tool servers)
//! - Common error types

pub mod config;
pub mod error;
pub mod message;
pub mod tool;

pub use config::{Config, LlmConfig, RetryConfig, ServerConfig};
pub use error::{Error, ProviderError, Result};
pub use message::{Conversation, Message, Role};
pub use tool::{FunctionDeclaration, ToolCall};
