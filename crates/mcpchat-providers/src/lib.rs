//! # mcpchat-providers
//!
//! LLM backend abstraction for mcpchat.
//!
//! This crate provides:
//! - [`Provider`] trait with structured and streaming completions
//! - [`OpenAIProvider`] for OpenAI-compatible endpoints such as OpenRouter
//! - Incremental SSE decoding

pub mod openai;
pub mod sse;
pub mod traits;

pub use openai::OpenAIProvider;
pub use traits::{
    CompletionRequest, CompletionResponse, FinishReason, Provider, TextStream, Usage,
};
