//! # mcpchat-mcp
//!
//! MCP (Model Context Protocol) client side of mcpchat.
//!
//! This crate provides:
//! - Newline-delimited JSON-RPC over a subprocess's stdio
//! - [`ServerConnection`], one supervised session per tool server
//! - [`RetryPolicy`] for tool invocation
//! - [`ConnectionRegistry`], the named set of connections
//! - Text renderings of tools and results for prompts and front-ends

pub mod catalog;
pub mod connection;
pub mod descriptor;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod retry;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{execute_to_text, render_capability_catalog, render_server_tools};
pub use connection::{ConnectionState, ServerConnection};
pub use descriptor::{ResourceDescriptor, ToolDescriptor, ToolParameter};
pub use error::{McpError, TransportError};
pub use protocol::{CallToolResult, ResourceContents, ToolContent};
pub use registry::{ConnectionRegistry, StartReport, ToolHost};
pub use retry::{RetryError, RetryPolicy};
pub use transport::{LaunchSpec, Launcher, StdioLauncher, StdioTransport, Transport};
