//! MCP-specific error types.

use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to spawn the child process.
    #[error("failed to spawn process: {0}")]
    SpawnFailed(std::io::Error),

    #[error("write error: {0}")]
    WriteError(std::io::Error),

    #[error("read error: {0}")]
    ReadError(std::io::Error),

    /// The peer closed its end of the stream.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("not connected")]
    NotConnected,

    #[error("failed to terminate process: {0}")]
    TerminateFailed(std::io::Error),
}

/// Errors that can occur during MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Bad or unresolvable server command.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Spawn or handshake failure.
    #[error("connection to '{server}' failed: {source}")]
    Connection {
        server: String,
        #[source]
        source: Box<McpError>,
    },

    /// Operation attempted before the connection reached `Ready`.
    #[error("server '{server}' is not initialized (state: {state})")]
    NotInitialized { server: String, state: String },

    #[error("unknown server: {0}")]
    UnknownServer(String),

    /// Every retry attempt failed; `source` is the last failure.
    #[error("tool '{tool}' failed after {attempts} attempt(s): {source}")]
    ToolExecution {
        tool: String,
        attempts: u32,
        #[source]
        source: Box<McpError>,
    },

    #[error("invalid resource URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Malformed or unexpected protocol message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON-RPC error object returned by the server.
    #[error("server error (code {code}): {message}")]
    ServerError { code: i32, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// One or more connections failed to clean up.
    #[error("shutdown failed for {}", format_failures(.0))]
    Shutdown(Vec<(String, McpError)>),
}

fn format_failures(failures: &[(String, McpError)]) -> String {
    failures
        .iter()
        .map(|(server, err)| format!("{}: {}", server, err))
        .collect::<Vec<_>>()
        .join("; ")
}

impl McpError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a server error from JSON-RPC error.
    pub fn server_error(code: i32, message: impl Into<String>) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
        }
    }

    /// Wrap a spawn or handshake failure for `server`.
    pub fn connection(server: impl Into<String>, source: McpError) -> Self {
        Self::Connection {
            server: server.into(),
            source: Box::new(source),
        }
    }

    pub fn not_initialized(server: impl Into<String>, state: impl ToString) -> Self {
        Self::NotInitialized {
            server: server.into(),
            state: state.to_string(),
        }
    }
}

impl From<McpError> for mcpchat_core::Error {
    fn from(e: McpError) -> Self {
        match e {
            McpError::UnknownServer(name) => mcpchat_core::Error::NotFound(format!("server '{}'", name)),
            McpError::Configuration(msg) => mcpchat_core::Error::Config(msg),
            other => mcpchat_core::Error::Mcp(other.to_string()),
        }
    }
}
