//! Error types for mcpchat.
//!
//! Library crates keep their own error enums; this module holds the error
//! that spans crates, plus structured LLM backend failures.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for mcpchat.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM backend error with structured details
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// Tool server error
    #[error("MCP error: {0}")]
    Mcp(String),

    /// Tool-call mediation error
    #[error("Mediator error: {0}")]
    Mediator(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Error::Config(_) => {
                Some("Check servers_config.json and mcpchat.toml, or run 'mcpchat servers'")
            }
            Error::Provider(e) => e.recovery_suggestion(),
            Error::Mcp(_) => Some("Run with --verbose to see the tool server's startup log"),
            Error::NotFound(_) => Some("Use 'mcpchat servers' to see configured servers"),
            _ => None,
        }
    }

    /// Create a provider-not-configured error.
    pub fn provider_not_configured(provider: &str, env_var: Option<&str>) -> Self {
        Error::Provider(ProviderError::NotConfigured {
            provider: provider.to_string(),
            env_var: env_var.map(str::to_string),
        })
    }
}

/// LLM backend errors with detailed context.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Provider not configured
    #[error("Provider '{provider}' is not configured")]
    NotConfigured {
        provider: String,
        env_var: Option<String>,
    },

    /// Authentication failed
    #[error("Authentication failed for {provider}: {message}")]
    AuthenticationFailed { provider: String, message: String },

    /// API request failed
    #[error("API request to {provider} failed: {status} - {message}")]
    ApiError {
        provider: String,
        status: u16,
        message: String,
    },

    /// Response had no usable choice
    #[error("Empty response from {provider}")]
    EmptyResponse { provider: String },

    /// Streaming error
    #[error("Streaming error from {provider}: {message}")]
    StreamError { provider: String, message: String },

    /// Network error
    #[error("Network error connecting to {provider}: {message}")]
    NetworkError { provider: String, message: String },
}

impl ProviderError {
    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            ProviderError::NotConfigured {
                env_var: Some(_), ..
            } => Some("Set the API key environment variable"),
            ProviderError::NotConfigured { .. } => Some("Set llm.api_key in mcpchat.toml"),
            ProviderError::AuthenticationFailed { .. } => {
                Some("Check that your API key is valid and not expired")
            }
            ProviderError::ApiError { status: 429, .. } => {
                Some("You've hit rate limits. Wait a moment and try again")
            }
            ProviderError::ApiError {
                status: 500..=599, ..
            } => Some("The API service is having issues. Try again later"),
            ProviderError::NetworkError { .. } => Some("Check your internet connection"),
            _ => None,
        }
    }

    /// Create an API error from status code and message.
    pub fn api_error(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        ProviderError::ApiError {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }
}

/// Format an error with its recovery suggestion.
pub fn format_error_with_suggestion(error: &Error) -> String {
    let mut output = error.to_string();
    if let Some(suggestion) = error.recovery_suggestion() {
        output.push_str(&format!("\n  Suggestion: {}", suggestion));
    }
    output
}
