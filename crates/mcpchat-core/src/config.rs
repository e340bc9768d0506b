//! Configuration system for mcpchat.
//!
//! Layers, lowest precedence first: compiled defaults, the user file
//! `<config_dir>/mcpchat/config.toml`, the project file `./mcpchat.toml`,
//! the tool-server file (`servers_config.json` in the `mcpServers` shape),
//! and finally `MCPCHAT_`-prefixed environment variables.

use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Default location of the tool-server file, relative to the working directory.
pub const DEFAULT_SERVERS_FILE: &str = "servers_config.json";

/// Main configuration struct for mcpchat.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM backend settings
    pub llm: LlmConfig,
    /// Tool invocation retry settings
    pub retry: RetryConfig,
    /// Tool servers by name
    #[serde(rename = "mcpServers")]
    pub mcp_servers: BTreeMap<String, ServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model identifier sent to the backend
    pub model: String,
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,
    /// API key (can be set directly or via environment)
    pub api_key: Option<String>,
    /// Environment variable name for API key
    pub api_key_env: Option<String>,
    /// Sent as `HTTP-Referer`
    pub site_url: Option<String>,
    /// Sent as `X-Title`
    pub site_name: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "openai/gpt-3.5-turbo".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: None,
            api_key_env: Some("OPEN_ROUTER_API_KEY".to_string()),
            site_url: None,
            site_name: None,
            max_tokens: None,
            temperature: None,
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from either direct value or environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }
        if let Some(ref env_var) = self.api_key_env {
            if let Ok(key) = std::env::var(env_var) {
                return Some(key);
            }
        }
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per tool call, including the first
    pub attempts: u32,
    /// Seconds to wait between failed attempts
    pub delay_secs: f64,
    /// Upper bound of random extra delay, in milliseconds
    pub jitter_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 2,
            delay_secs: 1.0,
            jitter_ms: None,
        }
    }
}

/// How to launch one tool server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Executable name or path. `npx` is resolved through `PATH`.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Applied over the inherited environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
}

impl ServerConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: None,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Validation result with multiple issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// Check if validation passed (no errors).
    pub fn is_ok(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == IssueSeverity::Error)
    }

    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Warning)
            .collect()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Error,
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Warning,
            field: field.into(),
            message: message.into(),
        });
    }
}

/// A single validation issue.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    /// Field path (e.g., "mcpServers.fs.command")
    pub field: String,
    pub message: String,
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Warnings don't prevent loading
    Warning,
    /// Errors prevent loading
    Error,
}

impl Config {
    /// Build the layered figment. `servers_file` overrides the default
    /// `servers_config.json` location.
    pub fn figment(servers_file: Option<&Path>) -> Figment {
        let servers_file = servers_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SERVERS_FILE));

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(Self::config_dir().join("config.toml")))
            .merge(Toml::file("mcpchat.toml"))
            .merge(Json::file(servers_file))
            .merge(Env::prefixed("MCPCHAT_").split("__"))
    }

    /// Load configuration from all sources.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Load configuration, reading tool servers from `servers_file`.
    pub fn load_from(servers_file: Option<&Path>) -> Result<Self, figment::Error> {
        Self::figment(servers_file).extract()
    }

    /// Load and validate configuration.
    pub fn load_validated(servers_file: Option<&Path>) -> Result<Self, Error> {
        let config = Self::load_from(servers_file).map_err(|e| Error::Config(e.to_string()))?;
        let result = config.validate();

        if !result.is_ok() {
            let errors: Vec<String> = result
                .errors()
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            return Err(Error::Config(format!(
                "Configuration validation failed:\n  {}",
                errors.join("\n  ")
            )));
        }

        for warning in result.warnings() {
            tracing::warn!(field = %warning.field, "Config warning: {}", warning.message);
        }

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.llm.model.trim().is_empty() {
            result.add_error("llm.model", "Model name cannot be empty");
        }

        if !self.llm.base_url.starts_with("http://") && !self.llm.base_url.starts_with("https://")
        {
            result.add_error("llm.base_url", "base_url must start with http:// or https://");
        }

        if self.llm.api_key.as_deref().is_some_and(str::is_empty) {
            result.add_warning("llm.api_key", "API key is empty string");
        }

        if self.retry.attempts == 0 {
            result.add_error("retry.attempts", "attempts must be greater than 0");
        }

        if !(self.retry.delay_secs >= 0.0 && self.retry.delay_secs.is_finite()) {
            result.add_error("retry.delay_secs", "delay_secs must be a non-negative number");
        }

        if self.mcp_servers.is_empty() {
            result.add_warning("mcpServers", "No tool servers configured");
        }

        for (name, server) in &self.mcp_servers {
            if server.command.trim().is_empty() {
                result.add_error(
                    format!("mcpServers.{}.command", name),
                    "command cannot be empty",
                );
            }
        }

        result
    }

    /// Get the configuration directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("mcpchat"))
            .unwrap_or_else(|| PathBuf::from("~/.config/mcpchat"))
    }
}
