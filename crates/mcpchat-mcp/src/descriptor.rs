//! Immutable descriptions of what a tool server offers.

use std::fmt;

use serde_json::Value;
use url::Url;

use crate::error::McpError;
use crate::protocol::{McpResourceDefinition, McpToolDefinition};

/// A tool discovered on a server.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    /// Unique within its server.
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub input_schema: Value,
}

/// One named parameter from a tool's input schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolParameter {
    pub name: String,
    pub kind: Option<String>,
    pub description: Option<String>,
    pub required: bool,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Parameters declared under `properties`, in schema key order.
    pub fn parameters(&self) -> Vec<ToolParameter> {
        let required: Vec<&str> = self
            .input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let Some(properties) = self.input_schema.get("properties").and_then(Value::as_object) else {
            return Vec::new();
        };

        properties
            .iter()
            .map(|(name, info)| ToolParameter {
                name: name.clone(),
                kind: info.get("type").and_then(Value::as_str).map(str::to_string),
                description: info
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                required: required.contains(&name.as_str()),
            })
            .collect()
    }
}

impl From<McpToolDefinition> for ToolDescriptor {
    fn from(def: McpToolDefinition) -> Self {
        Self {
            name: def.name,
            description: def.description.unwrap_or_default(),
            input_schema: def.input_schema,
        }
    }
}

/// Text block used in prompts and listings.
impl fmt::Display for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = if self.description.is_empty() {
            "No description"
        } else {
            self.description.as_str()
        };
        writeln!(f, "Tool: {}", self.name)?;
        writeln!(f, "Description: {}", description)?;
        writeln!(f, "Arguments:")?;
        for param in self.parameters() {
            write!(
                f,
                "- {}: {}",
                param.name,
                param.description.as_deref().unwrap_or("No description")
            )?;
            if param.required {
                f.write_str(" (required)")?;
            }
            f.write_str("\n")?;
        }
        Ok(())
    }
}

/// A resource discovered on a server.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDescriptor {
    pub uri: Url,
    pub name: String,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<u64>,
}

impl TryFrom<McpResourceDefinition> for ResourceDescriptor {
    type Error = McpError;

    fn try_from(def: McpResourceDefinition) -> Result<Self, Self::Error> {
        Ok(Self {
            uri: parse_uri(&def.uri)?,
            name: def.name,
            description: def.description,
            mime_type: def.mime_type,
            size: def.size,
        })
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uri)?;
        if let Some(mime) = &self.mime_type {
            write!(f, " [{}]", mime)?;
        }
        if let Some(description) = &self.description {
            write!(f, ": {}", description)?;
        }
        Ok(())
    }
}

pub(crate) fn parse_uri(uri: &str) -> Result<Url, McpError> {
    Url::parse(uri).map_err(|e| McpError::InvalidUri {
        uri: uri.to_string(),
        reason: e.to_string(),
    })
}
