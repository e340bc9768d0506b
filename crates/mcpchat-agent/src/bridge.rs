//! Bridge functions exposed to the LLM's function-calling channel.

use std::fmt;
use std::str::FromStr;

use mcpchat_core::{FunctionDeclaration, ToolCall};
use mcpchat_mcp::{render_server_tools, ToolHost};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::mediator::MediatorError;

/// The closed set of functions the mediator declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeFunction {
    /// Run one tool on one server
    ExecuteTool,
    /// Render the tool list of one server
    ListTools,
}

impl BridgeFunction {
    pub const ALL: [BridgeFunction; 2] = [BridgeFunction::ExecuteTool, BridgeFunction::ListTools];

    /// Name used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            BridgeFunction::ExecuteTool => "execute_tool",
            BridgeFunction::ListTools => "list_tools",
        }
    }

    pub fn declaration(&self) -> FunctionDeclaration {
        match self {
            BridgeFunction::ExecuteTool => {
                FunctionDeclaration::new(self.name(), "Execute a tool of a MCP server").with_parameters(json!({
                    "type": "object",
                    "properties": {
                        "server_name": {
                            "type": "string",
                            "description": "The name of MCP Server."
                        },
                        "tool_name": {
                            "type": "string",
                            "description": "The name of the tool to call."
                        },
                        "args": {
                            "type": "string",
                            "description": "The arguments of the tool in JSON string format."
                        }
                    },
                    "required": ["server_name", "tool_name"]
                }))
            }
            BridgeFunction::ListTools => {
                FunctionDeclaration::new(self.name(), "List the tools of a MCP server").with_parameters(json!({
                    "type": "object",
                    "properties": {
                        "server_name": {
                            "type": "string",
                            "description": "The name of MCP Server."
                        }
                    },
                    "required": ["server_name"]
                }))
            }
        }
    }

    /// Declarations for every bridge function.
    pub fn declarations() -> Vec<FunctionDeclaration> {
        Self::ALL.iter().map(|f| f.declaration()).collect()
    }

    /// Decode the call's arguments and run it against `host`.
    ///
    /// Returns the text handed back to the LLM as the tool result.
    pub async fn dispatch(&self, host: &dyn ToolHost, call: &ToolCall) -> Result<String, MediatorError> {
        match self {
            BridgeFunction::ExecuteTool => {
                let args: ExecuteToolArgs = decode(call)?;
                info!(server = %args.server_name, tool = %args.tool_name, "Calling tool");
                let result = host
                    .execute_tool(&args.server_name, &args.tool_name, args.args)
                    .await?;
                Ok(result.to_string())
            }
            BridgeFunction::ListTools => {
                let args: ListToolsArgs = decode(call)?;
                info!(server = %args.server_name, "Listing tools");
                Ok(render_server_tools(host, &args.server_name).await?)
            }
        }
    }
}

impl fmt::Display for BridgeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BridgeFunction {
    type Err = MediatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| MediatorError::UnknownFunction(s.to_string()))
    }
}

fn decode<T: for<'de> Deserialize<'de>>(call: &ToolCall) -> Result<T, MediatorError> {
    // Some backends send an empty string for a call without arguments.
    let raw = if call.arguments.trim().is_empty() {
        "{}"
    } else {
        call.arguments.as_str()
    };
    serde_json::from_str(raw).map_err(|source| MediatorError::ArgumentDecode {
        function: call.name.clone(),
        source,
    })
}

/// Arguments of `execute_tool`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecuteToolArgs {
    pub server_name: String,
    pub tool_name: String,
    #[serde(default, deserialize_with = "tool_arguments")]
    pub args: Map<String, Value>,
}

/// Arguments of `list_tools`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListToolsArgs {
    pub server_name: String,
}

/// Tool arguments given either as a JSON-encoded string or as an object.
pub(crate) fn tool_arguments<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        Value::String(s) if s.trim().is_empty() => Ok(Map::new()),
        Value::String(s) => serde_json::from_str(&s).map_err(|e| {
            de::Error::custom(format!("args is not a JSON-encoded object: {}", e))
        }),
        other => Err(de::Error::custom(format!(
            "args must be an object or a JSON-encoded object, got {}",
            other
        ))),
    }
}
