//! Function-calling types shared between the mediator and LLM backends.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A function the LLM may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    /// JSON Schema for parameters
    pub parameters: serde_json::Value,
}

impl FunctionDeclaration {
    /// Create a declaration with an empty object schema.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    /// Set the parameters schema.
    pub fn with_parameters(mut self, schema: serde_json::Value) -> Self {
        self.parameters = schema;
        self
    }
}

/// A function call requested by the LLM.
///
/// `arguments` is kept as the raw JSON string the backend produced; decoding
/// is the caller's job so malformed arguments can be reported, not lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Decode the argument string into `T`.
    pub fn parse_arguments<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Args {
        server_name: String,
    }

    #[test]
    fn test_parse_arguments() {
        let call = ToolCall::new("1", "list_tools", r#"{"server_name":"fs"}"#);
        let args: Args = call.parse_arguments().unwrap();
        assert_eq!(args.server_name, "fs");

        let bad = ToolCall::new("2", "list_tools", "{server_name:");
        assert!(bad.parse_arguments::<Args>().is_err());
    }

    #[test]
    fn test_declaration_default_schema() {
        let decl = FunctionDeclaration::new("list_tools", "List tools");
        assert_eq!(decl.parameters["type"], "object");
    }
}
