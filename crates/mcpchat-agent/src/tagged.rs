//! Tagged-block convention for tool calls inside a streamed reply.
//!
//! A reply that wants a tool starts with [`OPEN_DELIMITER`] followed by one
//! JSON object `{"server", "tool", "args"}`. Only the start of the reply is
//! inspected: once the parser has seen enough text to rule the delimiter out,
//! everything after is plain text, delimiters included.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::bridge::tool_arguments;
use crate::mediator::MediatorError;

pub const OPEN_DELIMITER: &str = "<MCP_CALL>";
pub const CLOSE_DELIMITER: &str = "</MCP_CALL>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    /// Text so far is a prefix of the delimiter (or blank)
    Undecided,
    PlainText,
    ToolCall,
}

/// Classifies a streamed reply fragment by fragment.
///
/// Fragments are held back only while the reply could still turn out to
/// start with the delimiter; after that they pass straight through.
#[derive(Debug)]
pub struct TaggedBlockParser {
    state: ParserState,
    text: String,
}

impl Default for TaggedBlockParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TaggedBlockParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Undecided,
            text: String::new(),
        }
    }

    /// Accept one fragment; returns the text that may be shown now.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        self.text.push_str(fragment);

        match self.state {
            ParserState::PlainText | ParserState::ToolCall => {
                Some(fragment.to_string()).filter(|f| !f.is_empty())
            }
            ParserState::Undecided => {
                let head = self.text.trim_start();
                if head.starts_with(OPEN_DELIMITER) {
                    self.state = ParserState::ToolCall;
                } else if head.is_empty() || OPEN_DELIMITER.starts_with(head) {
                    return None;
                } else {
                    self.state = ParserState::PlainText;
                }
                Some(self.text.clone())
            }
        }
    }

    /// End of stream. Returns text still held back, which is then plain text.
    pub fn finish(&mut self) -> Option<String> {
        if self.state != ParserState::Undecided {
            return None;
        }
        self.state = ParserState::PlainText;
        Some(self.text.clone()).filter(|t| !t.is_empty())
    }

    /// True once the reply is known to open with the delimiter.
    pub fn is_tool_call(&self) -> bool {
        self.state == ParserState::ToolCall
    }

    /// Everything pushed so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Decode the tool call of a finished reply; `None` for plain text.
    pub fn tool_call(&self) -> Result<Option<TaggedCall>, MediatorError> {
        if !self.is_tool_call() {
            return Ok(None);
        }
        TaggedCall::parse(&self.text).map(Some)
    }
}

/// A tool call requested through a tagged block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaggedCall {
    pub server: String,
    pub tool: String,
    #[serde(default, deserialize_with = "tool_arguments")]
    pub args: Map<String, Value>,
}

impl TaggedCall {
    /// Parse a complete block. An optional trailing close delimiter is
    /// accepted; any other text around the JSON object is an error.
    pub fn parse(text: &str) -> Result<Self, MediatorError> {
        let body = text
            .trim_start()
            .strip_prefix(OPEN_DELIMITER)
            .ok_or_else(|| MediatorError::TaggedCall("missing opening delimiter".to_string()))?
            .trim();
        let body = body.strip_suffix(CLOSE_DELIMITER).unwrap_or(body).trim();

        serde_json::from_str(body).map_err(|e| MediatorError::TaggedCall(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed(parser: &mut TaggedBlockParser, fragments: &[&str]) -> String {
        let mut shown = String::new();
        for fragment in fragments {
            if let Some(text) = parser.push(fragment) {
                shown.push_str(&text);
            }
        }
        if let Some(text) = parser.finish() {
            shown.push_str(&text);
        }
        shown
    }

    #[test]
    fn test_plain_text_passes_through() {
        let mut parser = TaggedBlockParser::new();
        assert_eq!(parser.push("Hello").as_deref(), Some("Hello"));
        assert_eq!(parser.push(", world").as_deref(), Some(", world"));
        assert_eq!(parser.finish(), None);
        assert!(!parser.is_tool_call());
        assert_eq!(parser.tool_call().unwrap(), None);
    }

    #[test]
    fn test_holds_back_delimiter_prefix() {
        let mut parser = TaggedBlockParser::new();
        assert_eq!(parser.push("<MC"), None);
        assert_eq!(parser.push("P_"), None);
        assert_eq!(parser.push("CALL>{").as_deref(), Some("<MCP_CALL>{"));
        assert!(parser.is_tool_call());
        assert_eq!(parser.push("\"server\"").as_deref(), Some("\"server\""));
    }

    #[test]
    fn test_prefix_that_diverges_is_plain() {
        let mut parser = TaggedBlockParser::new();
        assert_eq!(parser.push("<"), None);
        assert_eq!(parser.push("b>bold</b>").as_deref(), Some("<b>bold</b>"));
        assert!(!parser.is_tool_call());
    }

    #[test]
    fn test_unresolved_prefix_flushed_at_end() {
        let mut parser = TaggedBlockParser::new();
        assert_eq!(feed(&mut parser, &["<MCP"]), "<MCP");
        assert!(!parser.is_tool_call());
    }

    #[test]
    fn test_delimiter_mid_stream_is_text() {
        let mut parser = TaggedBlockParser::new();
        let shown = feed(&mut parser, &["Sure. ", "<MCP_CALL>{}"]);
        assert_eq!(shown, "Sure. <MCP_CALL>{}");
        assert!(!parser.is_tool_call());
    }

    #[test]
    fn test_leading_whitespace_allowed() {
        let mut parser = TaggedBlockParser::new();
        assert_eq!(parser.push("\n "), None);
        feed(&mut parser, &["<MCP_CALL>", r#"{"server":"fs","tool":"ls","args":{}}"#]);
        assert!(parser.is_tool_call());
        assert_eq!(parser.tool_call().unwrap().unwrap().tool, "ls");
    }

    #[test]
    fn test_parse_call_with_string_args() {
        let mut parser = TaggedBlockParser::new();
        let shown = feed(
            &mut parser,
            &["<MCP_CALL>", r#"{"server":"fs","tool":"write","#, r#""args":"{\"path\":\"/x\"}"}"#],
        );
        assert_eq!(shown, parser.text());

        let call = parser.tool_call().unwrap().unwrap();
        assert_eq!(call.server, "fs");
        assert_eq!(call.tool, "write");
        assert_eq!(call.args.get("path"), Some(&json!("/x")));
    }

    #[test]
    fn test_parse_accepts_closing_delimiter() {
        let call = TaggedCall::parse("<MCP_CALL>\n{\"server\":\"a\",\"tool\":\"b\"}\n</MCP_CALL>\n").unwrap();
        assert_eq!(call.server, "a");
        assert!(call.args.is_empty());
    }

    #[test]
    fn test_parse_rejects_trailing_text() {
        let err = TaggedCall::parse(r#"<MCP_CALL>{"server":"a","tool":"b"} and then some"#).unwrap_err();
        assert!(matches!(err, MediatorError::TaggedCall(_)));
        assert!(TaggedCall::parse("<MCP_CALL>not json").is_err());
        assert!(TaggedCall::parse(r#"{"server":"a","tool":"b"}"#).is_err());
    }
}
