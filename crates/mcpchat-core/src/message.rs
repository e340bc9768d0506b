//! Message and conversation primitives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::ToolCall;

/// Role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message (instructions, capability catalog)
    System,
    User,
    Assistant,
    /// Result of a function call
    Tool,
}

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Function calls requested by an assistant message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Call this tool message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Function name for tool messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: vec![],
            tool_call_id: None,
            name: None,
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create an assistant message that requests function calls.
    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        let mut message = Self::with_role(Role::Assistant, content);
        message.tool_calls = calls;
        message
    }

    /// Create a tool result message answering `call`.
    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        let mut message = Self::with_role(Role::Tool, content);
        message.tool_call_id = Some(call.id.clone());
        message.name = Some(call.name.clone());
        message
    }
}

/// Ordered, append-only message history.
///
/// The first message, once appended, is the priming system message. Turns only
/// append; [`Conversation::clear`] is the single way to drop messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the priming system message. Returns `false` (and does nothing)
    /// if the conversation already has messages.
    pub fn prime(&mut self, system: impl Into<String>) -> bool {
        if !self.messages.is_empty() {
            return false;
        }
        self.messages.push(Message::system(system));
        true
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The priming message, if the conversation has been primed.
    pub fn system_message(&self) -> Option<&Message> {
        self.messages.first().filter(|m| m.role == Role::System)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prime_only_on_empty() {
        let mut conversation = Conversation::new();
        assert!(conversation.prime("catalog"));
        assert!(!conversation.prime("second"));
        conversation.push(Message::user("hi"));

        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.system_message().map(|m| m.content.as_str()), Some("catalog"));
        assert_eq!(conversation.last().map(|m| m.role), Some(Role::User));
    }

    #[test]
    fn test_clear_allows_repriming() {
        let mut conversation = Conversation::new();
        conversation.prime("one");
        conversation.push(Message::assistant("answer"));
        conversation.clear();
        assert!(conversation.is_empty());
        assert!(conversation.system_message().is_none());
        assert!(conversation.prime("two"));
    }

    #[test]
    fn test_tool_result_links_call() {
        let call = ToolCall::new("call_1", "execute_tool", "{}");
        let message = Message::tool_result(&call, "done");
        assert_eq!(message.role, Role::Tool);
        assert_eq!(message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(message.name.as_deref(), Some("execute_tool"));
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
