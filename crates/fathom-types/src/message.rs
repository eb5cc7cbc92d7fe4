//! Live message records for the active conversation.
//!
//! A [`Message`] accumulates state as stream events are merged into it.
//! While `is_streaming` is true the content is incomplete and must never
//! be persisted; once a terminal event clears the flag the content is
//! immutable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// Backend agent that produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agent {
    Coordinator,
    Planner,
    Researcher,
    Coder,
    Reporter,
}

impl Agent {
    /// True for agents whose messages belong to a research session.
    pub fn is_activity(self) -> bool {
        matches!(self, Agent::Researcher | Agent::Coder | Agent::Reporter)
    }

    /// True for the agent that authors a session's final report.
    pub fn is_report_producer(self) -> bool {
        matches!(self, Agent::Reporter)
    }
}

/// Why the backend stopped producing a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Interrupt,
    ToolCalls,
}

/// A tool invocation attached to an assistant message.
///
/// Arguments arrive as raw JSON fragments; `args` holds the parsed value
/// once the accumulated fragments form valid JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub args_chunks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args: Value::Object(serde_json::Map::new()),
            args_chunks: Vec::new(),
            result: None,
        }
    }
}

/// A user-selectable follow-up option offered at an interrupt point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageOption {
    pub text: String,
    pub value: String,
}

/// One message in the live ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<Agent>,
    /// Accumulated text, equal to the concatenation of `content_chunks`.
    #[serde(default)]
    pub content: String,
    /// Content fragments in arrival order.
    #[serde(default)]
    pub content_chunks: Vec<String>,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<MessageOption>>,
    /// Feedback token from the interrupt option the user picked, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt_feedback: Option<String>,
}

impl Message {
    /// Creates a finalized user message with a single content chunk.
    pub fn user(
        id: impl Into<String>,
        thread_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            role: Role::User,
            agent: None,
            content_chunks: vec![content.clone()],
            content,
            is_streaming: false,
            tool_calls: None,
            finish_reason: None,
            options: None,
            interrupt_feedback: None,
        }
    }

    /// Creates an empty in-flight record for an incoming stream message.
    pub fn streaming(
        id: impl Into<String>,
        thread_id: impl Into<String>,
        role: Role,
        agent: Option<Agent>,
    ) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            role,
            agent,
            content: String::new(),
            content_chunks: Vec::new(),
            is_streaming: true,
            tool_calls: None,
            finish_reason: None,
            options: None,
            interrupt_feedback: None,
        }
    }

    /// True once the message has been finalized.
    pub fn is_final(&self) -> bool {
        !self.is_streaming
    }

    /// Looks up a tool call by id.
    pub fn tool_call(&self, call_id: &str) -> Option<&ToolCall> {
        self.tool_calls
            .as_deref()
            .and_then(|calls| calls.iter().find(|call| call.id == call_id))
    }

    /// True if this message owns the given tool call id.
    pub fn has_tool_call(&self, call_id: &str) -> bool {
        self.tool_call(call_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_is_final_with_one_chunk() {
        let message = Message::user("m1", "t1", "hello");
        assert!(message.is_final());
        assert_eq!(message.content, "hello");
        assert_eq!(message.content_chunks, vec!["hello".to_string()]);
    }

    #[test]
    fn streaming_message_starts_empty() {
        let message = Message::streaming("m1", "t1", Role::Assistant, Some(Agent::Researcher));
        assert!(message.is_streaming);
        assert!(message.content.is_empty());
        assert!(message.tool_calls.is_none());
    }

    #[test]
    fn activity_agents() {
        assert!(Agent::Researcher.is_activity());
        assert!(Agent::Coder.is_activity());
        assert!(Agent::Reporter.is_activity());
        assert!(!Agent::Planner.is_activity());
        assert!(!Agent::Coordinator.is_activity());
        assert!(Agent::Reporter.is_report_producer());
        assert!(!Agent::Researcher.is_report_producer());
    }

    #[test]
    fn message_roundtrip() {
        let mut message = Message::streaming("m1", "t1", Role::Assistant, Some(Agent::Reporter));
        message.content = "report".to_string();
        message.finish_reason = Some(FinishReason::Stop);
        let json = serde_json::to_string(&message).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(message, parsed);
    }

    #[test]
    fn agent_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Agent::Researcher).unwrap(),
            "\"researcher\""
        );
        assert_eq!(
            serde_json::to_string(&FinishReason::ToolCalls).unwrap(),
            "\"tool_calls\""
        );
    }
}
