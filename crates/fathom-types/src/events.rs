//! Stream event and request types.
//!
//! This module defines the contract with the transport layer: incoming
//! events are a closed tagged union, one variant per event kind, each
//! carrying the owning message id and thread id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::Mode;
use crate::message::{Agent, FinishReason, MessageOption, Role};

/// One discrete unit of the incremental stream, describing a change to a
/// single message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental text chunk for a message.
    ContentDelta {
        id: String,
        thread_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<Agent>,
        role: Role,
        delta: String,
    },

    /// Incremental tool-call argument fragment. The first fragment for a
    /// call id carries the tool name and opens the call.
    ToolCallDelta {
        id: String,
        thread_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<Agent>,
        role: Role,
        call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        args_delta: String,
    },

    /// Result of a previously announced tool call. The owning message is
    /// located by call id, not by the event's own message id.
    ToolCallResult {
        id: String,
        thread_id: String,
        call_id: String,
        result: String,
    },

    /// Terminal event: the message stops streaming.
    StreamEnd {
        id: String,
        thread_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<Agent>,
        role: Role,
        finish_reason: FinishReason,
        /// Follow-up options offered when the stream pauses at an
        /// interrupt point.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<Vec<MessageOption>>,
    },
}

impl StreamEvent {
    /// The id of the message this event targets.
    pub fn message_id(&self) -> &str {
        match self {
            StreamEvent::ContentDelta { id, .. }
            | StreamEvent::ToolCallDelta { id, .. }
            | StreamEvent::ToolCallResult { id, .. }
            | StreamEvent::StreamEnd { id, .. } => id,
        }
    }

    /// The thread the message belongs to.
    pub fn thread_id(&self) -> &str {
        match self {
            StreamEvent::ContentDelta { thread_id, .. }
            | StreamEvent::ToolCallDelta { thread_id, .. }
            | StreamEvent::ToolCallResult { thread_id, .. }
            | StreamEvent::StreamEnd { thread_id, .. } => thread_id,
        }
    }

    /// The role carried by role-bearing events.
    pub fn role(&self) -> Option<Role> {
        match self {
            StreamEvent::ContentDelta { role, .. }
            | StreamEvent::ToolCallDelta { role, .. }
            | StreamEvent::StreamEnd { role, .. } => Some(*role),
            StreamEvent::ToolCallResult { .. } => None,
        }
    }

    /// The producing agent, where the event carries one.
    pub fn agent(&self) -> Option<Agent> {
        match self {
            StreamEvent::ContentDelta { agent, .. }
            | StreamEvent::ToolCallDelta { agent, .. }
            | StreamEvent::StreamEnd { agent, .. } => *agent,
            StreamEvent::ToolCallResult { .. } => None,
        }
    }

    /// Whether this event may create a message record that does not
    /// exist yet. Tool results only attach to existing messages.
    pub fn creates_message(&self) -> bool {
        !matches!(self, StreamEvent::ToolCallResult { .. })
    }
}

/// Outbound request handed to the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub thread_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt_feedback: Option<String>,
    pub auto_accepted_plan: bool,
    pub enable_background_investigation: bool,
    pub max_plan_iterations: u32,
    pub max_step_num: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_settings: Option<Value>,
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}
