//! Durable conversation records and their summary projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{FinishReason, Message, MessageOption, Role, ToolCall};

/// Interaction mode stamped onto a conversation at creation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Research,
    Chat,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Research => "research",
            Mode::Chat => "chat",
        }
    }
}

/// Structured state a live message carries beyond its text, preserved
/// so a reloaded conversation can reproduce the original records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredMessageMetadata {
    pub content_chunks: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<MessageOption>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// One persisted message in a conversation's durable log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub thread_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<crate::message::Agent>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: StoredMessageMetadata,
}

impl StoredMessage {
    /// Converts a finalized live message into its durable form.
    ///
    /// Tool messages are stored with the assistant role; the durable log
    /// only distinguishes user from assistant turns.
    pub fn from_live(conversation_id: &str, message: &Message) -> Self {
        let role = match message.role {
            Role::Tool => Role::Assistant,
            other => other,
        };
        Self {
            id: message.id.clone(),
            conversation_id: conversation_id.to_string(),
            thread_id: message.thread_id.clone(),
            role,
            content: message.content.clone(),
            agent: message.agent,
            timestamp: Utc::now(),
            metadata: StoredMessageMetadata {
                content_chunks: message.content_chunks.clone(),
                tool_calls: message.tool_calls.clone(),
                options: message.options.clone(),
                finish_reason: message.finish_reason,
            },
        }
    }

    /// Reconstructs a finalized live message from the durable record.
    pub fn into_live(self) -> Message {
        let content_chunks = if self.metadata.content_chunks.is_empty() && !self.content.is_empty()
        {
            vec![self.content.clone()]
        } else {
            self.metadata.content_chunks
        };
        Message {
            id: self.id,
            thread_id: self.thread_id,
            role: self.role,
            agent: self.agent,
            content: self.content,
            content_chunks,
            is_streaming: false,
            tool_calls: self.metadata.tool_calls,
            finish_reason: self.metadata.finish_reason,
            options: self.metadata.options,
            interrupt_feedback: None,
        }
    }
}

/// Full durable record for one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}

impl ConversationDetail {
    /// Derives the list-friendly projection of this record.
    pub fn to_summary(&self, last_message_preview: Option<String>) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            message_count: self.messages.len(),
            last_message_preview,
            mode: self.mode,
        }
    }
}

/// Lightweight projection of a conversation used for listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_preview: Option<String>,
    #[serde(default)]
    pub mode: Mode,
}
