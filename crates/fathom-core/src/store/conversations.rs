//! Idempotent conversation log with a summary projection.
//!
//! The store is the sole writer of durable conversation state. Every
//! mutation that changes `updated_at` re-sorts the summary index before
//! it is written, so the list is always ordered newest first.

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use fathom_types::conversation::{
    ConversationDetail, ConversationSummary, Mode, StoredMessage, StoredMessageMetadata,
};
use fathom_types::message::Role;
use tracing::{debug, warn};
use uuid::Uuid;

use super::storage::{detail_key, KvStorage, SUMMARY_INDEX_KEY};

/// Maximum characters kept in a summary preview.
const PREVIEW_MAX_CHARS: usize = 50;

/// Preview label for a message that carries only selectable options.
pub const OPTIONS_PLACEHOLDER: &str = "[options]";

/// Preview label for a message with no text at all.
pub const EMPTY_PLACEHOLDER: &str = "[empty]";

pub struct ConversationStore<S: KvStorage> {
    storage: S,
}

impl<S: KvStorage> ConversationStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Allocates a new conversation and writes its initial detail record
    /// and summary.
    pub fn create(
        &mut self,
        title: Option<String>,
        first_message: Option<String>,
        mode: Mode,
    ) -> Result<ConversationDetail> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let title = title.unwrap_or_else(|| {
            format!(
                "New conversation {}",
                Local::now().format("%Y-%m-%d %H:%M")
            )
        });

        let messages = match &first_message {
            Some(content) => vec![StoredMessage {
                id: Uuid::new_v4().to_string(),
                conversation_id: id.clone(),
                thread_id: id.clone(),
                role: Role::User,
                content: content.clone(),
                agent: None,
                timestamp: now,
                metadata: StoredMessageMetadata {
                    content_chunks: vec![content.clone()],
                    ..StoredMessageMetadata::default()
                },
            }],
            None => Vec::new(),
        };

        let detail = ConversationDetail {
            id: id.clone(),
            title,
            created_at: now,
            updated_at: now,
            mode,
            messages,
        };

        self.write_detail(&detail)?;

        let preview = detail.messages.last().map(preview);
        let mut summaries = self.read_summaries()?;
        summaries.push(detail.to_summary(preview));
        self.write_summaries(summaries)?;

        debug!(conversation = %detail.id, mode = mode.as_str(), "conversation created");
        Ok(detail)
    }

    pub fn get(&self, conversation_id: &str) -> Result<Option<ConversationDetail>> {
        let Some(raw) = self.storage.get(&detail_key(conversation_id))? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .with_context(|| format!("Failed to parse conversation {conversation_id}"))
    }

    /// Summaries ordered by `updated_at` descending, paginated.
    pub fn list(&self, limit: usize, offset: usize) -> Result<Vec<ConversationSummary>> {
        let mut summaries = self.read_summaries()?;
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries.into_iter().skip(offset).take(limit).collect())
    }

    /// Appends a finalized message to a conversation's durable log.
    ///
    /// Idempotent by message id: a duplicate is a no-op returning the
    /// existing record. A missing conversation is a warned no-op
    /// (`Ok(None)`), not an error.
    pub fn add_message(
        &mut self,
        conversation_id: &str,
        message: StoredMessage,
    ) -> Result<Option<ConversationDetail>> {
        let Some(mut detail) = self.get(conversation_id)? else {
            warn!(conversation = %conversation_id, "add_message for unknown conversation");
            return Ok(None);
        };

        if detail.messages.iter().any(|m| m.id == message.id) {
            return Ok(Some(detail));
        }

        let preview = preview(&message);
        detail.messages.push(message);
        detail.updated_at = Utc::now();
        self.write_detail(&detail)?;

        self.update_summary(conversation_id, |summary| {
            summary.message_count = detail.messages.len();
            summary.last_message_preview = Some(preview.clone());
            summary.updated_at = detail.updated_at;
            summary.mode = detail.mode;
        })?;

        Ok(Some(detail))
    }

    /// Renames a conversation. Returns false when the id is unknown.
    pub fn update_title(&mut self, conversation_id: &str, title: &str) -> Result<bool> {
        let Some(mut detail) = self.get(conversation_id)? else {
            warn!(conversation = %conversation_id, "update_title for unknown conversation");
            return Ok(false);
        };
        detail.title = title.to_string();
        detail.updated_at = Utc::now();
        self.write_detail(&detail)?;

        self.update_summary(conversation_id, |summary| {
            summary.title = title.to_string();
            summary.updated_at = detail.updated_at;
        })?;
        Ok(true)
    }

    /// Removes a conversation and its summary. Returns whether a record
    /// existed.
    pub fn delete(&mut self, conversation_id: &str) -> Result<bool> {
        let existed = self.storage.get(&detail_key(conversation_id))?.is_some();
        self.storage.remove(&detail_key(conversation_id))?;

        let mut summaries = self.read_summaries()?;
        summaries.retain(|summary| summary.id != conversation_id);
        self.write_summaries(summaries)?;
        Ok(existed)
    }

    /// Removes every conversation record under the namespace.
    pub fn clear_all(&mut self) -> Result<()> {
        for key in self.storage.keys()? {
            if key == SUMMARY_INDEX_KEY || key.starts_with(super::storage::DETAIL_KEY_PREFIX) {
                self.storage.remove(&key)?;
            }
        }
        Ok(())
    }

    fn read_summaries(&self) -> Result<Vec<ConversationSummary>> {
        let Some(raw) = self.storage.get(SUMMARY_INDEX_KEY)? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw).context("Failed to parse conversation summary index")
    }

    fn write_summaries(&mut self, mut summaries: Vec<ConversationSummary>) -> Result<()> {
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        let raw = serde_json::to_string(&summaries)
            .context("Failed to serialize conversation summary index")?;
        self.storage.set(SUMMARY_INDEX_KEY, &raw)
    }

    fn write_detail(&mut self, detail: &ConversationDetail) -> Result<()> {
        let raw = serde_json::to_string(detail)
            .with_context(|| format!("Failed to serialize conversation {}", detail.id))?;
        self.storage.set(&detail_key(&detail.id), &raw)
    }

    fn update_summary(
        &mut self,
        conversation_id: &str,
        update: impl FnOnce(&mut ConversationSummary),
    ) -> Result<()> {
        let mut summaries = self.read_summaries()?;
        if let Some(summary) = summaries.iter_mut().find(|s| s.id == conversation_id) {
            update(summary);
        }
        self.write_summaries(summaries)
    }
}

/// Builds the truncated preview shown in the summary list.
fn preview(message: &StoredMessage) -> String {
    if !message.content.is_empty() {
        let mut text: String = message.content.chars().take(PREVIEW_MAX_CHARS).collect();
        if message.content.chars().count() > PREVIEW_MAX_CHARS {
            text.push_str("...");
        }
        return text;
    }
    if message.metadata.options.is_some() {
        OPTIONS_PLACEHOLDER.to_string()
    } else {
        EMPTY_PLACEHOLDER.to_string()
    }
}
