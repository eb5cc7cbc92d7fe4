//! In-memory message ledger for the active conversation.
//!
//! The ledger owns ordering via an explicit id sequence alongside the
//! id → record map. It is append/merge-only: past events are never
//! reordered or reprocessed, and mutation is synchronous per event.

use std::collections::HashMap;

use fathom_types::events::StreamEvent;
use fathom_types::message::Message;
use tracing::warn;

use crate::merge;

/// Result of merging one event into the ledger.
#[derive(Debug)]
pub struct Merged<'a> {
    /// Whether the event created a new record.
    pub created: bool,
    /// The record after the merge.
    pub message: &'a Message,
}

#[derive(Debug, Default)]
pub struct MessageLedger {
    order: Vec<String>,
    records: HashMap<String, Message>,
}

impl MessageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new message at the end of the ordering sequence.
    ///
    /// An id that already exists is left untouched; callers updating an
    /// existing record should merge events instead.
    pub fn append(&mut self, message: Message) -> bool {
        if self.records.contains_key(&message.id) {
            warn!(id = %message.id, "append for existing message id, ignoring");
            return false;
        }
        self.order.push(message.id.clone());
        self.records.insert(message.id.clone(), message);
        true
    }

    /// Folds one event into its target record.
    ///
    /// The target is located by message id, or for tool results by
    /// scanning existing messages newest to oldest for the call id the
    /// event completes. A content/role-bearing event with no existing
    /// record creates one in streaming state first. Returns `None` when
    /// no target can be found or created.
    pub fn merge(&mut self, event: &StreamEvent) -> Option<Merged<'_>> {
        let mut created = false;
        let target_id = if let StreamEvent::ToolCallResult { call_id, .. } = event {
            let Some(owner) = self.find_by_tool_call(call_id) else {
                warn!(call_id = %call_id, "tool result without owning message, dropping");
                return None;
            };
            owner.to_string()
        } else {
            let id = event.message_id().to_string();
            if !self.records.contains_key(&id) {
                let role = event.role()?;
                self.append(Message::streaming(
                    id.clone(),
                    event.thread_id(),
                    role,
                    event.agent(),
                ));
                created = true;
            }
            id
        };

        let message = self.records.get_mut(&target_id)?;
        merge::apply(message, event);
        Some(Merged {
            created,
            message: &*message,
        })
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.records.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.records.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Message ids in insertion order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// Messages in insertion order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    /// Messages newest to oldest.
    pub fn iter_rev(&self) -> impl Iterator<Item = &Message> {
        self.order
            .iter()
            .rev()
            .filter_map(|id| self.records.get(id))
    }

    /// Finds the most recent message owning the given tool call id.
    pub fn find_by_tool_call(&self, call_id: &str) -> Option<&str> {
        self.iter_rev()
            .find(|message| message.has_tool_call(call_id))
            .map(|message| message.id.as_str())
    }

    /// Force-finalizes every record still streaming, preserving the
    /// content merged so far. Returns the affected ids in order.
    pub fn finalize_streaming(&mut self) -> Vec<String> {
        let mut finalized = Vec::new();
        for id in &self.order {
            if let Some(message) = self.records.get_mut(id)
                && message.is_streaming
            {
                message.is_streaming = false;
                finalized.push(id.clone());
            }
        }
        finalized
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use fathom_types::message::{Agent, FinishReason, Role};

    use super::*;

    fn delta(id: &str, text: &str) -> StreamEvent {
        StreamEvent::ContentDelta {
            id: id.to_string(),
            thread_id: "t1".to_string(),
            agent: None,
            role: Role::Assistant,
            delta: text.to_string(),
        }
    }

    fn end(id: &str) -> StreamEvent {
        StreamEvent::StreamEnd {
            id: id.to_string(),
            thread_id: "t1".to_string(),
            agent: None,
            role: Role::Assistant,
            finish_reason: FinishReason::Stop,
            options: None,
        }
    }

    #[test]
    fn append_preserves_insertion_order() {
        let mut ledger = MessageLedger::new();
        ledger.append(Message::user("m1", "t1", "first"));
        ledger.append(Message::user("m2", "t1", "second"));
        let ids: Vec<_> = ledger.messages().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[test]
    fn duplicate_append_is_ignored() {
        let mut ledger = MessageLedger::new();
        assert!(ledger.append(Message::user("m1", "t1", "first")));
        assert!(!ledger.append(Message::user("m1", "t1", "other")));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("m1").unwrap().content, "first");
    }

    #[test]
    fn merge_creates_streaming_record_for_new_id() {
        let mut ledger = MessageLedger::new();
        let merged = ledger.merge(&delta("m1", "Hel")).unwrap();
        assert!(merged.created);
        assert!(merged.message.is_streaming);
        assert_eq!(merged.message.content, "Hel");

        let merged = ledger.merge(&delta("m1", "lo")).unwrap();
        assert!(!merged.created);
        assert_eq!(merged.message.content, "Hello");
    }

    #[test]
    fn merge_finalizes_on_stream_end() {
        let mut ledger = MessageLedger::new();
        ledger.merge(&delta("m1", "Hello")).unwrap();
        let merged = ledger.merge(&end("m1")).unwrap();
        assert!(merged.message.is_final());
        assert_eq!(merged.message.finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn late_delta_leaves_finalized_content_unchanged() {
        let mut ledger = MessageLedger::new();
        ledger.merge(&delta("m1", "Hello")).unwrap();
        ledger.merge(&end("m1")).unwrap();

        let merged = ledger.merge(&delta("m1", " late")).unwrap();
        assert!(!merged.created);
        assert_eq!(merged.message.content, "Hello");
        assert!(merged.message.is_final());
    }

    #[test]
    fn tool_result_routes_to_newest_owner() {
        let mut ledger = MessageLedger::new();
        for id in ["m1", "m2"] {
            ledger
                .merge(&StreamEvent::ToolCallDelta {
                    id: id.to_string(),
                    thread_id: "t1".to_string(),
                    agent: Some(Agent::Researcher),
                    role: Role::Assistant,
                    call_id: format!("call-{id}"),
                    name: Some("web_search".to_string()),
                    args_delta: "{}".to_string(),
                })
                .unwrap();
        }

        let merged = ledger
            .merge(&StreamEvent::ToolCallResult {
                id: "mx".to_string(),
                thread_id: "t1".to_string(),
                call_id: "call-m1".to_string(),
                result: "found".to_string(),
            })
            .unwrap();
        assert_eq!(merged.message.id, "m1");
        assert_eq!(
            merged.message.tool_call("call-m1").unwrap().result.as_deref(),
            Some("found")
        );
    }

    #[test]
    fn orphan_tool_result_is_dropped() {
        let mut ledger = MessageLedger::new();
        let merged = ledger.merge(&StreamEvent::ToolCallResult {
            id: "mx".to_string(),
            thread_id: "t1".to_string(),
            call_id: "call-unknown".to_string(),
            result: "lost".to_string(),
        });
        assert!(merged.is_none());
        assert!(ledger.is_empty());
    }

    #[test]
    fn finalize_streaming_preserves_content() {
        let mut ledger = MessageLedger::new();
        ledger.append(Message::user("m0", "t1", "question"));
        ledger.merge(&delta("m1", "partial answ")).unwrap();

        let finalized = ledger.finalize_streaming();
        assert_eq!(finalized, vec!["m1".to_string()]);
        let message = ledger.get("m1").unwrap();
        assert!(message.is_final());
        assert_eq!(message.content, "partial answ");
    }
}
