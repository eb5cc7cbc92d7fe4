//! Chat session orchestration.
//!
//! A [`ChatSession`] drives one request/response stream end-to-end: it
//! creates a conversation when needed, emits the user message, consumes
//! the event stream, updates the ledger and research tracker, persists
//! finalized messages, and handles cancellation and errors. All live
//! state is owned here; there is no global store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use fathom_types::conversation::{ConversationDetail, ConversationSummary, Mode, StoredMessage};
use fathom_types::events::{ChatRequest, StreamEvent};
use fathom_types::message::Message;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::ledger::MessageLedger;
use crate::research::ResearchTracker;
use crate::store::{ConversationStore, KvStorage};

/// Placeholder message sent when replaying a turn without new input
/// (e.g. resuming after an interrupt option was picked).
const REPLAY_MESSAGE: &str = "[REPLAY]";

/// Seam to the transport layer: turns an outbound request into a stream
/// of events. Events are delivered strictly in arrival order.
pub trait Transport {
    fn chat_stream(&self, request: ChatRequest) -> BoxStream<'static, Result<StreamEvent>>;
}

/// Per-call options for [`ChatSession::send_message`].
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Feedback token from the interrupt option the user picked.
    pub interrupt_feedback: Option<String>,
    /// Mode for this request; defaults to the session's current mode.
    pub mode: Option<Mode>,
}

/// Terminal state of one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Cancelled,
    /// The transport failed mid-stream. The in-flight message was
    /// finalized and persisted; this is the only user-visible error
    /// class.
    Errored { message: String },
}

/// Owns all live conversation state and the durable store handle.
pub struct ChatSession<T: Transport, S: KvStorage> {
    transport: T,
    config: Config,
    ledger: MessageLedger,
    tracker: ResearchTracker,
    conversations: ConversationStore<S>,
    thread_id: String,
    conversation_id: Option<String>,
    mode: Mode,
    /// Set while a turn is in flight. Shared with the turn guard so the
    /// flag clears even when the send future is dropped mid-stream.
    responding: Arc<AtomicBool>,
    /// Message ids already written to the durable log.
    saved: HashSet<String>,
}

/// Holds the responding flag for the duration of one turn and releases
/// it on drop, so an abandoned `send_message` future cannot leave the
/// session permanently rejecting.
struct TurnGuard(Arc<AtomicBool>);

impl TurnGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(Self(Arc::clone(flag)))
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<T: Transport, S: KvStorage> ChatSession<T, S> {
    pub fn new(transport: T, storage: S, config: Config) -> Self {
        let mode = config.default_mode;
        Self {
            transport,
            config,
            ledger: MessageLedger::new(),
            tracker: ResearchTracker::new(),
            conversations: ConversationStore::new(storage),
            thread_id: Uuid::new_v4().to_string(),
            conversation_id: None,
            mode,
            responding: Arc::new(AtomicBool::new(false)),
            saved: HashSet::new(),
        }
    }

    /// Sends one message and consumes the response stream to its end.
    ///
    /// With `content` and no current conversation, a conversation is
    /// created first and stamped with the requested mode. The user
    /// message is appended to the ledger synchronously before the
    /// transport is called.
    ///
    /// Policy: turns are serialized. A call while a turn is in flight is
    /// rejected; cancellation is always explicit via `cancel`.
    pub async fn send_message(
        &mut self,
        content: Option<String>,
        options: SendOptions,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome> {
        let Some(_turn) = TurnGuard::acquire(&self.responding) else {
            bail!("a response is already in progress; cancel it first");
        };
        let mode = options.mode.unwrap_or(self.mode);
        self.mode = mode;

        if let Some(text) = content.as_deref() {
            if self.conversation_id.is_none() {
                let detail = self
                    .conversations
                    .create(None, None, mode)
                    .context("Failed to create conversation")?;
                debug!(conversation = %detail.id, "conversation created for first message");
                self.conversation_id = Some(detail.id);
            }
            let user = Message::user(Uuid::new_v4().to_string(), self.thread_id.clone(), text);
            self.append_local(user);
        }

        let request = self.build_request(content.as_deref(), &options, mode);
        let mut stream = self.transport.chat_stream(request);

        let mut last_id: Option<String> = None;
        let mut outcome = TurnOutcome::Completed;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("turn cancelled");
                    outcome = TurnOutcome::Cancelled;
                    break;
                }
                next = stream.next() => match next {
                    None => break,
                    Some(Ok(event)) => {
                        if let Some(id) =
                            self.apply_event(&event, options.interrupt_feedback.as_deref())
                        {
                            last_id = Some(id);
                        }
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "chat stream failed");
                        outcome = TurnOutcome::Errored {
                            message: format!("{err:#}"),
                        };
                        break;
                    }
                },
            }
        }
        drop(stream);

        self.finish_turn(last_id.as_deref());
        Ok(outcome)
    }

    /// Applies one stream event: merge into the ledger, drive the
    /// research tracker, persist on finalize. Returns the touched id.
    fn apply_event(&mut self, event: &StreamEvent, interrupt_feedback: Option<&str>) -> Option<String> {
        let (created, message) = {
            let merged = self.ledger.merge(event)?;
            (merged.created, merged.message.clone())
        };

        if created {
            if let (Some(feedback), Some(record)) =
                (interrupt_feedback, self.ledger.get_mut(&message.id))
            {
                record.interrupt_feedback = Some(feedback.to_string());
            }
            self.tracker.observe_append(&message, self.ledger.iter_rev());
        }
        self.tracker.observe_update(&message);

        if message.is_final() {
            self.persist(&message);
        }
        Some(message.id)
    }

    /// Appends a locally produced (already final) message.
    fn append_local(&mut self, message: Message) {
        self.tracker.observe_append(&message, self.ledger.iter_rev());
        self.persist(&message);
        self.ledger.append(message);
    }

    /// Terminal-state cleanup shared by completion, cancellation and
    /// errors: finalize anything still streaming (content preserved),
    /// close the ongoing research session, persist the tail.
    fn finish_turn(&mut self, last_id: Option<&str>) {
        for id in self.ledger.finalize_streaming() {
            if let Some(message) = self.ledger.get(&id).cloned() {
                self.tracker.observe_update(&message);
                self.persist(&message);
            }
        }
        self.tracker.clear_ongoing();

        if let Some(id) = last_id
            && let Some(message) = self.ledger.get(id).cloned()
        {
            self.persist(&message);
        }
    }

    /// Hands a finalized message to the conversation store, at most once
    /// per id. Store failures are logged and absorbed; they never touch
    /// the ledger.
    fn persist(&mut self, message: &Message) {
        let Some(conversation_id) = self.conversation_id.clone() else {
            return;
        };
        if message.is_streaming || self.saved.contains(&message.id) {
            return;
        }
        let stored = StoredMessage::from_live(&conversation_id, message);
        match self.conversations.add_message(&conversation_id, stored) {
            Ok(Some(_)) => {
                self.saved.insert(message.id.clone());
            }
            Ok(None) => {} // unknown conversation, warned in the store
            Err(err) => {
                warn!(error = %err, id = %message.id, "failed to persist message");
            }
        }
    }

    fn build_request(
        &self,
        content: Option<&str>,
        options: &SendOptions,
        mode: Mode,
    ) -> ChatRequest {
        ChatRequest {
            thread_id: self.thread_id.clone(),
            message: content.unwrap_or(REPLAY_MESSAGE).to_string(),
            interrupt_feedback: options.interrupt_feedback.clone(),
            auto_accepted_plan: self.config.auto_accepted_plan,
            enable_background_investigation: self.config.enable_background_investigation,
            max_plan_iterations: self.config.max_plan_iterations,
            max_step_num: self.config.max_step_num,
            tool_settings: self.config.tool_settings.clone(),
            mode,
            system_prompt: self.config.system_prompt.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Conversation lifecycle
    // ------------------------------------------------------------------

    /// Loads a persisted conversation into the live ledger, rebuilding
    /// research session boundaries deterministically and restoring the
    /// conversation's mode. Unknown ids are a warned no-op.
    pub fn select_conversation(&mut self, conversation_id: &str) -> Result<bool> {
        let Some(detail) = self.conversations.get(conversation_id)? else {
            warn!(conversation = %conversation_id, "select for unknown conversation");
            return Ok(false);
        };

        self.ledger.clear();
        self.tracker.clear();
        self.saved.clear();
        self.thread_id = detail.id.clone();
        self.conversation_id = Some(detail.id.clone());
        self.mode = detail.mode;

        for stored in detail.messages {
            self.saved.insert(stored.id.clone());
            self.ledger.append(stored.into_live());
        }
        self.tracker.rebuild(self.ledger.messages());
        // A replayed transcript is never live; nothing stays ongoing.
        self.tracker.clear_ongoing();
        Ok(true)
    }

    /// Resets live state and rotates the thread id. The durable archive
    /// is untouched.
    pub fn clear_conversation(&mut self) {
        self.conversation_id = None;
        self.thread_id = Uuid::new_v4().to_string();
        self.ledger.clear();
        self.tracker.clear();
        self.saved.clear();
    }

    /// Deletes a conversation from the durable archive. Deleting the
    /// active conversation also clears the live state.
    pub fn delete_conversation(&mut self, conversation_id: &str) -> Result<bool> {
        let deleted = self.conversations.delete(conversation_id)?;
        if self.conversation_id.as_deref() == Some(conversation_id) {
            self.clear_conversation();
        }
        Ok(deleted)
    }

    pub fn clear_all_conversations(&mut self) -> Result<()> {
        self.conversations.clear_all()?;
        self.clear_conversation();
        Ok(())
    }

    pub fn update_conversation_title(
        &mut self,
        conversation_id: &str,
        title: &str,
    ) -> Result<bool> {
        self.conversations.update_title(conversation_id, title)
    }

    pub fn list_conversations(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ConversationSummary>> {
        self.conversations.list(limit, offset)
    }

    /// The full durable record of the active conversation, if any.
    pub fn current_conversation(&self) -> Result<Option<ConversationDetail>> {
        match &self.conversation_id {
            Some(id) => self.conversations.get(id),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // UI-facing accessors
    // ------------------------------------------------------------------

    /// Live messages in insertion order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.ledger.messages()
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.ledger.get(id)
    }

    pub fn message_ids(&self) -> &[String] {
        self.ledger.ids()
    }

    /// Research session ids in creation order.
    pub fn research_ids(&self) -> &[String] {
        self.tracker.session_ids()
    }

    pub fn research_plan_id(&self, session_id: &str) -> Option<&str> {
        self.tracker.plan_id(session_id)
    }

    pub fn research_report_id(&self, session_id: &str) -> Option<&str> {
        self.tracker.report_id(session_id)
    }

    pub fn research_activities(&self, session_id: &str) -> Option<&[String]> {
        self.tracker.activities(session_id)
    }

    pub fn ongoing_research_id(&self) -> Option<&str> {
        self.tracker.ongoing_id()
    }

    pub fn open_research_id(&self) -> Option<&str> {
        self.tracker.open_id()
    }

    pub fn open_research(&mut self, session_id: Option<String>) {
        self.tracker.open_research(session_id);
    }

    pub fn close_research(&mut self) {
        self.tracker.close_research();
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switches the mode used for subsequent requests. Already-persisted
    /// conversations keep the mode they were created with.
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn is_responding(&self) -> bool {
        self.responding.load(Ordering::SeqCst)
    }
}
