//! Research session tracking.
//!
//! A research session is a grouped span of agent activity bounded by a
//! plan and closed by a report. Sessions are derived from the message
//! stream as it arrives and can be rebuilt deterministically from a
//! replayed, finalized transcript.
//!
//! The tracker holds only ids into the ledger; the messages it needs are
//! passed in as arguments, never read from shared state.

use std::collections::HashMap;

use fathom_types::message::{Agent, Message};
use tracing::debug;

/// Tracks research sessions for the active conversation.
///
/// At most one session is ongoing at a time. A session opens lazily on
/// the first activity-agent message while none is ongoing, and closes
/// when its report message finalizes or the turn reaches a terminal
/// state.
#[derive(Debug, Default)]
pub struct ResearchTracker {
    /// Session ids in creation order. A session id equals the id of the
    /// message that opened it.
    ids: Vec<String>,
    plan_ids: HashMap<String, String>,
    report_ids: HashMap<String, String>,
    activity_ids: HashMap<String, Vec<String>>,
    ongoing: Option<String>,
    open: Option<String>,
}

impl ResearchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observes a message newly appended to the ledger.
    ///
    /// `history` iterates the ledger newest to oldest, excluding or
    /// including the new message; it is only scanned for the most recent
    /// planner message when a session opens.
    pub fn observe_append<'a, I>(&mut self, message: &Message, history: I)
    where
        I: IntoIterator<Item = &'a Message>,
    {
        let Some(agent) = message.agent else { return };
        if !agent.is_activity() {
            return;
        }

        if self.ongoing.is_none() {
            self.open_session(&message.id, history);
        }
        self.append_activity(message);

        // Replayed reporter messages arrive already finalized; close the
        // session immediately so rebuilds match live boundaries.
        if agent.is_report_producer() && message.is_final() {
            self.ongoing = None;
        }
    }

    /// Observes an updated record after an event merge.
    ///
    /// Closes the ongoing session when its report message stops
    /// streaming.
    pub fn observe_update(&mut self, message: &Message) {
        let Some(ongoing) = self.ongoing.clone() else {
            return;
        };
        if message.agent.is_some_and(Agent::is_report_producer) && message.is_final() {
            self.report_ids.insert(ongoing.clone(), message.id.clone());
            debug!(session = %ongoing, report = %message.id, "research session closed");
            self.ongoing = None;
        }
    }

    /// Rebuilds session groupings from an ordered, finalized transcript.
    ///
    /// Running this twice on the same input yields identical boundaries.
    pub fn rebuild<'a, I>(&mut self, messages: I)
    where
        I: IntoIterator<Item = &'a Message>,
    {
        self.clear();
        let mut seen: Vec<&Message> = Vec::new();
        for message in messages {
            self.observe_append(message, seen.iter().rev().copied());
            self.observe_update(message);
            seen.push(message);
        }
    }

    fn open_session<'a, I>(&mut self, trigger_id: &str, history: I)
    where
        I: IntoIterator<Item = &'a Message>,
    {
        let plan = history
            .into_iter()
            .find(|message| message.agent == Some(Agent::Planner));

        let mut activities = Vec::new();
        if let Some(plan) = plan {
            self.plan_ids
                .insert(trigger_id.to_string(), plan.id.clone());
            activities.push(plan.id.clone());
        } else {
            // Tolerated fallback: activity with no preceding plan.
            debug!(session = %trigger_id, "research session opened without a plan message");
        }

        self.ids.push(trigger_id.to_string());
        self.activity_ids.insert(trigger_id.to_string(), activities);
        self.ongoing = Some(trigger_id.to_string());
        self.open = Some(trigger_id.to_string());
    }

    fn append_activity(&mut self, message: &Message) {
        let Some(session) = self.ongoing.clone() else {
            return;
        };
        if let Some(activities) = self.activity_ids.get_mut(&session)
            && !activities.contains(&message.id)
        {
            activities.push(message.id.clone());
        }
        if message.agent.is_some_and(Agent::is_report_producer) {
            self.report_ids.insert(session, message.id.clone());
        }
    }

    /// Session ids in creation order.
    pub fn session_ids(&self) -> &[String] {
        &self.ids
    }

    pub fn plan_id(&self, session_id: &str) -> Option<&str> {
        self.plan_ids.get(session_id).map(String::as_str)
    }

    pub fn report_id(&self, session_id: &str) -> Option<&str> {
        self.report_ids.get(session_id).map(String::as_str)
    }

    pub fn activities(&self, session_id: &str) -> Option<&[String]> {
        self.activity_ids.get(session_id).map(Vec::as_slice)
    }

    /// The session currently accumulating activity, if any.
    pub fn ongoing_id(&self) -> Option<&str> {
        self.ongoing.as_deref()
    }

    /// The session whose detail panel is open in the UI, if any.
    pub fn open_id(&self) -> Option<&str> {
        self.open.as_deref()
    }

    pub fn open_research(&mut self, session_id: Option<String>) {
        self.open = session_id;
    }

    pub fn close_research(&mut self) {
        self.open = None;
    }

    /// Closes the ongoing session without recording a report. Used at
    /// terminal turn states (completed, cancelled, errored).
    pub fn clear_ongoing(&mut self) {
        if let Some(session) = self.ongoing.take() {
            debug!(%session, "ongoing research session cleared");
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.plan_ids.clear();
        self.report_ids.clear();
        self.activity_ids.clear();
        self.ongoing = None;
        self.open = None;
    }
}
