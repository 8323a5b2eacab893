//! Per-session "assistant is producing output" flags.

use std::collections::HashMap;

use agent_transport::{Message, Role};

/// Identifies one abort request so a late grace-period check cannot clear a
/// generation started after the abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AbortTicket(u64);

#[derive(Debug, Default, Clone, Copy)]
struct GenerationState {
    generating: bool,
    pending_abort: Option<AbortTicket>,
}

#[derive(Debug, Default)]
pub struct GenerationTracker {
    sessions: HashMap<String, GenerationState>,
    next_ticket: u64,
}

impl GenerationTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_generating(&self, session_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|state| state.generating)
    }

    /// Marks the session as generating. Returns `true` on a transition; a
    /// fresh generation drops any abort left over from the previous one.
    pub fn start(&mut self, session_id: &str) -> bool {
        let state = self.sessions.entry(session_id.to_string()).or_default();
        if state.generating {
            return false;
        }
        state.generating = true;
        state.pending_abort = None;
        true
    }

    /// Clears the flag and any pending abort. Returns `true` on a transition.
    pub fn finish(&mut self, session_id: &str) -> bool {
        match self.sessions.remove(session_id) {
            Some(state) => state.generating,
            None => false,
        }
    }

    /// Records an abort request. The flag stays set until a terminal event or
    /// [`Self::expire_abort`].
    pub fn request_abort(&mut self, session_id: &str) -> AbortTicket {
        self.next_ticket += 1;
        let ticket = AbortTicket(self.next_ticket);
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .pending_abort = Some(ticket);
        ticket
    }

    /// Force-clears the flag if `ticket` is still the session's pending abort
    /// and the session still reports generation. Returns `true` when forced.
    pub fn expire_abort(&mut self, session_id: &str, ticket: AbortTicket) -> bool {
        let Some(state) = self.sessions.get(session_id) else {
            return false;
        };
        if state.pending_abort != Some(ticket) || !state.generating {
            return false;
        }
        self.sessions.remove(session_id);
        true
    }

    /// Clears the flag when `history` ends with an assistant message that
    /// completed or failed. A trailing user message keeps it, since its
    /// reply may still be pending. Returns `true` when cleared.
    pub fn settle_from_history(&mut self, session_id: &str, history: &[Message]) -> bool {
        if !self.is_generating(session_id) {
            return false;
        }
        let finished = history.last().is_some_and(|message| {
            message.info.role == Role::Assistant
                && (message.info.time.completed.is_some() || message.info.error.is_some())
        });
        finished && self.finish(session_id)
    }

    pub fn clear_all(&mut self) {
        self.sessions.clear();
    }

    /// Sessions currently generating, sorted.
    #[must_use]
    pub fn generating_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, state)| state.generating)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}
