//! Applies stream events, in delivery order, to the store and the
//! generation tracker.

use agent_transport::{PartKind, RawEvent};
use tracing::{debug, warn};

use crate::error::AuthPrompt;
use crate::events::{decode, StreamEvent};
use crate::generation::GenerationTracker;
use crate::store::{MessageStore, PartUpsert};

/// Effect of one applied event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Observable state changed.
    pub changed: bool,
    /// The event was `session.idle` for this session.
    pub idle_session: Option<String>,
    /// The backend deleted this session.
    pub deleted_session: Option<String>,
    /// A `session.error` reported rejected provider credentials.
    pub auth_failure: Option<AuthPrompt>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcilerStats {
    pub applied: u64,
    pub dropped: u64,
    pub stale_tool_states: u64,
}

#[derive(Debug, Default)]
pub struct StreamReconciler {
    stats: ReconcilerStats,
}

impl StreamReconciler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stats(&self) -> ReconcilerStats {
        self.stats
    }

    /// Decodes and applies `raw`. Malformed events are logged and dropped,
    /// returning `None`.
    pub fn apply_raw(
        &mut self,
        raw: &RawEvent,
        store: &mut MessageStore,
        generation: &mut GenerationTracker,
    ) -> Option<ApplyOutcome> {
        match decode(raw) {
            Ok(event) => {
                debug!(
                    event_type = %raw.event_type,
                    session_id = event.session_id().unwrap_or("-"),
                    "applying stream event"
                );
                Some(self.apply(event, store, generation))
            }
            Err(error) => {
                self.stats.dropped += 1;
                warn!(event_type = %raw.event_type, %error, "dropping stream event");
                None
            }
        }
    }

    pub fn apply(
        &mut self,
        event: StreamEvent,
        store: &mut MessageStore,
        generation: &mut GenerationTracker,
    ) -> ApplyOutcome {
        self.stats.applied += 1;
        let mut outcome = ApplyOutcome::default();

        match event {
            StreamEvent::ServerConnected | StreamEvent::Heartbeat => {}
            StreamEvent::MessageUpdated(info) => {
                let session_id = info.session_id.clone();
                let message_id = info.id.clone();
                let result = store.upsert_message(&session_id, info);
                debug!(%session_id, %message_id, ?result, "message updated");
                outcome.changed = true;
            }
            StreamEvent::PartUpdated(part) => {
                let session_id = part.session_id.clone();
                let message_id = part.message_id.clone();
                let boundary = match part.kind {
                    PartKind::StepStart { .. } => Some(true),
                    PartKind::StepFinish { .. } => Some(false),
                    _ => None,
                };

                let result = store.upsert_part(&session_id, &message_id, part);
                if result == PartUpsert::DiscardedStale {
                    self.stats.stale_tool_states += 1;
                    return outcome;
                }
                outcome.changed = true;

                // Redelivered step boundaries are old news.
                if !matches!(result, PartUpsert::Inserted { .. }) {
                    return outcome;
                }
                match boundary {
                    Some(true) => {
                        generation.start(&session_id);
                    }
                    Some(false) => {
                        generation.finish(&session_id);
                    }
                    None => {}
                }
            }
            StreamEvent::MessageRemoved {
                session_id,
                message_id,
            } => {
                outcome.changed = store.remove_message(&session_id, &message_id);
            }
            StreamEvent::PartRemoved {
                session_id,
                message_id,
                part_id,
            } => {
                outcome.changed = store.remove_part(&session_id, &message_id, &part_id);
            }
            StreamEvent::SessionUpdated(session) => {
                store.upsert_session(session);
                outcome.changed = true;
            }
            StreamEvent::SessionDeleted { session_id } => {
                store.remove_session(&session_id);
                generation.finish(&session_id);
                outcome.changed = true;
                outcome.deleted_session = Some(session_id);
            }
            StreamEvent::SessionIdle { session_id } => {
                outcome.changed = generation.finish(&session_id);
                outcome.idle_session = Some(session_id);
            }
            StreamEvent::SessionError { session_id, error } => {
                outcome.auth_failure = AuthPrompt::from_message_error(&error);
                let target = store.attach_error(&session_id, error);
                debug!(%session_id, message_id = ?target, "generation failed");
                generation.finish(&session_id);
                outcome.changed = true;
            }
        }

        outcome
    }
}
