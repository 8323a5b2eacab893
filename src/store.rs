//! In-memory view of sessions and their messages.
//!
//! Every operation is total: unknown sessions are created on first
//! reference, parts for unknown messages land in a synthesized placeholder,
//! and stale tool states are reported instead of applied.

use std::collections::{BTreeMap, HashMap};

use agent_transport::{Message, MessageError, MessageInfo, Part, Role, Session};
use tracing::{debug, warn};

/// Running aggregate of assistant token usage and cost for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageTotals {
    pub input: u64,
    pub output: u64,
    pub reasoning: u64,
    pub cache_read: u64,
    pub cache_write: u64,
    pub cost: f64,
    pub assistant_messages: usize,
}

impl UsageTotals {
    /// Full scan over `messages`.
    #[must_use]
    pub fn from_messages(messages: &[Message]) -> Self {
        let mut totals = Self::default();
        for message in messages {
            totals.add(&message.info);
        }
        totals
    }

    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.input + self.output + self.reasoning + self.cache_read + self.cache_write
    }

    fn add(&mut self, info: &MessageInfo) {
        if info.role != Role::Assistant {
            return;
        }
        self.input += info.tokens.input;
        self.output += info.tokens.output;
        self.reasoning += info.tokens.reasoning;
        self.cache_read += info.tokens.cache.read;
        self.cache_write += info.tokens.cache.write;
        self.cost += info.cost;
        self.assistant_messages += 1;
    }

    fn sub(&mut self, info: &MessageInfo) {
        if info.role != Role::Assistant {
            return;
        }
        self.input = self.input.saturating_sub(info.tokens.input);
        self.output = self.output.saturating_sub(info.tokens.output);
        self.reasoning = self.reasoning.saturating_sub(info.tokens.reasoning);
        self.cache_read = self.cache_read.saturating_sub(info.tokens.cache.read);
        self.cache_write = self.cache_write.saturating_sub(info.tokens.cache.write);
        self.cost -= info.cost;
        if self.cost.abs() < f64::EPSILON {
            self.cost = 0.0;
        }
        self.assistant_messages = self.assistant_messages.saturating_sub(1);
    }
}

/// Result of [`MessageStore::upsert_part`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartUpsert {
    /// Appended. `placeholder` is set when the owning message was unknown and
    /// had to be synthesized.
    Inserted { placeholder: bool },
    Replaced,
    /// A non-terminal tool state arrived for a part already in a terminal state.
    DiscardedStale,
}

impl PartUpsert {
    #[must_use]
    pub fn is_applied(self) -> bool {
        !matches!(self, Self::DiscardedStale)
    }
}

/// Result of [`MessageStore::upsert_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageUpsert {
    Inserted,
    Updated,
    /// Real metadata replaced a placeholder created by an earlier part.
    FilledPlaceholder,
}

#[derive(Debug, Default)]
struct SessionThread {
    messages: Vec<Message>,
    index: HashMap<String, usize>,
    totals: UsageTotals,
}

impl SessionThread {
    fn replace(&mut self, messages: Vec<Message>) {
        self.totals = UsageTotals::from_messages(&messages);
        self.messages = messages;
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index = self
            .messages
            .iter()
            .enumerate()
            .map(|(position, message)| (message.info.id.clone(), position))
            .collect();
    }

    fn position(&self, message_id: &str) -> Option<usize> {
        self.index.get(message_id).copied()
    }

    fn push(&mut self, message: Message) -> usize {
        let position = self.messages.len();
        self.totals.add(&message.info);
        self.index.insert(message.info.id.clone(), position);
        self.messages.push(message);
        position
    }
}

/// Sessions and per-session message threads.
#[derive(Debug, Default)]
pub struct MessageStore {
    sessions: BTreeMap<String, Session>,
    threads: HashMap<String, SessionThread>,
}

impl MessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the session's messages wholesale, in the given order.
    pub fn set_messages(&mut self, session_id: &str, messages: Vec<Message>) {
        self.thread_mut(session_id).replace(messages);
    }

    /// Inserts or replaces `part` in `message_id`, keeping part order.
    pub fn upsert_part(&mut self, session_id: &str, message_id: &str, part: Part) -> PartUpsert {
        let thread = self.thread_mut(session_id);

        let (position, placeholder) = match thread.position(message_id) {
            Some(position) => (position, false),
            None => {
                debug!(
                    session_id,
                    message_id,
                    part_id = %part.id,
                    "part arrived before its message; synthesizing placeholder"
                );
                let position = thread.push(Message::placeholder(session_id, message_id));
                (position, true)
            }
        };

        let message = &mut thread.messages[position];
        match message.parts.iter_mut().find(|existing| existing.id == part.id) {
            Some(existing) => {
                if let (Some(current), Some(next)) = (existing.tool_state(), part.tool_state()) {
                    if !current.permits(next) {
                        warn!(
                            session_id,
                            message_id,
                            part_id = %part.id,
                            current = ?current.phase(),
                            incoming = ?next.phase(),
                            "discarding stale tool state"
                        );
                        return PartUpsert::DiscardedStale;
                    }
                }
                *existing = part;
                PartUpsert::Replaced
            }
            None => {
                message.parts.push(part);
                PartUpsert::Inserted { placeholder }
            }
        }
    }

    /// Inserts a message or replaces its metadata. Parts are never touched.
    pub fn upsert_message(&mut self, session_id: &str, info: MessageInfo) -> MessageUpsert {
        let thread = self.thread_mut(session_id);

        match thread.position(&info.id) {
            Some(position) => {
                let message = &mut thread.messages[position];
                thread.totals.sub(&message.info);
                thread.totals.add(&info);
                message.info = info;
                if std::mem::take(&mut message.placeholder) {
                    MessageUpsert::FilledPlaceholder
                } else {
                    MessageUpsert::Updated
                }
            }
            None => {
                thread.push(Message::new(info, Vec::new()));
                MessageUpsert::Inserted
            }
        }
    }

    /// Returns whether the message existed.
    pub fn remove_message(&mut self, session_id: &str, message_id: &str) -> bool {
        let Some(thread) = self.threads.get_mut(session_id) else {
            return false;
        };
        let Some(position) = thread.position(message_id) else {
            return false;
        };

        let removed = thread.messages.remove(position);
        thread.totals.sub(&removed.info);
        thread.reindex();
        true
    }

    /// Returns whether the part existed.
    pub fn remove_part(&mut self, session_id: &str, message_id: &str, part_id: &str) -> bool {
        let Some(thread) = self.threads.get_mut(session_id) else {
            return false;
        };
        let Some(position) = thread.position(message_id) else {
            return false;
        };

        let parts = &mut thread.messages[position].parts;
        let before = parts.len();
        parts.retain(|part| part.id != part_id);
        parts.len() != before
    }

    /// Records `error` on the session's latest assistant message and returns
    /// its id. `None` when the session has no assistant message yet.
    pub fn attach_error(&mut self, session_id: &str, error: MessageError) -> Option<String> {
        let thread = self.threads.get_mut(session_id)?;
        let message = thread
            .messages
            .iter_mut()
            .rev()
            .find(|message| message.info.role == Role::Assistant)?;
        message.info.error = Some(error);
        Some(message.info.id.clone())
    }

    /// Drops the session's messages and metadata.
    pub fn remove_session(&mut self, session_id: &str) {
        self.threads.remove(session_id);
        self.sessions.remove(session_id);
    }

    pub fn upsert_session(&mut self, session: Session) {
        self.sessions.insert(session.id.clone(), session);
    }

    /// Replaces session metadata with a fresh listing. Message threads of
    /// sessions missing from the listing are dropped.
    pub fn replace_sessions(&mut self, sessions: Vec<Session>) {
        self.sessions = sessions
            .into_iter()
            .map(|session| (session.id.clone(), session))
            .collect();
        let known = &self.sessions;
        self.threads.retain(|session_id, _| known.contains_key(session_id));
    }

    /// Session metadata, most recently updated first.
    #[must_use]
    pub fn sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| {
            b.time
                .updated
                .cmp(&a.time.updated)
                .then_with(|| a.id.cmp(&b.id))
        });
        sessions
    }

    #[must_use]
    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    #[must_use]
    pub fn messages(&self, session_id: &str) -> &[Message] {
        self.threads
            .get(session_id)
            .map(|thread| thread.messages.as_slice())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn message(&self, session_id: &str, message_id: &str) -> Option<&Message> {
        let thread = self.threads.get(session_id)?;
        thread
            .position(message_id)
            .map(|position| &thread.messages[position])
    }

    #[must_use]
    pub fn usage_totals(&self, session_id: &str) -> UsageTotals {
        self.threads
            .get(session_id)
            .map(|thread| thread.totals)
            .unwrap_or_default()
    }

    fn thread_mut(&mut self, session_id: &str) -> &mut SessionThread {
        self.threads.entry(session_id.to_string()).or_default()
    }
}

#[cfg(test)]
mod tests {
    use agent_transport::{
        Message, MessageError, MessageInfo, Part, PartKind, Role, Session, TokenUsage, ToolState,
    };
    use serde_json::json;

    use super::{MessageStore, MessageUpsert, PartUpsert, UsageTotals};

    fn assistant(id: &str, session_id: &str, input: u64, output: u64, cost: f64) -> MessageInfo {
        let mut info = MessageInfo::assistant(id, session_id, 1);
        info.tokens = TokenUsage {
            input,
            output,
            ..TokenUsage::default()
        };
        info.cost = cost;
        info
    }

    fn tool_part(id: &str, state: ToolState) -> Part {
        Part::new(
            id,
            "s1",
            "m1",
            PartKind::Tool {
                call_id: "call-1".to_string(),
                tool: "bash".to_string(),
                state,
            },
        )
    }

    fn running() -> ToolState {
        ToolState::Running {
            input: json!({"command": "ls"}),
            title: None,
        }
    }

    fn completed(output: &str) -> ToolState {
        ToolState::Completed {
            input: json!({"command": "ls"}),
            output: output.to_string(),
            title: None,
        }
    }

    #[test]
    fn set_messages_then_read_returns_same_list() {
        let mut store = MessageStore::new();
        let messages = vec![
            Message::new(MessageInfo::user("m1", "s1", 1), vec![Part::text("p1", "s1", "m1", "hi")]),
            Message::new(assistant("m2", "s1", 3, 4, 0.5), Vec::new()),
        ];

        store.set_messages("s1", messages.clone());
        assert_eq!(store.messages("s1"), messages.as_slice());
        assert_eq!(store.message("s1", "m2").map(Message::id), Some("m2"));
        assert!(store.messages("other").is_empty());
    }

    #[test]
    fn upsert_part_replaces_in_place_and_appends_new() {
        let mut store = MessageStore::new();
        store.upsert_message("s1", MessageInfo::assistant("m1", "s1", 1));

        assert_eq!(
            store.upsert_part("s1", "m1", Part::text("p1", "s1", "m1", "Hel")),
            PartUpsert::Inserted { placeholder: false }
        );
        store.upsert_part("s1", "m1", Part::text("p2", "s1", "m1", "second"));
        assert_eq!(
            store.upsert_part("s1", "m1", Part::text("p1", "s1", "m1", "Hello")),
            PartUpsert::Replaced
        );

        let parts = &store.messages("s1")[0].parts;
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].id, "p1");
        assert!(matches!(&parts[0].kind, PartKind::Text { text, .. } if text == "Hello"));
        assert_eq!(parts[1].id, "p2");
    }

    #[test]
    fn part_before_message_synthesizes_placeholder_then_fills_it() {
        let mut store = MessageStore::new();

        let outcome = store.upsert_part("s1", "m9", Part::text("p1", "s1", "m9", "early"));
        assert_eq!(outcome, PartUpsert::Inserted { placeholder: true });
        let placeholder = store.message("s1", "m9").expect("placeholder exists");
        assert!(placeholder.placeholder);
        assert_eq!(placeholder.info.role, Role::Assistant);

        let mut info = assistant("m9", "s1", 10, 20, 0.25);
        info.model_id = Some("gpt".to_string());
        assert_eq!(store.upsert_message("s1", info), MessageUpsert::FilledPlaceholder);

        let message = store.message("s1", "m9").expect("message");
        assert!(!message.placeholder);
        assert_eq!(message.info.model_id.as_deref(), Some("gpt"));
        assert_eq!(message.parts.len(), 1);
        assert_eq!(store.messages("s1").len(), 1);
    }

    #[test]
    fn terminal_tool_state_never_regresses() {
        let mut store = MessageStore::new();
        store.upsert_part("s1", "m1", tool_part("t1", running()));
        store.upsert_part("s1", "m1", tool_part("t1", completed("a.txt")));

        assert_eq!(
            store.upsert_part("s1", "m1", tool_part("t1", running())),
            PartUpsert::DiscardedStale
        );
        assert_eq!(
            store.upsert_part(
                "s1",
                "m1",
                tool_part("t1", ToolState::Pending { input: json!({}) })
            ),
            PartUpsert::DiscardedStale
        );
        let part = &store.messages("s1")[0].parts[0];
        assert_eq!(part.tool_state(), Some(&completed("a.txt")));

        assert_eq!(
            store.upsert_part("s1", "m1", tool_part("t1", completed("b.txt"))),
            PartUpsert::Replaced
        );
    }

    #[test]
    fn upsert_message_keeps_parts_and_order() {
        let mut store = MessageStore::new();
        store.upsert_message("s1", MessageInfo::user("m1", "s1", 1));
        store.upsert_message("s1", MessageInfo::assistant("m2", "s1", 2));
        store.upsert_part("s1", "m2", Part::text("p1", "s1", "m2", "body"));

        let mut updated = MessageInfo::assistant("m2", "s1", 2);
        updated.time.completed = Some(9);
        assert_eq!(store.upsert_message("s1", updated), MessageUpsert::Updated);

        let ids: Vec<&str> = store.messages("s1").iter().map(Message::id).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert_eq!(store.messages("s1")[1].parts.len(), 1);
        assert_eq!(store.messages("s1")[1].info.time.completed, Some(9));
    }

    #[test]
    fn usage_totals_track_upserts_and_removals() {
        let mut store = MessageStore::new();
        store.upsert_message("s1", MessageInfo::user("u1", "s1", 1));
        store.upsert_message("s1", assistant("a1", "s1", 10, 5, 0.5));
        store.upsert_message("s1", assistant("a2", "s1", 7, 3, 0.25));
        store.upsert_message("s1", assistant("a1", "s1", 12, 8, 0.125));
        store.remove_message("s1", "a2");

        let totals = store.usage_totals("s1");
        assert_eq!(totals, UsageTotals::from_messages(store.messages("s1")));
        assert_eq!(totals.input, 12);
        assert_eq!(totals.output, 8);
        assert_eq!(totals.assistant_messages, 1);
        assert_eq!(totals.cost, 0.125);
        assert_eq!(totals.total_tokens(), 20);
    }

    #[test]
    fn remove_part_and_message_report_existence() {
        let mut store = MessageStore::new();
        store.upsert_part("s1", "m1", Part::text("p1", "s1", "m1", "x"));

        assert!(store.remove_part("s1", "m1", "p1"));
        assert!(!store.remove_part("s1", "m1", "p1"));
        assert!(store.remove_message("s1", "m1"));
        assert!(!store.remove_message("s1", "m1"));
        assert!(!store.remove_message("nope", "m1"));
    }

    #[test]
    fn remove_message_keeps_index_consistent() {
        let mut store = MessageStore::new();
        for id in ["m1", "m2", "m3"] {
            store.upsert_message("s1", MessageInfo::user(id, "s1", 1));
        }
        store.remove_message("s1", "m1");
        store.upsert_part("s1", "m3", Part::text("p", "s1", "m3", "still here"));

        assert_eq!(store.messages("s1").len(), 2);
        assert_eq!(store.message("s1", "m3").map(|m| m.parts.len()), Some(1));
    }

    #[test]
    fn attach_error_targets_latest_assistant_message() {
        let mut store = MessageStore::new();
        store.upsert_message("s1", MessageInfo::assistant("a1", "s1", 1));
        store.upsert_message("s1", MessageInfo::assistant("a2", "s1", 2));
        store.upsert_message("s1", MessageInfo::user("u3", "s1", 3));

        let target = store.attach_error("s1", MessageError::new("APIError", "overloaded"));
        assert_eq!(target.as_deref(), Some("a2"));
        let error = store.message("s1", "a2").and_then(|m| m.info.error.clone());
        assert_eq!(error.map(|e| e.message().to_string()).as_deref(), Some("overloaded"));
        assert!(store.attach_error("empty", MessageError::new("x", "y")).is_none());
    }

    #[test]
    fn sessions_sort_by_recent_update_and_replace_prunes_threads() {
        let mut store = MessageStore::new();
        let mut older = Session::new("s1", "Older", 1);
        older.time.updated = 5;
        let newer = Session::new("s2", "Newer", 10);
        store.upsert_session(older.clone());
        store.upsert_session(newer.clone());
        store.upsert_message("s1", MessageInfo::user("m1", "s1", 1));

        let ids: Vec<String> = store.sessions().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["s2".to_string(), "s1".to_string()]);

        store.replace_sessions(vec![newer]);
        assert!(store.session("s1").is_none());
        assert!(store.messages("s1").is_empty());

        store.remove_session("s2");
        assert!(store.sessions().is_empty());
    }

    #[test]
    fn sessions_are_independent() {
        let mut store = MessageStore::new();
        store.upsert_part("s1", "m1", Part::text("p1", "s1", "m1", "one"));
        store.upsert_part("s2", "m1", Part::text("p1", "s2", "m1", "two"));
        store.set_messages("s1", Vec::new());

        assert!(store.messages("s1").is_empty());
        assert_eq!(store.messages("s2").len(), 1);
    }
}
