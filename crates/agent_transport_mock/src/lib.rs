//! Deterministic in-memory implementation of the shared `agent_transport`
//! contract.
//!
//! The mock keeps sessions and histories in memory, records every outbound
//! call, and lets tests push stream events, inject failures, and drop the
//! event stream on demand. It contains no wire logic.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use agent_transport::{
    CommandRequest, EventStream, Message, MessageInfo, Part, PartKind, RawEvent,
    SendMessageRequest, Session, SessionTransport, TokenUsage, TransportError,
};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::json;
use tokio::sync::{mpsc, Notify};

type EventSender = mpsc::UnboundedSender<Result<RawEvent, TransportError>>;

/// Transport operation a scripted failure can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    ListSessions,
    CreateSession,
    DeleteSession,
    FetchMessages,
    SendMessage,
    ExecuteCommand,
    AbortSession,
    SetProviderKey,
    SubscribeEvents,
}

#[derive(Debug, Default)]
struct MockState {
    sessions: Vec<Session>,
    histories: HashMap<String, Vec<Message>>,
    failures: HashMap<MockOperation, VecDeque<TransportError>>,
    subscribers: Vec<EventSender>,
    subscribe_calls: usize,
    fetch_calls: Vec<String>,
    sent_messages: Vec<SendMessageRequest>,
    commands: Vec<CommandRequest>,
    aborted: Vec<String>,
    abort_result: bool,
    provider_keys: Vec<(String, String)>,
    scripted_reply: Option<Vec<String>>,
    histories_on_subscribe: Vec<(String, Vec<Message>)>,
    clock: i64,
    next_id: u64,
}

impl MockState {
    fn take_failure(&mut self, operation: MockOperation) -> Result<(), TransportError> {
        match self
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{:04}", self.next_id)
    }

    fn broadcast(&mut self, event: RawEvent) -> usize {
        self.subscribers.retain(|sender| !sender.is_closed());
        let mut delivered = 0;
        for sender in &self.subscribers {
            if sender.send(Ok(event.clone())).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

/// Scriptable [`SessionTransport`] used by `session_sync` tests and local runs.
#[derive(Debug)]
pub struct MockTransport {
    state: Mutex<MockState>,
    subscribed: Notify,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                abort_result: true,
                ..MockState::default()
            }),
            subscribed: Notify::new(),
        }
    }

    /// Seeds the backend session list.
    #[must_use]
    pub fn with_sessions(self, sessions: Vec<Session>) -> Self {
        lock_unpoisoned(&self.state).sessions = sessions;
        self
    }

    /// Makes every accepted prompt stream back a deterministic assistant
    /// reply built from `chunks`, followed by `session.idle`.
    #[must_use]
    pub fn with_scripted_reply(self, chunks: Vec<String>) -> Self {
        lock_unpoisoned(&self.state).scripted_reply = Some(chunks);
        self
    }

    /// Replaces the server-side history returned by `fetch_messages`.
    pub fn set_history(&self, session_id: &str, messages: Vec<Message>) {
        lock_unpoisoned(&self.state)
            .histories
            .insert(session_id.to_string(), messages);
    }

    /// Replaces `session_id`'s history during the next successful
    /// `subscribe_events`, the way a backend that keeps working between a
    /// client's history fetch and its re-subscription would.
    pub fn set_history_on_subscribe(&self, session_id: &str, messages: Vec<Message>) {
        lock_unpoisoned(&self.state)
            .histories_on_subscribe
            .push((session_id.to_string(), messages));
    }

    #[must_use]
    pub fn history(&self, session_id: &str) -> Vec<Message> {
        lock_unpoisoned(&self.state)
            .histories
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Queues `error` as the result of the next call to `operation`.
    pub fn fail_next(&self, operation: MockOperation, error: TransportError) {
        lock_unpoisoned(&self.state)
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    pub fn set_abort_result(&self, aborted: bool) {
        lock_unpoisoned(&self.state).abort_result = aborted;
    }

    /// Delivers an event to every open stream. Returns the number of
    /// streams that received it.
    pub fn emit(&self, event: RawEvent) -> usize {
        lock_unpoisoned(&self.state).broadcast(event)
    }

    pub fn emit_event(&self, event_type: &str, properties: serde_json::Value) -> usize {
        self.emit(RawEvent::new(event_type, properties))
    }

    /// Fails every open stream with `error`, then closes it.
    pub fn fail_streams(&self, error: TransportError) {
        let mut state = lock_unpoisoned(&self.state);
        for sender in state.subscribers.drain(..) {
            let _ = sender.send(Err(error.clone()));
        }
    }

    /// Closes every open stream the way a dropped server connection does.
    pub fn disconnect_streams(&self) {
        self.fail_streams(TransportError::StreamClosed);
    }

    #[must_use]
    pub fn open_streams(&self) -> usize {
        let mut state = lock_unpoisoned(&self.state);
        state.subscribers.retain(|sender| !sender.is_closed());
        state.subscribers.len()
    }

    #[must_use]
    pub fn subscribe_calls(&self) -> usize {
        lock_unpoisoned(&self.state).subscribe_calls
    }

    /// Waits until `subscribe_events` has succeeded at least `count` times.
    pub async fn wait_for_subscriptions(&self, count: usize) {
        loop {
            let notified = self.subscribed.notified();
            if self.subscribe_calls() >= count {
                return;
            }
            notified.await;
        }
    }

    #[must_use]
    pub fn fetch_calls(&self) -> Vec<String> {
        lock_unpoisoned(&self.state).fetch_calls.clone()
    }

    #[must_use]
    pub fn sent_messages(&self) -> Vec<SendMessageRequest> {
        lock_unpoisoned(&self.state).sent_messages.clone()
    }

    #[must_use]
    pub fn commands(&self) -> Vec<CommandRequest> {
        lock_unpoisoned(&self.state).commands.clone()
    }

    #[must_use]
    pub fn aborted_sessions(&self) -> Vec<String> {
        lock_unpoisoned(&self.state).aborted.clone()
    }

    #[must_use]
    pub fn provider_keys(&self) -> Vec<(String, String)> {
        lock_unpoisoned(&self.state).provider_keys.clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionTransport for MockTransport {
    async fn list_sessions(&self) -> Result<Vec<Session>, TransportError> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(MockOperation::ListSessions)?;
        Ok(state.sessions.clone())
    }

    async fn create_session(&self, title: Option<String>) -> Result<Session, TransportError> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(MockOperation::CreateSession)?;

        let id = state.next_id("ses");
        let created = state.tick();
        let title = sanitize_title(title).unwrap_or_else(|| format!("Session {id}"));
        let session = Session::new(id, title, created);
        state.sessions.push(session.clone());
        state.broadcast(RawEvent::new(
            "session.created",
            json!({ "info": session }),
        ));
        Ok(session)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), TransportError> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(MockOperation::DeleteSession)?;

        let Some(index) = state.sessions.iter().position(|s| s.id == session_id) else {
            return Err(TransportError::Status {
                status: 404,
                message: format!("session not found: {session_id}"),
            });
        };
        let session = state.sessions.remove(index);
        state.histories.remove(session_id);
        state.broadcast(RawEvent::new(
            "session.deleted",
            json!({ "info": session }),
        ));
        Ok(())
    }

    async fn fetch_messages(&self, session_id: &str) -> Result<Vec<Message>, TransportError> {
        let mut state = lock_unpoisoned(&self.state);
        state.fetch_calls.push(session_id.to_string());
        state.take_failure(MockOperation::FetchMessages)?;
        Ok(state.histories.get(session_id).cloned().unwrap_or_default())
    }

    async fn send_message(&self, request: SendMessageRequest) -> Result<(), TransportError> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(MockOperation::SendMessage)?;

        let session_id = request.session_id.clone();
        let user = user_message(&mut state, &request);
        state.sent_messages.push(request);
        for event in message_events(&user) {
            state.broadcast(event);
        }
        state
            .histories
            .entry(session_id.clone())
            .or_default()
            .push(user);

        if let Some(chunks) = state.scripted_reply.clone() {
            let events = scripted_reply(&mut state, &session_id, &chunks);
            for event in events {
                state.broadcast(event);
            }
        }
        Ok(())
    }

    async fn execute_command(&self, request: CommandRequest) -> Result<(), TransportError> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(MockOperation::ExecuteCommand)?;
        state.commands.push(request);
        Ok(())
    }

    async fn abort_session(&self, session_id: &str) -> Result<bool, TransportError> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(MockOperation::AbortSession)?;
        state.aborted.push(session_id.to_string());
        Ok(state.abort_result)
    }

    async fn set_provider_key(&self, provider_id: &str, key: &str) -> Result<(), TransportError> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(MockOperation::SetProviderKey)?;
        state
            .provider_keys
            .push((provider_id.to_string(), key.to_string()));
        Ok(())
    }

    async fn subscribe_events(&self) -> Result<EventStream, TransportError> {
        let receiver = {
            let mut state = lock_unpoisoned(&self.state);
            state.take_failure(MockOperation::SubscribeEvents)?;
            for (session_id, messages) in std::mem::take(&mut state.histories_on_subscribe) {
                state.histories.insert(session_id, messages);
            }
            let (sender, receiver) = mpsc::unbounded_channel();
            let _ = sender.send(Ok(RawEvent::new("server.connected", json!({}))));
            state.subscribers.push(sender);
            state.subscribe_calls += 1;
            receiver
        };
        self.subscribed.notify_waiters();

        Ok(stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|item| (item, receiver))
        })
        .boxed())
    }
}

fn user_message(state: &mut MockState, request: &SendMessageRequest) -> Message {
    let message_id = state.next_id("msg");
    let part_id = state.next_id("prt");
    let created = state.tick();
    let mut info = MessageInfo::user(message_id.clone(), request.session_id.clone(), created);
    info.provider_id = Some(request.provider_id.clone());
    info.model_id = Some(request.model_id.clone());

    let mut parts = Vec::new();
    if !request.text.trim().is_empty() {
        parts.push(Part::text(
            part_id,
            request.session_id.clone(),
            message_id,
            request.text.clone(),
        ));
    }
    Message::new(info, parts)
}

fn scripted_reply(state: &mut MockState, session_id: &str, chunks: &[String]) -> Vec<RawEvent> {
    let message_id = state.next_id("msg");
    let created = state.tick();
    let mut info = MessageInfo::assistant(message_id.clone(), session_id, created);
    info.provider_id = Some("mock".to_string());
    info.model_id = Some("mock".to_string());

    let mut events = vec![RawEvent::new("message.updated", json!({ "info": info }))];
    let mut parts = Vec::new();

    let step_start = Part::new(
        state.next_id("prt"),
        session_id,
        message_id.clone(),
        PartKind::StepStart { snapshot: None },
    );
    events.push(part_event(&step_start));
    parts.push(step_start);

    let text_id = state.next_id("prt");
    let mut text = String::new();
    for chunk in chunks {
        text.push_str(chunk);
        events.push(part_event(&Part::text(
            text_id.clone(),
            session_id,
            message_id.clone(),
            text.clone(),
        )));
    }
    if !chunks.is_empty() {
        parts.push(Part::text(text_id, session_id, message_id.clone(), text.clone()));
    }

    let tokens = TokenUsage {
        input: 1,
        output: chunks.len() as u64,
        ..TokenUsage::default()
    };
    let step_finish = Part::new(
        state.next_id("prt"),
        session_id,
        message_id,
        PartKind::StepFinish {
            reason: Some("stop".to_string()),
            cost: 0.0,
            tokens,
        },
    );
    events.push(part_event(&step_finish));
    parts.push(step_finish);

    info.tokens = tokens;
    info.time.completed = Some(state.tick());
    events.push(RawEvent::new("message.updated", json!({ "info": info })));
    events.push(RawEvent::new(
        "session.idle",
        json!({ "sessionID": session_id }),
    ));

    state
        .histories
        .entry(session_id.to_string())
        .or_default()
        .push(Message::new(info, parts));
    events
}

fn message_events(message: &Message) -> Vec<RawEvent> {
    let mut events = vec![RawEvent::new(
        "message.updated",
        json!({ "info": message.info }),
    )];
    events.extend(message.parts.iter().map(part_event));
    events
}

fn part_event(part: &Part) -> RawEvent {
    RawEvent::new("message.part.updated", json!({ "part": part }))
}

fn sanitize_title(title: Option<String>) -> Option<String> {
    title
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
