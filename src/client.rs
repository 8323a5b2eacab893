//! The session-sync façade.
//!
//! [`SessionClient`] owns the message store, generation tracker, and
//! connection supervisor behind one mutex, and runs the single background
//! task that consumes the backend event stream. Reads are synchronous
//! snapshots; network operations are async and never hold the lock across an
//! await.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use agent_transport::{
    CommandRequest, FileAttachment, ImageAttachment, Message, RawEvent, SendMessageRequest,
    Session, SessionTransport, TransportError,
};
use agent_transport_http::HttpTransport;
use credential_store::{provider_key_name, KeyStore};
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{AuthPrompt, SyncError, SyncWarning};
use crate::generation::{AbortTicket, GenerationTracker};
use crate::lock_unpoisoned;
use crate::observers::{IdleObservers, IdleSubscription};
use crate::reconciler::{ReconcilerStats, StreamReconciler};
use crate::store::{MessageStore, UsageTotals};
use crate::supervisor::{
    reconnect_delay, ConnectionState, ConnectionStatus, ConnectionSupervisor, Directive,
};

/// A prompt to send to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessage {
    pub session_id: String,
    pub text: String,
    pub provider_id: String,
    pub model_id: String,
    pub images: Vec<ImageAttachment>,
    pub files: Vec<FileAttachment>,
}

impl SendMessage {
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        provider_id: impl Into<String>,
        model_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            text: text.into(),
            provider_id: provider_id.into(),
            model_id: model_id.into(),
            images: Vec::new(),
            files: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.images.push(image);
        self
    }

    #[must_use]
    pub fn with_file(mut self, file: FileAttachment) -> Self {
        self.files.push(file);
        self
    }

    /// No text and no attachments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.images.is_empty() && self.files.is_empty()
    }

    fn into_request(self) -> SendMessageRequest {
        SendMessageRequest {
            session_id: self.session_id,
            text: self.text,
            provider_id: self.provider_id,
            model_id: self.model_id,
            images: self.images,
            files: self.files,
        }
    }
}

#[derive(Debug, Default)]
struct SyncState {
    supervisor: ConnectionSupervisor,
    store: MessageStore,
    generation: GenerationTracker,
    reconciler: StreamReconciler,
    active_session: Option<String>,
    auth_prompt: Option<AuthPrompt>,
    warnings: Vec<SyncWarning>,
}

struct Inner {
    transport: Arc<dyn SessionTransport>,
    config: SyncConfig,
    state: Mutex<SyncState>,
    revision: watch::Sender<u64>,
    observers: IdleObservers,
    key_store: Option<Arc<dyn KeyStore>>,
    stream_task: Mutex<Option<JoinHandle<()>>>,
}

/// Clonable handle to one synchronized view of the backend.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("base_url", &self.inner.config.base_url)
            .field("connection", &self.connection())
            .finish()
    }
}

impl SessionClient {
    #[must_use]
    pub fn new(transport: Arc<dyn SessionTransport>, config: SyncConfig) -> Self {
        Self::build(transport, config, None)
    }

    #[must_use]
    pub fn with_key_store(
        transport: Arc<dyn SessionTransport>,
        config: SyncConfig,
        key_store: Arc<dyn KeyStore>,
    ) -> Self {
        Self::build(transport, config, Some(key_store))
    }

    /// Client backed by the HTTP transport described by `config`.
    pub fn from_config(config: SyncConfig) -> Result<Self, SyncError> {
        let transport = HttpTransport::new(config.http_transport_config())?;
        Ok(Self::new(Arc::new(transport), config))
    }

    fn build(
        transport: Arc<dyn SessionTransport>,
        config: SyncConfig,
        key_store: Option<Arc<dyn KeyStore>>,
    ) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                state: Mutex::new(SyncState::default()),
                revision,
                observers: IdleObservers::new(),
                key_store,
                stream_task: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    // Connection

    /// Handshakes with the backend (`list_sessions`) and starts the event
    /// stream task. The handshake itself is not retried.
    pub async fn connect(&self) -> Result<(), SyncError> {
        if self.inner.connection_state() != ConnectionState::Connected {
            let directive = self.inner.handshake().await?;
            if directive == Directive::ReloadActive {
                self.inner.reload_active().await?;
            }
        }
        self.ensure_stream_task();
        Ok(())
    }

    /// Stops the event stream task and returns to `idle`. Cached messages are
    /// kept.
    pub fn shutdown(&self) {
        if let Some(task) = lock_unpoisoned(&self.inner.stream_task).take() {
            task.abort();
        }
        {
            let mut state = self.inner.lock();
            state.supervisor.reset();
            state.generation.clear_all();
        }
        info!("session sync shut down");
        self.inner.bump();
    }

    #[must_use]
    pub fn connection(&self) -> ConnectionStatus {
        self.inner.lock().supervisor.status().clone()
    }

    pub fn dismiss_error(&self) {
        self.inner.lock().supervisor.dismiss_error();
        self.inner.bump();
    }

    // Active session

    #[must_use]
    pub fn active_session(&self) -> Option<String> {
        self.inner.lock().active_session.clone()
    }

    pub fn set_active_session(&self, session_id: impl Into<String>) {
        self.inner.lock().active_session = Some(session_id.into());
        self.inner.bump();
    }

    pub fn clear_active_session(&self) {
        self.inner.lock().active_session = None;
        self.inner.bump();
    }

    /// Makes `session_id` active and loads its history.
    pub async fn open_session(&self, session_id: &str) -> Result<(), SyncError> {
        self.set_active_session(session_id);
        self.load_messages(session_id).await
    }

    /// Fetches the session's history and replaces the cached messages.
    pub async fn load_messages(&self, session_id: &str) -> Result<(), SyncError> {
        self.inner.load_messages(session_id).await?;
        Ok(())
    }

    pub async fn reload_active(&self) -> Result<(), SyncError> {
        self.inner.reload_active().await?;
        Ok(())
    }

    // Reads

    #[must_use]
    pub fn messages(&self, session_id: &str) -> Vec<Message> {
        self.inner.lock().store.messages(session_id).to_vec()
    }

    #[must_use]
    pub fn message(&self, session_id: &str, message_id: &str) -> Option<Message> {
        self.inner
            .lock()
            .store
            .message(session_id, message_id)
            .cloned()
    }

    #[must_use]
    pub fn active_messages(&self) -> Vec<Message> {
        let state = self.inner.lock();
        state
            .active_session
            .as_deref()
            .map(|session_id| state.store.messages(session_id).to_vec())
            .unwrap_or_default()
    }

    /// Cached session metadata, most recently updated first.
    #[must_use]
    pub fn sessions(&self) -> Vec<Session> {
        self.inner.lock().store.sessions()
    }

    #[must_use]
    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.inner.lock().store.session(session_id).cloned()
    }

    #[must_use]
    pub fn is_generating(&self, session_id: &str) -> bool {
        self.inner.lock().generation.is_generating(session_id)
    }

    /// Sessions currently generating, sorted by id.
    #[must_use]
    pub fn generating_sessions(&self) -> Vec<String> {
        self.inner.lock().generation.generating_sessions()
    }

    #[must_use]
    pub fn usage_totals(&self, session_id: &str) -> UsageTotals {
        self.inner.lock().store.usage_totals(session_id)
    }

    #[must_use]
    pub fn stream_stats(&self) -> ReconcilerStats {
        self.inner.lock().reconciler.stats()
    }

    /// Revision counter bumped after every observable change.
    #[must_use]
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    // Session operations

    /// Refreshes session metadata from the backend.
    pub async fn list_sessions(&self) -> Result<Vec<Session>, SyncError> {
        let sessions = self
            .inner
            .request(self.inner.transport.list_sessions())
            .await?;
        let sessions = {
            let mut state = self.inner.lock();
            state.store.replace_sessions(sessions);
            state.store.sessions()
        };
        self.inner.bump();
        Ok(sessions)
    }

    pub async fn create_session(&self, title: Option<String>) -> Result<Session, SyncError> {
        let session = self
            .inner
            .request(self.inner.transport.create_session(title))
            .await?;
        self.inner.lock().store.upsert_session(session.clone());
        self.inner.bump();
        info!(session_id = %session.id, "session created");
        Ok(session)
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), SyncError> {
        self.inner
            .request(self.inner.transport.delete_session(session_id))
            .await?;
        {
            let mut state = self.inner.lock();
            state.store.remove_session(session_id);
            state.generation.finish(session_id);
            if state.active_session.as_deref() == Some(session_id) {
                state.active_session = None;
            }
        }
        self.inner.bump();
        info!(session_id, "session deleted");
        Ok(())
    }

    /// Returns once the backend accepted the prompt; the reply arrives
    /// through the event stream.
    pub async fn send_message(&self, message: SendMessage) -> Result<(), SyncError> {
        if message.is_empty() {
            return Err(SyncError::EmptyMessage);
        }
        let session_id = message.session_id.clone();
        self.inner
            .request(self.inner.transport.send_message(message.into_request()))
            .await?;
        debug!(%session_id, "prompt accepted");
        Ok(())
    }

    /// Runs a backend slash command (`/init`, `/review`, ...) in a session.
    pub async fn execute_command(
        &self,
        session_id: &str,
        command: &str,
        arguments: &str,
    ) -> Result<(), SyncError> {
        let command = command.trim().trim_start_matches('/');
        if command.is_empty() {
            return Err(SyncError::EmptyCommand);
        }
        let request = CommandRequest {
            session_id: session_id.to_string(),
            command: command.to_string(),
            arguments: arguments.to_string(),
            provider_id: None,
            model_id: None,
        };
        self.inner
            .request(self.inner.transport.execute_command(request))
            .await?;
        Ok(())
    }

    /// Best-effort cancel. The generation flag stays set until a terminal
    /// event arrives or the abort grace period lapses, whichever is first.
    pub async fn abort_session(&self, session_id: &str) -> Result<bool, SyncError> {
        let ticket = self.inner.lock().generation.request_abort(session_id);
        spawn_abort_grace(
            Arc::downgrade(&self.inner),
            session_id.to_string(),
            ticket,
            self.inner.config.abort_grace,
        );

        let aborted = self
            .inner
            .request(self.inner.transport.abort_session(session_id))
            .await?;
        debug!(session_id, aborted, "abort requested");
        Ok(aborted)
    }

    /// Registers `callback` for every `session.idle` event.
    pub fn on_session_idle<F>(&self, callback: F) -> IdleSubscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.observers.subscribe(callback)
    }

    // Credentials

    /// Saves the key (when a key store is configured) and pushes it to the
    /// backend. Clears a pending auth prompt for the provider.
    pub async fn set_provider_key(&self, provider_id: &str, key: &str) -> Result<(), SyncError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(SyncError::EmptyKey);
        }
        if let Some(store) = &self.inner.key_store {
            store.set(&provider_key_name(provider_id), key)?;
        }
        self.inner
            .request(self.inner.transport.set_provider_key(provider_id, key))
            .await?;

        let resolved = {
            let mut state = self.inner.lock();
            let resolved = state
                .auth_prompt
                .as_ref()
                .is_some_and(|prompt| prompt.is_resolved_by(provider_id));
            if resolved {
                state.auth_prompt = None;
            }
            resolved
        };
        if resolved {
            info!(provider_id, "auth prompt resolved");
            self.inner.bump();
        }
        Ok(())
    }

    pub fn provider_key(&self, provider_id: &str) -> Result<Option<String>, SyncError> {
        let store = self.key_store()?;
        Ok(store.get(&provider_key_name(provider_id))?)
    }

    pub fn remove_provider_key(&self, provider_id: &str) -> Result<bool, SyncError> {
        let store = self.key_store()?;
        Ok(store.delete(&provider_key_name(provider_id))?)
    }

    /// Pending credential request, if the backend rejected a provider key.
    #[must_use]
    pub fn auth_prompt(&self) -> Option<AuthPrompt> {
        self.inner.lock().auth_prompt.clone()
    }

    /// Drains accumulated warnings.
    pub fn take_warnings(&self) -> Vec<SyncWarning> {
        std::mem::take(&mut self.inner.lock().warnings)
    }

    fn key_store(&self) -> Result<&Arc<dyn KeyStore>, SyncError> {
        self.inner.key_store.as_ref().ok_or(SyncError::NoKeyStore)
    }

    fn ensure_stream_task(&self) {
        let mut task = lock_unpoisoned(&self.inner.stream_task);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        *task = Some(tokio::spawn(run_event_stream(Arc::downgrade(&self.inner))));
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SyncState> {
        lock_unpoisoned(&self.state)
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision = revision.wrapping_add(1));
    }

    fn connection_state(&self) -> ConnectionState {
        self.lock().supervisor.state()
    }

    fn backoff(&self, attempt: u32) -> Duration {
        reconnect_delay(
            attempt,
            self.config.reconnect_base,
            self.config.reconnect_max,
        )
    }

    /// Awaits a transport call, routing failures into connection state or
    /// the auth prompt.
    async fn request<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        match call.await {
            Ok(value) => Ok(value),
            Err(error) => {
                self.observe_error(&error);
                Err(error)
            }
        }
    }

    fn observe_error(&self, error: &TransportError) {
        {
            let mut state = self.lock();
            if let Some(prompt) = AuthPrompt::from_transport(error) {
                warn!(provider_id = ?prompt.provider_id, "backend rejected credentials");
                state.auth_prompt = Some(prompt);
            } else if error.is_connection_failure() {
                warn!(%error, "request failed; connection lost");
                state.supervisor.fail(error.to_string());
            } else {
                debug!(%error, "request failed");
                return;
            }
        }
        self.bump();
    }

    async fn handshake(&self) -> Result<Directive, TransportError> {
        self.lock().supervisor.begin_connect();
        self.bump();
        info!(base_url = %self.config.base_url, "connecting");

        match self.transport.list_sessions().await {
            Ok(sessions) => {
                let directive = {
                    let mut state = self.lock();
                    state.store.replace_sessions(sessions);
                    state.supervisor.mark_connected()
                };
                info!(?directive, "connected");
                self.bump();
                Ok(directive)
            }
            Err(error) => {
                {
                    let mut state = self.lock();
                    state.supervisor.fail(error.to_string());
                    if let Some(prompt) = AuthPrompt::from_transport(&error) {
                        state.auth_prompt = Some(prompt);
                    }
                }
                warn!(%error, "handshake failed");
                self.bump();
                Err(error)
            }
        }
    }

    async fn load_messages(&self, session_id: &str) -> Result<(), TransportError> {
        let messages = self
            .request(self.transport.fetch_messages(session_id))
            .await?;
        let count = messages.len();
        self.lock().store.set_messages(session_id, messages);
        debug!(session_id, count, "history loaded");
        self.bump();
        Ok(())
    }

    /// Replaces the active session's history with the server's and settles
    /// its generation flag against it, since terminal events may have been
    /// missed while disconnected.
    async fn reload_active(&self) -> Result<(), TransportError> {
        let Some(session_id) = self.lock().active_session.clone() else {
            return Ok(());
        };
        self.load_messages(&session_id).await?;

        let settled = {
            let mut guard = self.lock();
            let state = &mut *guard;
            state
                .generation
                .settle_from_history(&session_id, state.store.messages(&session_id))
        };
        if settled {
            info!(%session_id, "generation finished while disconnected");
            self.bump();
        }
        Ok(())
    }

    fn attach_stream(&self) -> Directive {
        let directive = self.lock().supervisor.stream_attached();
        info!("event stream attached");
        self.bump();
        directive
    }

    fn stream_failed(&self, error: &TransportError) {
        {
            let mut state = self.lock();
            state.supervisor.stream_detached();
            if let Some(prompt) = AuthPrompt::from_transport(error) {
                state.auth_prompt = Some(prompt);
            } else if error.is_connection_failure() && *error != TransportError::StreamClosed {
                state.supervisor.fail(error.to_string());
            }
        }
        warn!(%error, "event stream lost");
        self.bump();
    }

    fn apply_event(&self, raw: &RawEvent) {
        let outcome = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let outcome = state
                .reconciler
                .apply_raw(raw, &mut state.store, &mut state.generation);

            if let Some(outcome) = &outcome {
                if let Some(deleted) = &outcome.deleted_session {
                    if state.active_session.as_ref() == Some(deleted) {
                        state.active_session = None;
                    }
                }
                if let Some(prompt) = &outcome.auth_failure {
                    state.auth_prompt = Some(prompt.clone());
                }
            }
            outcome
        };

        let Some(outcome) = outcome else {
            return;
        };
        if outcome.changed || outcome.auth_failure.is_some() {
            self.bump();
        }
        if let Some(session_id) = &outcome.idle_session {
            let notified = self.observers.notify(session_id);
            debug!(%session_id, notified, "session idle");
        }
    }

    fn expire_abort(&self, session_id: &str, ticket: AbortTicket) {
        let forced = {
            let mut state = self.lock();
            let forced = state.generation.expire_abort(session_id, ticket);
            if forced {
                state.warnings.push(SyncWarning::AbortUnconfirmed {
                    session_id: session_id.to_string(),
                });
            }
            forced
        };
        if forced {
            warn!(
                session_id,
                grace_ms = self.config.abort_grace.as_millis() as u64,
                "abort not confirmed; clearing generation flag"
            );
            self.bump();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = lock_unpoisoned(&self.stream_task).take() {
            task.abort();
        }
    }
}

fn spawn_abort_grace(
    inner: Weak<Inner>,
    session_id: String,
    ticket: AbortTicket,
    grace: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        if let Some(inner) = inner.upgrade() {
            inner.expire_abort(&session_id, ticket);
        }
    });
}

/// Consumes the event stream until the client is dropped or shut down,
/// re-subscribing with exponential backoff and re-handshaking while the base
/// connection is in `error`.
///
/// A reload requested by recovery waits until the new stream delivers its
/// first item, so nothing the backend does between the history fetch and the
/// subscription is missed. A stream silent for longer than
/// `stream_idle_timeout` is treated as a timed-out connection.
async fn run_event_stream(inner: Weak<Inner>) {
    let mut attempt: u32 = 0;
    let mut pending_reload = false;

    loop {
        let Some(client) = inner.upgrade() else {
            return;
        };

        if client.connection_state() == ConnectionState::Error {
            match client.handshake().await {
                Ok(directive) => {
                    pending_reload |= directive == Directive::ReloadActive;
                }
                Err(_) => {
                    let delay = client.backoff(attempt);
                    drop(client);
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                    continue;
                }
            }
        }

        let transport = Arc::clone(&client.transport);
        let idle_timeout = client.config.stream_idle_timeout;
        drop(client);

        match transport.subscribe_events().await {
            Ok(mut events) => {
                let mut attached = false;
                loop {
                    let item = match tokio::time::timeout(idle_timeout, events.next()).await {
                        Ok(Some(item)) => item,
                        Ok(None) => Err(TransportError::StreamClosed),
                        Err(_) => {
                            debug!(
                                idle_ms = idle_timeout.as_millis() as u64,
                                "event stream went silent"
                            );
                            Err(TransportError::Timeout)
                        }
                    };
                    let Some(client) = inner.upgrade() else {
                        return;
                    };
                    match item {
                        Ok(raw) => {
                            if !attached {
                                attached = true;
                                attempt = 0;
                                let directive = client.attach_stream();
                                if directive == Directive::ReloadActive || pending_reload {
                                    pending_reload = false;
                                    if let Err(error) = client.reload_active().await {
                                        warn!(%error, "reload after stream attach failed");
                                    }
                                }
                            }
                            client.apply_event(&raw);
                        }
                        Err(error) => {
                            client.stream_failed(&error);
                            break;
                        }
                    }
                }
            }
            Err(error) => {
                if let Some(client) = inner.upgrade() {
                    client.stream_failed(&error);
                }
            }
        }

        let delay = match inner.upgrade() {
            Some(client) => client.backoff(attempt),
            None => return,
        };
        tokio::time::sleep(delay).await;
        attempt = attempt.saturating_add(1);
    }
}
