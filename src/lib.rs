//! Synchronization core for AI coding-agent chat clients.
//!
//! Invariant: single writer. Every mutation of session, message, generation,
//! and connection state goes through the one mutex owned by a
//! [`SessionClient`]; the event stream is consumed by exactly one task.
//!
//! # Public API Overview
//! - Construct a [`SessionClient`] with an injected [`SessionTransport`] (or
//!   [`SessionClient::from_config`] for the HTTP backend) and call
//!   [`SessionClient::connect`].
//! - Read snapshots with [`SessionClient::messages`], [`SessionClient::sessions`],
//!   [`SessionClient::is_generating`], and watch [`SessionClient::subscribe_changes`]
//!   for revisions.
//! - Register idle observers with [`SessionClient::on_session_idle`]; the returned
//!   [`IdleSubscription`] unregisters on drop.
//! - The building blocks ([`MessageStore`], [`StreamReconciler`],
//!   [`ConnectionSupervisor`], [`GenerationTracker`]) are usable on their own.

use std::sync::{Mutex, MutexGuard};

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod generation;
pub mod logging;
pub mod observers;
pub mod reconciler;
pub mod store;
pub mod supervisor;

/// Façade and request types.
pub use crate::client::{SendMessage, SessionClient};

/// Configuration and logging setup.
pub use crate::config::SyncConfig;
pub use crate::logging::init_logging;

/// Error taxonomy.
pub use crate::error::{AuthPrompt, SyncError, SyncWarning};

/// Stream event decoding and application.
pub use crate::events::{decode, EventDecodeError, StreamEvent};
pub use crate::reconciler::{ApplyOutcome, ReconcilerStats, StreamReconciler};

/// State components.
pub use crate::generation::{AbortTicket, GenerationTracker};
pub use crate::observers::{IdleObservers, IdleSubscription};
pub use crate::store::{MessageStore, MessageUpsert, PartUpsert, UsageTotals};
pub use crate::supervisor::{
    reconnect_delay, ConnectionState, ConnectionStatus, ConnectionSupervisor, Directive,
};

/// Transport contract and domain records.
pub use agent_transport::{
    FileAttachment, ImageAttachment, Message, MessageError, MessageInfo, Part, PartKind,
    RawEvent, Role, Session, SessionTransport, TokenUsage, ToolState, TransportError,
};

/// Credential storage.
pub use credential_store::{FileKeyStore, KeyStore, MemoryKeyStore};

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
