//! Transport-only client primitives for the coding-agent backend REST API.
//!
//! This crate owns request building, error-body parsing, and server-sent
//! event framing for the backend endpoints only. It contains no session
//! state, reconciliation, or reconnect policy; those live in the
//! `session_sync` core.
//!
//! REST calls carry a bounded per-request timeout that surfaces as
//! [`AgentApiError::Timeout`]. The event stream is long-lived and is bounded
//! only by the connect timeout.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod sse;
pub mod url;

pub use client::{sse_events, AgentApiClient, ServerEventStream};
pub use config::AgentApiConfig;
pub use error::AgentApiError;
pub use events::ServerEvent;
pub use payload::{ApiKeyAuthBody, CommandBody, CreateSessionBody, ModelRef, PromptBody, PromptPart};
pub use sse::SseStreamParser;
pub use url::{endpoint_url, normalize_base_url};
