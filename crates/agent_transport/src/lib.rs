//! Backend-neutral transport contract for the session-sync core.
//!
//! This crate defines the session/message/part records shared by every
//! transport, the raw stream-event envelope, and the async
//! [`SessionTransport`] trait. It contains no HTTP, SSE framing, or
//! reconciliation logic.

pub mod model;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;

pub use model::{
    CacheUsage, Message, MessageError, MessageInfo, MessageTime, Part, PartKind, Role, Session,
    SessionTime, ShareInfo, TokenUsage, ToolPhase, ToolState,
};

/// Error returned by transport operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request did not complete within the transport's bounded timeout.
    #[error("connection timeout")]
    Timeout,
    #[error("server unreachable: {0}")]
    Unreachable(String),
    /// Credentials were rejected; `provider_id` is set when the backend named
    /// the provider whose key is missing or invalid.
    #[error("authentication failed: {message}")]
    Unauthorized {
        provider_id: Option<String>,
        message: String,
    },
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("event stream closed")]
    StreamClosed,
    #[error("{0}")]
    Unsupported(String),
}

impl TransportError {
    /// Returns true for failures that mean the backend connection itself is
    /// unhealthy (as opposed to a rejected individual request).
    #[must_use]
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Unreachable(_) | Self::StreamClosed
        )
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Undecoded server-sent event: `{ "type": ..., "properties": ... }`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub event_type: String,
    pub properties: Value,
}

impl RawEvent {
    #[must_use]
    pub fn new(event_type: impl Into<String>, properties: Value) -> Self {
        Self {
            event_type: event_type.into(),
            properties,
        }
    }
}

/// Image bytes attached to an outgoing prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub mime: String,
    pub filename: Option<String>,
    pub data: Vec<u8>,
}

/// File reference attached to an outgoing prompt (for example a `file://` URL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    pub mime: String,
    pub filename: Option<String>,
    pub url: String,
}

/// Input required to queue one user prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessageRequest {
    pub session_id: String,
    pub text: String,
    pub provider_id: String,
    pub model_id: String,
    pub images: Vec<ImageAttachment>,
    pub files: Vec<FileAttachment>,
}

/// Named slash-command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub session_id: String,
    pub command: String,
    pub arguments: String,
    pub provider_id: Option<String>,
    pub model_id: Option<String>,
}

/// Ordered stream of raw backend events. An `Err` item or end of stream
/// means the subscription is gone and must be re-established.
pub type EventStream = BoxStream<'static, Result<RawEvent, TransportError>>;

/// Request/response and event-stream operations the core consumes.
#[async_trait]
pub trait SessionTransport: Send + Sync + 'static {
    async fn list_sessions(&self) -> Result<Vec<Session>, TransportError>;

    async fn create_session(&self, title: Option<String>) -> Result<Session, TransportError>;

    async fn delete_session(&self, session_id: &str) -> Result<(), TransportError>;

    /// Returns the full ordered history of a session.
    async fn fetch_messages(&self, session_id: &str) -> Result<Vec<Message>, TransportError>;

    /// Queues a prompt. Resolves once the backend accepted it, not once the
    /// assistant reply completes.
    async fn send_message(&self, request: SendMessageRequest) -> Result<(), TransportError>;

    async fn execute_command(&self, request: CommandRequest) -> Result<(), TransportError>;

    /// Asks the backend to stop the session's in-flight generation.
    async fn abort_session(&self, session_id: &str) -> Result<bool, TransportError>;

    /// Stores a provider API key on the backend.
    ///
    /// Transports may return an error when the backend has no credential
    /// endpoint.
    async fn set_provider_key(&self, provider_id: &str, _key: &str) -> Result<(), TransportError> {
        Err(TransportError::Unsupported(format!(
            "setting provider keys is not supported by this transport ({provider_id})"
        )))
    }

    async fn subscribe_events(&self) -> Result<EventStream, TransportError>;
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use futures_util::stream;
    use serde_json::json;

    use super::{
        CommandRequest, EventStream, Message, RawEvent, SendMessageRequest, Session,
        SessionTransport, TransportError,
    };

    struct MinimalTransport;

    #[async_trait]
    impl SessionTransport for MinimalTransport {
        async fn list_sessions(&self) -> Result<Vec<Session>, TransportError> {
            Ok(vec![Session::new("s1", "first", 1)])
        }

        async fn create_session(&self, title: Option<String>) -> Result<Session, TransportError> {
            Ok(Session::new("s2", title.unwrap_or_default(), 2))
        }

        async fn delete_session(&self, _session_id: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn fetch_messages(&self, _session_id: &str) -> Result<Vec<Message>, TransportError> {
            Ok(Vec::new())
        }

        async fn send_message(&self, _request: SendMessageRequest) -> Result<(), TransportError> {
            Ok(())
        }

        async fn execute_command(&self, _request: CommandRequest) -> Result<(), TransportError> {
            Ok(())
        }

        async fn abort_session(&self, _session_id: &str) -> Result<bool, TransportError> {
            Ok(false)
        }

        async fn subscribe_events(&self) -> Result<EventStream, TransportError> {
            Ok(Box::pin(stream::iter(vec![Ok(RawEvent::new(
                "server.connected",
                json!({}),
            ))])))
        }
    }

    #[tokio::test]
    async fn default_provider_key_hook_reports_unsupported() {
        let error = MinimalTransport
            .set_provider_key("anthropic", "sk-test")
            .await
            .expect_err("minimal transport should not support provider keys");

        assert!(matches!(error, TransportError::Unsupported(message) if message.contains("anthropic")));
    }

    #[test]
    fn timeout_is_distinct_from_unreachable() {
        assert_eq!(TransportError::Timeout.to_string(), "connection timeout");
        assert_ne!(
            TransportError::Timeout,
            TransportError::Unreachable("connection refused".to_string())
        );
        assert!(TransportError::Timeout.is_connection_failure());
        assert!(!TransportError::Status {
            status: 400,
            message: "bad".to_string(),
        }
        .is_connection_failure());
    }

    #[test]
    fn unauthorized_errors_are_classified() {
        let error = TransportError::Unauthorized {
            provider_id: Some("openai".to_string()),
            message: "invalid api key".to_string(),
        };
        assert!(error.is_unauthorized());
        assert!(!error.is_connection_failure());
        assert_eq!(error.to_string(), "authentication failed: invalid api key");
    }
}
