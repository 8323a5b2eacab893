//! Typed decoding of backend stream events.

use std::fmt;

use agent_transport::{MessageError, MessageInfo, Part, RawEvent, Session};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A decoded stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    ServerConnected,
    /// Keep-alive with no payload.
    Heartbeat,
    MessageUpdated(MessageInfo),
    PartUpdated(Part),
    MessageRemoved {
        session_id: String,
        message_id: String,
    },
    PartRemoved {
        session_id: String,
        message_id: String,
        part_id: String,
    },
    SessionUpdated(Session),
    SessionDeleted {
        session_id: String,
    },
    SessionIdle {
        session_id: String,
    },
    SessionError {
        session_id: String,
        error: MessageError,
    },
}

impl StreamEvent {
    /// Session the event is routed to, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::ServerConnected | Self::Heartbeat => None,
            Self::MessageUpdated(info) => Some(&info.session_id),
            Self::PartUpdated(part) => Some(&part.session_id),
            Self::SessionUpdated(session) => Some(&session.id),
            Self::MessageRemoved { session_id, .. }
            | Self::PartRemoved { session_id, .. }
            | Self::SessionDeleted { session_id }
            | Self::SessionIdle { session_id }
            | Self::SessionError { session_id, .. } => Some(session_id),
        }
    }
}

/// Why a raw event could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDecodeError {
    UnknownType(String),
    MissingSessionId(String),
    InvalidPayload { event_type: String, reason: String },
}

impl fmt::Display for EventDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownType(event_type) => write!(f, "unknown event type: {event_type}"),
            Self::MissingSessionId(event_type) => {
                write!(f, "{event_type} event has no session id")
            }
            Self::InvalidPayload { event_type, reason } => {
                write!(f, "invalid {event_type} payload: {reason}")
            }
        }
    }
}

impl std::error::Error for EventDecodeError {}

/// Decodes `raw` into a [`StreamEvent`].
pub fn decode(raw: &RawEvent) -> Result<StreamEvent, EventDecodeError> {
    let event_type = raw.event_type.as_str();
    let props = &raw.properties;

    let event = match event_type {
        "server.connected" => StreamEvent::ServerConnected,
        "server.heartbeat" => StreamEvent::Heartbeat,
        "message.created" | "message.updated" => {
            let info: MessageInfo = field(event_type, props, "info")?;
            require_session(event_type, &info.session_id)?;
            StreamEvent::MessageUpdated(info)
        }
        "part.updated" | "message.part.updated" => {
            let part: Part = field(event_type, props, "part")?;
            require_session(event_type, &part.session_id)?;
            if part.message_id.is_empty() {
                return Err(invalid(event_type, "part has no message id"));
            }
            StreamEvent::PartUpdated(part)
        }
        "message.removed" => StreamEvent::MessageRemoved {
            session_id: session_id(event_type, props)?,
            message_id: string(event_type, props, "messageID")?,
        },
        "message.part.removed" | "part.removed" => StreamEvent::PartRemoved {
            session_id: session_id(event_type, props)?,
            message_id: string(event_type, props, "messageID")?,
            part_id: string(event_type, props, "partID")?,
        },
        "session.created" | "session.updated" => {
            let session: Session = field(event_type, props, "info")?;
            require_session(event_type, &session.id)?;
            StreamEvent::SessionUpdated(session)
        }
        "session.deleted" => {
            let session_id = props
                .get("info")
                .and_then(|info| info.get("id"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .map_or_else(|| session_id(event_type, props), Ok)?;
            StreamEvent::SessionDeleted { session_id }
        }
        "session.idle" => StreamEvent::SessionIdle {
            session_id: session_id(event_type, props)?,
        },
        "session.error" => {
            let error = match props.get("error") {
                Some(value) if !value.is_null() => {
                    serde_json::from_value::<MessageError>(value.clone())
                        .map_err(|error| invalid(event_type, error))?
                }
                _ => MessageError::new("UnknownError", "generation failed"),
            };
            StreamEvent::SessionError {
                session_id: session_id(event_type, props)?,
                error,
            }
        }
        other => return Err(EventDecodeError::UnknownType(other.to_string())),
    };

    Ok(event)
}

fn field<T: DeserializeOwned>(
    event_type: &str,
    props: &Value,
    key: &str,
) -> Result<T, EventDecodeError> {
    let value = props
        .get(key)
        .ok_or_else(|| invalid(event_type, format!("missing `{key}`")))?;
    serde_json::from_value(value.clone()).map_err(|error| invalid(event_type, error))
}

fn string(event_type: &str, props: &Value, key: &str) -> Result<String, EventDecodeError> {
    props
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| invalid(event_type, format!("missing `{key}`")))
}

fn session_id(event_type: &str, props: &Value) -> Result<String, EventDecodeError> {
    props
        .get("sessionID")
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| EventDecodeError::MissingSessionId(event_type.to_string()))
}

fn require_session(event_type: &str, session_id: &str) -> Result<(), EventDecodeError> {
    if session_id.is_empty() {
        return Err(EventDecodeError::MissingSessionId(event_type.to_string()));
    }
    Ok(())
}

fn invalid(event_type: &str, reason: impl fmt::Display) -> EventDecodeError {
    EventDecodeError::InvalidPayload {
        event_type: event_type.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use agent_transport::{PartKind, RawEvent, ToolState};
    use serde_json::json;

    use super::{decode, EventDecodeError, StreamEvent};

    fn raw(event_type: &str, properties: serde_json::Value) -> RawEvent {
        RawEvent::new(event_type, properties)
    }

    #[test]
    fn decodes_part_updates_under_both_names() {
        let props = json!({
            "part": {
                "id": "p1", "sessionID": "s1", "messageID": "m1",
                "type": "tool", "callID": "c1", "tool": "read",
                "state": {"status": "running", "input": {"path": "a"}}
            }
        });

        for name in ["part.updated", "message.part.updated"] {
            let event = decode(&raw(name, props.clone())).expect("decodes");
            let StreamEvent::PartUpdated(part) = event else {
                panic!("expected part update");
            };
            assert!(matches!(
                part.kind,
                PartKind::Tool { state: ToolState::Running { .. }, .. }
            ));
        }
    }

    #[test]
    fn decodes_message_updated_with_wire_field_names() {
        let event = decode(&raw(
            "message.updated",
            json!({"info": {
                "id": "m1", "sessionID": "s1", "role": "assistant",
                "time": {"created": 10},
                "providerID": "anthropic", "modelID": "claude",
                "tokens": {"input": 1, "output": 2, "reasoning": 0, "cache": {"read": 3, "write": 4}},
                "cost": 0.5
            }}),
        ))
        .expect("decodes");

        let StreamEvent::MessageUpdated(info) = event else {
            panic!("expected message update");
        };
        assert_eq!(info.session_id, "s1");
        assert_eq!(info.tokens.cache.read, 3);
        assert_eq!(info.provider_id.as_deref(), Some("anthropic"));
    }

    #[test]
    fn unknown_part_types_still_decode() {
        let event = decode(&raw(
            "message.part.updated",
            json!({"part": {"id": "p", "sessionID": "s", "messageID": "m", "type": "compaction"}}),
        ))
        .expect("decodes");
        assert!(matches!(
            event,
            StreamEvent::PartUpdated(ref part) if part.kind == PartKind::Unknown
        ));
    }

    #[test]
    fn idle_and_error_route_by_session_id() {
        let idle = decode(&raw("session.idle", json!({"sessionID": "s7"}))).expect("idle");
        assert_eq!(idle.session_id(), Some("s7"));

        let heartbeat = decode(&raw("server.heartbeat", json!({}))).expect("heartbeat");
        assert_eq!(heartbeat, StreamEvent::Heartbeat);
        assert_eq!(heartbeat.session_id(), None);

        let error = decode(&raw(
            "session.error",
            json!({"sessionID": "s7", "error": {"name": "ProviderAuthError", "data": {"message": "bad key"}}}),
        ))
        .expect("error");
        let StreamEvent::SessionError { error, .. } = error else {
            panic!("expected session error");
        };
        assert_eq!(error.name, "ProviderAuthError");
        assert_eq!(error.message(), "bad key");
    }

    #[test]
    fn session_deleted_reads_info_id() {
        let event = decode(&raw(
            "session.deleted",
            json!({"info": {"id": "s3", "title": "gone", "time": {"created": 1, "updated": 2}}}),
        ))
        .expect("decodes");
        assert_eq!(event, StreamEvent::SessionDeleted { session_id: "s3".to_string() });
    }

    #[test]
    fn malformed_events_are_classified() {
        assert_eq!(
            decode(&raw("lsp.updated", json!({}))),
            Err(EventDecodeError::UnknownType("lsp.updated".to_string()))
        );
        assert_eq!(
            decode(&raw("session.idle", json!({}))),
            Err(EventDecodeError::MissingSessionId("session.idle".to_string()))
        );
        assert!(matches!(
            decode(&raw("message.updated", json!({"info": {"id": 4}}))),
            Err(EventDecodeError::InvalidPayload { .. })
        ));
        assert!(matches!(
            decode(&raw("message.part.removed", json!({"sessionID": "s", "messageID": "m"}))),
            Err(EventDecodeError::InvalidPayload { .. })
        ));
    }
}
