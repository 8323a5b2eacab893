//! Backend session/message/part records.
//!
//! Field names follow the backend JSON shape so the same types decode REST
//! responses and stream-event payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Session timestamps in epoch milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTime {
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub updated: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareInfo {
    pub url: String,
}

/// One conversation thread with the backend agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub time: SessionTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<ShareInfo>,
}

impl Session {
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, created: i64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            time: SessionTime {
                created,
                updated: created,
            },
            share: None,
        }
    }

    #[must_use]
    pub fn share_url(&self) -> Option<&str> {
        self.share.as_ref().map(|share| share.url.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTime {
    #[serde(default)]
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheUsage {
    #[serde(default)]
    pub read: u64,
    #[serde(default)]
    pub write: u64,
}

/// Token counters reported for an assistant message or a finished step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default)]
    pub reasoning: u64,
    #[serde(default)]
    pub cache: CacheUsage,
}

/// Terminal error attached to an assistant message (provider/model failure).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageError {
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

impl MessageError {
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: serde_json::json!({ "message": message.into() }),
        }
    }

    /// Provider credential rejection (`ProviderAuthError` and friends).
    #[must_use]
    pub fn is_auth_error(&self) -> bool {
        self.name.ends_with("AuthError")
    }

    #[must_use]
    pub fn provider_id(&self) -> Option<&str> {
        self.data.get("providerID").and_then(Value::as_str)
    }

    /// Human-readable message, falling back to the error name.
    #[must_use]
    pub fn message(&self) -> &str {
        self.data
            .get("message")
            .and_then(Value::as_str)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or(&self.name)
    }
}

/// Message metadata without its parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub id: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub role: Role,
    #[serde(default)]
    pub time: MessageTime,
    #[serde(rename = "providerID", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(rename = "modelID", default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default)]
    pub tokens: TokenUsage,
    #[serde(default)]
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<MessageError>,
}

impl MessageInfo {
    #[must_use]
    pub fn user(id: impl Into<String>, session_id: impl Into<String>, created: i64) -> Self {
        Self::with_role(id, session_id, Role::User, created)
    }

    #[must_use]
    pub fn assistant(id: impl Into<String>, session_id: impl Into<String>, created: i64) -> Self {
        Self::with_role(id, session_id, Role::Assistant, created)
    }

    fn with_role(
        id: impl Into<String>,
        session_id: impl Into<String>,
        role: Role,
        created: i64,
    ) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.into(),
            role,
            time: MessageTime {
                created,
                completed: None,
            },
            provider_id: None,
            model_id: None,
            tokens: TokenUsage::default(),
            cost: 0.0,
            error: None,
        }
    }
}

/// A message with its ordered parts, as returned by the history endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub info: MessageInfo,
    #[serde(default)]
    pub parts: Vec<Part>,
    /// Set when the message was synthesized locally because a part arrived
    /// before the message itself.
    #[serde(skip)]
    pub placeholder: bool,
}

impl Message {
    #[must_use]
    pub fn new(info: MessageInfo, parts: Vec<Part>) -> Self {
        Self {
            info,
            parts,
            placeholder: false,
        }
    }

    #[must_use]
    pub fn placeholder(session_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            info: MessageInfo::assistant(message_id, session_id, 0),
            parts: Vec::new(),
            placeholder: true,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.info.id
    }

    #[must_use]
    pub fn part(&self, part_id: &str) -> Option<&Part> {
        self.parts.iter().find(|part| part.id == part_id)
    }
}

/// Lifecycle phase of a tool part, ordered by progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ToolPhase {
    Pending,
    Running,
    Completed,
    Error,
}

impl ToolPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Tool call state machine: `pending -> running -> {completed | error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolState {
    Pending {
        #[serde(default)]
        input: Value,
    },
    Running {
        #[serde(default)]
        input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    Completed {
        #[serde(default)]
        input: Value,
        #[serde(default)]
        output: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    Error {
        #[serde(default)]
        input: Value,
        #[serde(default)]
        error: String,
    },
}

impl ToolState {
    #[must_use]
    pub fn phase(&self) -> ToolPhase {
        match self {
            Self::Pending { .. } => ToolPhase::Pending,
            Self::Running { .. } => ToolPhase::Running,
            Self::Completed { .. } => ToolPhase::Completed,
            Self::Error { .. } => ToolPhase::Error,
        }
    }

    /// Returns false when `next` would move a finished tool call back to an
    /// in-flight phase.
    #[must_use]
    pub fn permits(&self, next: &ToolState) -> bool {
        !(self.phase().is_terminal() && !next.phase().is_terminal())
    }
}

/// Content variant of a [`Part`], tagged by the backend `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PartKind {
    Text {
        #[serde(default)]
        text: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        synthetic: bool,
    },
    Reasoning {
        #[serde(default)]
        text: String,
    },
    Tool {
        #[serde(rename = "callID", default)]
        call_id: String,
        tool: String,
        state: ToolState,
    },
    File {
        mime: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
        url: String,
    },
    StepStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        snapshot: Option<String>,
    },
    StepFinish {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default)]
        cost: f64,
        #[serde(default)]
        tokens: TokenUsage,
    },
    Agent {
        name: String,
    },
    Snapshot {
        #[serde(default)]
        snapshot: String,
    },
    Patch {
        #[serde(default)]
        hash: String,
        #[serde(default)]
        files: Vec<String>,
    },
    /// Part type this client does not know yet.
    #[serde(other)]
    Unknown,
}

/// One ordered fragment of a message's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(rename = "messageID")]
    pub message_id: String,
    #[serde(flatten)]
    pub kind: PartKind,
}

impl Part {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        session_id: impl Into<String>,
        message_id: impl Into<String>,
        kind: PartKind,
    ) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.into(),
            message_id: message_id.into(),
            kind,
        }
    }

    #[must_use]
    pub fn text(
        id: impl Into<String>,
        session_id: impl Into<String>,
        message_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            session_id,
            message_id,
            PartKind::Text {
                text: text.into(),
                synthetic: false,
            },
        )
    }

    #[must_use]
    pub fn tool_state(&self) -> Option<&ToolState> {
        match &self.kind {
            PartKind::Tool { state, .. } => Some(state),
            _ => None,
        }
    }

    /// Snapshot and patch parts carry no user-visible content.
    #[must_use]
    pub fn is_bookkeeping(&self) -> bool {
        matches!(self.kind, PartKind::Snapshot { .. } | PartKind::Patch { .. })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Message, MessageError, Part, PartKind, Role, Session, ToolPhase, ToolState};

    #[test]
    fn tool_state_never_permits_regression_from_terminal() {
        let pending = ToolState::Pending { input: json!({}) };
        let running = ToolState::Running {
            input: json!({}),
            title: None,
        };
        let completed = ToolState::Completed {
            input: json!({}),
            output: "ok".to_string(),
            title: None,
        };
        let failed = ToolState::Error {
            input: json!({}),
            error: "boom".to_string(),
        };

        assert!(pending.permits(&running));
        assert!(running.permits(&completed));
        assert!(running.permits(&pending));
        assert!(!completed.permits(&pending));
        assert!(!completed.permits(&running));
        assert!(!failed.permits(&running));
        assert!(completed.permits(&failed));
        assert_eq!(failed.phase(), ToolPhase::Error);
    }

    #[test]
    fn part_kinds_decode_from_kebab_case_type_tags() {
        let part: Part = serde_json::from_value(json!({
            "id": "p1",
            "sessionID": "s1",
            "messageID": "m1",
            "type": "step-start",
        }))
        .expect("step-start part should decode");
        assert_eq!(part.kind, PartKind::StepStart { snapshot: None });

        let tool: Part = serde_json::from_value(json!({
            "id": "p2",
            "sessionID": "s1",
            "messageID": "m1",
            "type": "tool",
            "callID": "call-1",
            "tool": "bash",
            "state": { "status": "running", "input": { "command": "ls" } },
        }))
        .expect("tool part should decode");
        assert_eq!(
            tool.tool_state().map(ToolState::phase),
            Some(ToolPhase::Running)
        );
    }

    #[test]
    fn unknown_part_types_decode_to_unknown_variant() {
        let part: Part = serde_json::from_value(json!({
            "id": "p1",
            "sessionID": "s1",
            "messageID": "m1",
            "type": "compaction",
            "auto": true,
        }))
        .expect("unknown part type should still decode");

        assert_eq!(part.kind, PartKind::Unknown);
    }

    #[test]
    fn message_decodes_history_entry_shape() {
        let message: Message = serde_json::from_value(json!({
            "info": {
                "id": "m1",
                "sessionID": "s1",
                "role": "assistant",
                "time": { "created": 10, "completed": 20 },
                "providerID": "anthropic",
                "modelID": "claude",
                "tokens": { "input": 5, "output": 7, "reasoning": 1, "cache": { "read": 2, "write": 3 } },
                "cost": 0.25,
                "error": { "name": "ProviderAuthError", "data": { "message": "bad key" } },
            },
            "parts": [
                { "id": "p1", "sessionID": "s1", "messageID": "m1", "type": "text", "text": "hi" },
            ],
        }))
        .expect("history entry should decode");

        assert_eq!(message.info.role, Role::Assistant);
        assert_eq!(message.info.tokens.cache.write, 3);
        assert_eq!(message.info.provider_id.as_deref(), Some("anthropic"));
        assert_eq!(
            message.info.error.as_ref().map(MessageError::message),
            Some("bad key")
        );
        assert_eq!(message.parts.len(), 1);
        assert!(!message.placeholder);
    }

    #[test]
    fn message_error_falls_back_to_name() {
        let error = MessageError {
            name: "MessageAbortedError".to_string(),
            data: json!({}),
        };
        assert_eq!(error.message(), "MessageAbortedError");
    }

    #[test]
    fn auth_errors_expose_provider() {
        let error: MessageError = serde_json::from_value(json!({
            "name": "ProviderAuthError",
            "data": {"providerID": "anthropic", "message": "invalid x-api-key"}
        }))
        .expect("error decodes");

        assert!(error.is_auth_error());
        assert_eq!(error.provider_id(), Some("anthropic"));
        assert!(!MessageError::new("APIError", "overloaded").is_auth_error());
    }

    #[test]
    fn session_share_url_is_optional() {
        let session: Session = serde_json::from_value(json!({
            "id": "s1",
            "title": "hello",
            "time": { "created": 1, "updated": 2 },
            "share": { "url": "https://example.com/s/1" },
        }))
        .expect("session should decode");

        assert_eq!(session.share_url(), Some("https://example.com/s/1"));
        assert_eq!(Session::new("s2", "", 5).share_url(), None);
    }
}
