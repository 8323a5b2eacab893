use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type the backend sends once when a stream subscription opens.
pub const SERVER_CONNECTED: &str = "server.connected";

/// One decoded `data:` frame of the backend event stream.
///
/// Properties are kept as raw JSON; typing them is the consumer's job so
/// that unknown or malformed payloads can be dropped one event at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub properties: Value,
}

impl ServerEvent {
    pub fn new(event_type: impl Into<String>, properties: Value) -> Self {
        Self {
            event_type: event_type.into(),
            properties,
        }
    }

    pub fn is_server_connected(&self) -> bool {
        self.event_type == SERVER_CONNECTED
    }
}
