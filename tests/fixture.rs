#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agent_transport_mock::MockTransport;
use serde_json::{json, Value};
use session_sync::{Message, MessageInfo, Part, RawEvent, SessionClient, SyncConfig};

pub fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(&path).unwrap_or_else(|err| panic!("failed to read fixture {name}: {err}"))
}

/// One `{type, properties}` event per non-empty line.
pub fn read_events(name: &str) -> Vec<RawEvent> {
    read_fixture(name)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let value: Value = serde_json::from_str(line)
                .unwrap_or_else(|err| panic!("bad event line in {name}: {err}"));
            let event_type = value["type"].as_str().unwrap_or_default().to_string();
            RawEvent::new(event_type, value["properties"].clone())
        })
        .collect()
}

/// Connects a client to `mock` and waits for its event stream to subscribe.
pub async fn connected(mock: MockTransport) -> (SessionClient, Arc<MockTransport>) {
    connected_with(mock, SyncConfig::default()).await
}

pub async fn connected_with(
    mock: MockTransport,
    config: SyncConfig,
) -> (SessionClient, Arc<MockTransport>) {
    let mock = Arc::new(mock);
    let client = SessionClient::new(mock.clone(), config);
    client.connect().await.expect("connect should succeed");
    mock.wait_for_subscriptions(1).await;
    (client, mock)
}

/// Polls `condition` every 5ms (virtual time under a paused clock).
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..4000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

pub fn user_message(session_id: &str, id: &str, text: &str) -> Message {
    Message::new(
        MessageInfo::user(id, session_id, 1),
        vec![Part::text(format!("{id}-p"), session_id, id, text)],
    )
}

pub fn assistant_message(session_id: &str, id: &str, text: &str) -> Message {
    Message::new(
        MessageInfo::assistant(id, session_id, 2),
        vec![Part::text(format!("{id}-p"), session_id, id, text)],
    )
}

pub fn message_updated(session_id: &str, id: &str, role: &str) -> RawEvent {
    RawEvent::new(
        "message.updated",
        json!({"info": {"id": id, "sessionID": session_id, "role": role, "time": {"created": 1}}}),
    )
}

pub fn part_event(session_id: &str, message_id: &str, id: &str, kind: Value) -> RawEvent {
    let mut part = json!({"id": id, "sessionID": session_id, "messageID": message_id});
    if let (Some(part), Some(kind)) = (part.as_object_mut(), kind.as_object()) {
        part.extend(kind.clone());
    }
    RawEvent::new("message.part.updated", json!({ "part": part }))
}

pub fn text_part(session_id: &str, message_id: &str, id: &str, text: &str) -> RawEvent {
    part_event(session_id, message_id, id, json!({"type": "text", "text": text}))
}

pub fn step_start(session_id: &str, message_id: &str, id: &str) -> RawEvent {
    part_event(session_id, message_id, id, json!({"type": "step-start"}))
}

pub fn step_finish(session_id: &str, message_id: &str, id: &str) -> RawEvent {
    part_event(
        session_id,
        message_id,
        id,
        json!({"type": "step-finish", "reason": "stop"}),
    )
}

pub fn session_idle(session_id: &str) -> RawEvent {
    RawEvent::new("session.idle", json!({ "sessionID": session_id }))
}
