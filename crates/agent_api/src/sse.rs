use serde_json::Value;

use crate::events::ServerEvent;

/// Incremental parser for SSE byte streams.
///
/// Bytes are buffered until a blank line terminates a frame, so multi-byte
/// UTF-8 sequences split across chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    buffer: Vec<u8>,
    malformed_frames: usize,
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ServerEvent> {
        self.buffer
            .extend(bytes.iter().copied().filter(|byte| *byte != b'\r'));
        let mut events = Vec::new();

        while let Some(split) = find_frame_end(&self.buffer) {
            let frame = String::from_utf8_lossy(&self.buffer[..split]).into_owned();
            self.buffer.drain(0..split + 2);

            let Some(payload) = extract_data_payload(&frame) else {
                continue;
            };
            if payload == "[DONE]" {
                continue;
            }

            match serde_json::from_str::<Value>(&payload)
                .ok()
                .and_then(map_event)
            {
                Some(event) => events.push(event),
                None => self.malformed_frames += 1,
            }
        }

        events
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<ServerEvent> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }

    /// Number of frames whose data was not a JSON event object.
    pub fn malformed_frames(&self) -> usize {
        self.malformed_frames
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|window| window == b"\n\n")
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

fn map_event(value: Value) -> Option<ServerEvent> {
    // Directory-scoped streams wrap each event as `{ "directory": ..., "payload": {...} }`.
    let value = match value.get("payload") {
        Some(payload) if payload.get("type").is_some() => payload.clone(),
        _ => value,
    };

    let event_type = value.get("type")?.as_str()?.trim();
    if event_type.is_empty() {
        return None;
    }

    let properties = value.get("properties").cloned().unwrap_or(Value::Null);
    Some(ServerEvent::new(event_type, properties))
}

#[cfg(test)]
mod tests {
    use super::SseStreamParser;

    #[test]
    fn parse_sse_frames_incrementally() {
        let mut parser = SseStreamParser::default();
        let mut events = Vec::new();

        events.extend(parser.feed(
            b"data: {\"type\":\"session.idle\",\"properties\":{\"sessionID\":\"s1\"}}\n\n",
        ));
        assert_eq!(events.len(), 1);

        events.extend(parser.feed(b": heartbeat\n\n"));
        assert_eq!(events.len(), 1);
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn utf8_split_across_chunks_is_preserved() {
        let frame = "data: {\"type\":\"part.updated\",\"properties\":{\"text\":\"caf\u{e9}\"}}\n\n";
        let bytes = frame.as_bytes();
        let split = frame.find('\u{e9}').expect("accented char present") + 1;

        let mut parser = SseStreamParser::default();
        assert!(parser.feed(&bytes[..split]).is_empty());
        let events = parser.feed(&bytes[split..]);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].properties["text"], "caf\u{e9}");
    }
}
