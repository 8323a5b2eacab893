use agent_api::SseStreamParser;

#[test]
fn sse_framing_parses_events_and_skips_done() {
    let payload = concat!(
        "data: {\"type\":\"server.connected\",\"properties\":{}}\n\n",
        "data: [DONE]\n\n",
        "data: {\"type\":\"session.idle\",\"properties\":{\"sessionID\":\"s1\"}}\n\n"
    );

    let events = SseStreamParser::parse_frames(payload);
    assert_eq!(events.len(), 2);
    assert!(events[0].is_server_connected());
    assert_eq!(events[1].event_type, "session.idle");
    assert_eq!(events[1].properties["sessionID"], "s1");
}

#[test]
fn sse_parser_unwraps_directory_payload_envelope() {
    let payload = concat!(
        "data: {\"directory\":\"/work\",\"payload\":",
        "{\"type\":\"message.updated\",\"properties\":{\"info\":{\"id\":\"m1\"}}}}\n\n"
    );

    let events = SseStreamParser::parse_frames(payload);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "message.updated");
    assert_eq!(events[0].properties["info"]["id"], "m1");
}

#[test]
fn sse_parser_counts_malformed_frames_and_keeps_going() {
    let mut parser = SseStreamParser::default();
    let events = parser.feed(
        concat!(
            "data: {broken-json\n\n",
            "data: {\"properties\":{}}\n\n",
            "data: {\"type\":\"session.idle\",\"properties\":{\"sessionID\":\"s1\"}}\n\n"
        )
        .as_bytes(),
    );

    assert_eq!(events.len(), 1);
    assert_eq!(parser.malformed_frames(), 2);
}

#[test]
fn sse_parser_handles_split_frames_and_crlf() {
    let mut parser = SseStreamParser::default();
    assert!(parser
        .feed(b"data: {\"type\":\"session.idle\",\"properties\":{\"sessionID\":\"s1\"}")
        .is_empty());
    let events = parser.feed(b"}\r\n\r\n");
    assert_eq!(events.len(), 1);
    assert!(parser.is_empty_buffer());
}

#[test]
fn sse_parser_joins_multi_line_data() {
    let payload = "data: {\"type\":\"session.idle\",\ndata: \"properties\":{\"sessionID\":\"s9\"}}\n\n";
    let events = SseStreamParser::parse_frames(payload);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].properties["sessionID"], "s9");
}

#[test]
fn sse_parser_ignores_incomplete_trailing_bytes() {
    let mut parser = SseStreamParser::default();
    assert!(parser
        .feed(b"data: {\"type\":\"session.idle\"")
        .is_empty());
    assert!(!parser.is_empty_buffer());
}
