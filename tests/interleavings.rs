mod fixture;

use fixture::{message_updated, session_idle, step_finish, step_start, text_part};
use serde_json::json;
use session_sync::{GenerationTracker, Message, MessageStore, RawEvent, StreamReconciler};

const SESSIONS: [&str; 3] = ["s1", "s2", "s3"];

/// Per-session event sequences. Each session's own order is fixed; only
/// the cross-session order varies.
fn sequences() -> Vec<Vec<RawEvent>> {
    vec![
        vec![
            message_updated("s1", "a1", "assistant"),
            step_start("s1", "a1", "a1-s"),
            text_part("s1", "a1", "a1-t", "one"),
            step_finish("s1", "a1", "a1-f"),
        ],
        vec![
            step_start("s2", "a2", "a2-s"),
            text_part("s2", "a2", "a2-t", "two"),
            message_updated("s2", "a2", "assistant"),
        ],
        vec![
            message_updated("s3", "a3", "assistant"),
            step_start("s3", "a3", "a3-s"),
            RawEvent::new(
                "session.error",
                json!({"sessionID": "s3", "error": {"name": "APIError", "data": {"message": "overloaded"}}}),
            ),
            session_idle("s3"),
        ],
    ]
}

fn merges(
    sequences: &[Vec<RawEvent>],
    cursors: &mut Vec<usize>,
    current: &mut Vec<RawEvent>,
    out: &mut Vec<Vec<RawEvent>>,
) {
    let mut exhausted = true;
    for index in 0..sequences.len() {
        if let Some(event) = sequences[index].get(cursors[index]) {
            exhausted = false;
            current.push(event.clone());
            cursors[index] += 1;
            merges(sequences, cursors, current, out);
            cursors[index] -= 1;
            current.pop();
        }
    }
    if exhausted {
        out.push(current.clone());
    }
}

fn all_orders() -> Vec<Vec<RawEvent>> {
    let sequences = sequences();
    let mut cursors = vec![0; sequences.len()];
    let mut out = Vec::new();
    merges(&sequences, &mut cursors, &mut Vec::new(), &mut out);
    out
}

type Snapshot = Vec<(Vec<Message>, bool)>;

fn run(events: &[RawEvent]) -> Snapshot {
    let mut reconciler = StreamReconciler::new();
    let mut store = MessageStore::new();
    let mut generation = GenerationTracker::new();
    for event in events {
        reconciler.apply_raw(event, &mut store, &mut generation);
    }
    SESSIONS
        .iter()
        .map(|id| (store.messages(id).to_vec(), generation.is_generating(id)))
        .collect()
}

#[test]
fn every_cross_session_order_yields_the_same_state() {
    let orders = all_orders();
    // 11! / (4! * 3! * 4!)
    assert_eq!(orders.len(), 11_550);

    let baseline = run(&sequences().concat());
    for order in &orders {
        assert_eq!(run(order), baseline);
    }
}

#[test]
fn sessions_settle_independently_in_the_baseline() {
    let baseline = run(&sequences().concat());

    let (s1, s1_generating) = &baseline[0];
    assert_eq!(s1.len(), 1);
    assert_eq!(s1[0].parts.len(), 3);
    assert!(!s1_generating);

    let (s2, s2_generating) = &baseline[1];
    assert_eq!(s2.len(), 1);
    assert_eq!(s2[0].parts.len(), 2);
    assert!(s2_generating);

    let (s3, s3_generating) = &baseline[2];
    assert_eq!(s3.len(), 1);
    assert!(s3[0].info.error.is_some());
    assert!(!s3_generating);
}
