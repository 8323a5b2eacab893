#![allow(unused_imports)]

use session_sync::{
    decode, init_logging, reconnect_delay, AbortTicket, ApplyOutcome, AuthPrompt,
    ConnectionState, ConnectionStatus, ConnectionSupervisor, Directive, EventDecodeError,
    FileAttachment, FileKeyStore, GenerationTracker, IdleObservers, IdleSubscription,
    ImageAttachment, KeyStore, MemoryKeyStore, Message, MessageError, MessageInfo, MessageStore,
    MessageUpsert, Part, PartKind, PartUpsert, RawEvent, ReconcilerStats, Role, SendMessage,
    Session, SessionClient, SessionTransport, StreamEvent, StreamReconciler, SyncConfig,
    SyncError, SyncWarning, TokenUsage, ToolState, TransportError, UsageTotals,
};

#[test]
fn public_api_exports_compile() {}

#[test]
fn client_handle_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync + Clone>() {}
    assert_send_sync::<SessionClient>();
}
