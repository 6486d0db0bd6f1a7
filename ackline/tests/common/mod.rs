//! Shared helpers for session integration tests.
//!
//! Each test drives a real session actor over the in-process channel
//! transport; the test body plays the remote service through a [`PeerEnd`].

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ackline::{
    HandlerOutcome, InboundRequest, Payload, PeerEnd, RejectingHandler, RequestHandler, Session,
    SessionBuilder, SessionConfig, SessionRegistry, TransactionId, WireMessage, channel_pair,
};
use serde_json::Value;
use tokio::sync::mpsc;

/// Transaction id the peer uses for barrier pings.
pub const BARRIER_TID: TransactionId = u64::MAX;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Convert a JSON object literal into a payload.
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("payload must be an object, got {other}"),
    }
}

/// Open a session with its own registry.
pub fn open<H: RequestHandler>(handler: H) -> (Session, PeerEnd, SessionRegistry) {
    open_with(handler, SessionConfig::default())
}

pub fn open_with<H: RequestHandler>(
    handler: H,
    config: SessionConfig,
) -> (Session, PeerEnd, SessionRegistry) {
    init_tracing();
    let registry = SessionRegistry::new();
    let (connection, peer) = channel_pair("svc.local:9010");
    let session = SessionBuilder::new("svc", handler)
        .config(config)
        .registry(registry.clone())
        .open(connection)
        .expect("open session");
    (session, peer, registry)
}

/// Open a session that rejects every peer request.
pub fn open_default() -> (Session, PeerEnd, SessionRegistry) {
    open(RejectingHandler)
}

/// Issue a call on a spawned task.
pub fn spawn_call(
    session: &Session,
    class: &str,
    command: &str,
    data: Payload,
) -> tokio::task::JoinHandle<Result<Payload, ackline::ReplyError>> {
    let session = session.clone();
    let class = class.to_string();
    let command = command.to_string();
    tokio::spawn(async move { session.call(class, command, data).await })
}

/// Receive the next Request, panicking on anything else.
pub async fn expect_request(peer: &mut PeerEnd) -> (String, String, TransactionId, Payload) {
    match peer.recv_message().await {
        Some(WireMessage::Request {
            class,
            command,
            transaction_id,
            payload,
        }) => (class, command, transaction_id, payload),
        other => panic!("expected a request, got {other:?}"),
    }
}

/// Wait until the session has processed every frame the peer sent so far.
///
/// The session answers pings in arrival order, so once the barrier ping is
/// answered everything before it has been handled. Frames the session sent
/// in the meantime are returned.
pub async fn barrier(peer: &mut PeerEnd) -> Vec<WireMessage> {
    assert!(
        peer.send_message(&WireMessage::Ping {
            transaction_id: BARRIER_TID
        }),
        "session gone before barrier"
    );
    let mut seen = Vec::new();
    loop {
        match peer.recv_message().await {
            Some(message) if message.transaction_id() == BARRIER_TID => {
                assert_eq!(message, WireMessage::ok(BARRIER_TID, Payload::new()));
                return seen;
            }
            Some(message) => seen.push(message),
            None => panic!("session closed before barrier was answered"),
        }
    }
}

/// Let spawned tasks run without moving the clock.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Handler that records how often it was consulted and answers by command:
/// `echo` replies with the payload, `slow` Acks and hands the request to the
/// test, anything else fails.
#[derive(Clone)]
pub struct ScriptedHandler {
    pub calls: Arc<AtomicUsize>,
    pub acked: mpsc::UnboundedSender<(Session, TransactionId)>,
}

impl ScriptedHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(Session, TransactionId)>) {
        let (acked, rx) = mpsc::unbounded_channel();
        (
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                acked,
            },
            rx,
        )
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0} is locked")]
pub struct Locked(pub String);

impl RequestHandler for ScriptedHandler {
    type Error = Locked;

    fn handle(&mut self, request: InboundRequest, session: &Session) -> HandlerOutcome<Locked> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match request.command.as_str() {
            "echo" => HandlerOutcome::Reply(request.payload),
            "slow" => {
                let _ = self.acked.send((session.clone(), request.transaction_id));
                HandlerOutcome::Ack
            }
            other => HandlerOutcome::Fail(Locked(other.to_string())),
        }
    }

    fn map_error(&self, error: &Locked) -> ackline::RemoteError {
        ackline::RemoteError::new(423, error.to_string())
    }
}
