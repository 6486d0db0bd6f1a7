//! End-to-end session scenarios against a scripted peer.

mod common;

use std::time::Duration;

use ackline::{
    ChannelConnector, CloseReason, ConnectOptions, Credentials, Lifecycle, Outcome, Payload,
    RejectingHandler, RemoteError, ReplyError, SessionBuilder, SessionError, SessionRegistry,
    WireMessage,
};
use common::{barrier, expect_request, open_default, payload, spawn_call};
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn test_login_resolves_with_session_id() {
    common::init_tracing();
    let registry = SessionRegistry::new();
    let (connector, mut peers) = ChannelConnector::new();

    let server = tokio::spawn(async move {
        let mut peer = peers.recv().await.expect("connection");
        let (class, command, tid, data) = expect_request(&mut peer).await;
        assert_eq!((class.as_str(), command.as_str(), tid), ("core", "login", 1));
        assert_eq!(data, payload(json!({"user": "a", "pass": "b"})));
        assert!(peer.send_message(&WireMessage::ok(1, payload(json!({"session_id": "S1"})))));
        peer
    });

    let (session, session_id) = SessionBuilder::new("svc", RejectingHandler)
        .registry(registry.clone())
        .start(
            &connector,
            "svc.local",
            &ConnectOptions::default(),
            &Credentials::new("a", "b"),
        )
        .await
        .expect("login");
    let _peer = server.await.expect("server");

    assert_eq!(session_id, "S1");
    assert_eq!(session.remote_address(), "svc.local:9010");
    assert_eq!(session.state(), Lifecycle::Active);
    assert_eq!(registry.list_sessions(), vec![session.key().clone()]);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_call_times_out_and_closes_session() {
    let (session, mut peer, registry) = open_default();

    let call = spawn_call(&session, "svc", "op", Payload::new());
    let (_, _, tid, _) = expect_request(&mut peer).await;

    tokio::time::advance(Duration::from_millis(4_999)).await;
    assert!(!call.is_finished());

    assert_eq!(call.await.expect("join"), Err(ReplyError::Timeout));
    assert_eq!(
        session.closed().await,
        CloseReason::OperationTimeout {
            transaction_id: tid
        }
    );
    assert_eq!(session.state(), Lifecycle::Closed);
    assert!(peer.recv_frame().await.is_none());
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_ack_extends_deadline_until_late_response() {
    let (session, mut peer, _registry) = open_default();

    let call = spawn_call(&session, "svc", "op", Payload::new());
    let (_, _, tid, _) = expect_request(&mut peer).await;

    tokio::time::advance(Duration::from_secs(3)).await;
    assert!(peer.send_message(&WireMessage::Ack {
        transaction_id: tid
    }));
    barrier(&mut peer).await;

    tokio::time::advance(Duration::from_secs(117)).await;
    assert!(!call.is_finished());
    assert!(peer.send_message(&WireMessage::ok(tid, payload(json!({"done": true})))));

    assert_eq!(
        call.await.expect("join"),
        Ok(payload(json!({"done": true})))
    );
    assert_eq!(session.state(), Lifecycle::Active);
}

#[tokio::test(start_paused = true)]
async fn test_failed_peer_request_gets_error_response() {
    let (_session, mut peer, _registry) = open_default();

    assert!(peer.send_message(&WireMessage::Request {
        class: "foo".to_string(),
        command: "bar".to_string(),
        transaction_id: 7,
        payload: Payload::new(),
    }));

    let frame = peer.recv_frame().await.expect("response");
    assert_eq!(
        String::from_utf8(frame).expect("utf8"),
        r#"{"result":"error","tid":7,"data":{"code":0,"error":"unsupported request foo/bar"}}"#
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_every_pending_call() {
    let (session, mut peer, registry) = open_default();

    let first = spawn_call(&session, "svc", "a", Payload::new());
    let second = spawn_call(&session, "svc", "b", Payload::new());
    expect_request(&mut peer).await;
    expect_request(&mut peer).await;

    session.stop();

    assert_eq!(first.await.expect("join"), Err(ReplyError::Cancelled));
    assert_eq!(second.await.expect("join"), Err(ReplyError::Cancelled));
    assert_eq!(session.closed().await, CloseReason::Stopped);
    assert!(peer.recv_frame().await.is_none());
    assert!(registry.is_empty());

    assert_eq!(
        session.call("svc", "c", Payload::new()).await,
        Err(ReplyError::SessionClosed)
    );
}

#[tokio::test(start_paused = true)]
async fn test_remote_error_carries_code_and_message() {
    let (session, mut peer, _registry) = open_default();

    let call = spawn_call(&session, "svc", "op", Payload::new());
    let (_, _, tid, _) = expect_request(&mut peer).await;
    assert!(peer.send_message(&WireMessage::Response {
        transaction_id: tid,
        outcome: Outcome::Error,
        payload: payload(json!({"code": 12, "error": "locked"})),
    }));

    assert_eq!(
        call.await.expect("join"),
        Err(ReplyError::Remote(RemoteError::new(12, "locked")))
    );
    assert_eq!(session.state(), Lifecycle::Active);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_login_aborts_establishment() {
    common::init_tracing();
    let registry = SessionRegistry::new();
    let (connector, mut peers) = ChannelConnector::new();

    let server = tokio::spawn(async move {
        let mut peer = peers.recv().await.expect("connection");
        let (_, _, tid, _) = expect_request(&mut peer).await;
        peer.send_message(&WireMessage::error(tid, &RemoteError::new(401, "bad password")));
        peer
    });

    let err = SessionBuilder::new("svc", RejectingHandler)
        .registry(registry.clone())
        .start(
            &connector,
            "svc.local",
            &ConnectOptions::default(),
            &Credentials::new("a", "wrong"),
        )
        .await
        .expect_err("login rejected");
    assert!(matches!(
        err,
        SessionError::Reply(ReplyError::Remote(RemoteError { code: 401, .. }))
    ));

    let mut peer = server.await.expect("server");
    assert!(peer.recv_frame().await.is_none());
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_login_reply_without_session_id_is_rejected() {
    common::init_tracing();
    let registry = SessionRegistry::new();
    let (connector, mut peers) = ChannelConnector::new();

    let server = tokio::spawn(async move {
        let mut peer = peers.recv().await.expect("connection");
        let (_, _, tid, _) = expect_request(&mut peer).await;
        peer.send_message(&WireMessage::ok(tid, Payload::new()));
        peer
    });

    let err = SessionBuilder::new("svc", RejectingHandler)
        .registry(registry.clone())
        .start(
            &connector,
            "svc.local",
            &ConnectOptions::default(),
            &Credentials::new("a", "b"),
        )
        .await
        .expect_err("no session id");
    assert!(matches!(err, SessionError::MissingSessionId));

    let mut peer = server.await.expect("server");
    assert!(peer.recv_frame().await.is_none());
}
