//! Matches inbound Response and Ack frames to pending calls.
//!
//! A Response resolves its call exactly once. An Ack only extends the
//! deadline; a terminal Response must still follow. Frames for ids that are
//! not pending (typically a late answer racing a local timeout) are logged
//! and dropped without affecting the session.

use crate::error::ReplyError;
use crate::wire::{Outcome, Payload, RemoteError, TransactionId};

use super::state::SessionState;

/// What the correlator did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
    /// The call was resolved and its caller notified.
    Delivered,
    /// The call's deadline was extended.
    Extended,
    /// No call is pending under this id; the frame was dropped.
    UnknownTransaction,
}

/// Resolve the call answered by a Response.
pub fn on_response(
    state: &mut SessionState,
    transaction_id: TransactionId,
    outcome: Outcome,
    payload: Payload,
) -> Correlation {
    let Some(op) = state.resolve_pending(transaction_id) else {
        tracing::warn!(
            tid = transaction_id,
            ?outcome,
            "response for unknown transaction, dropping"
        );
        return Correlation::UnknownTransaction;
    };

    tracing::debug!(
        tid = transaction_id,
        ?outcome,
        elapsed = ?op.elapsed(),
        "response correlated"
    );
    let result = match outcome {
        Outcome::Ok => Ok(payload),
        Outcome::Error => Err(ReplyError::Remote(RemoteError::from_payload(&payload))),
    };
    op.complete(result);
    Correlation::Delivered
}

/// Extend the deadline of the call named by an Ack.
pub fn on_ack(state: &mut SessionState, transaction_id: TransactionId) -> Correlation {
    if state.extend_pending(transaction_id) {
        tracing::debug!(tid = transaction_id, "ack received, deadline extended");
        Correlation::Extended
    } else {
        tracing::warn!(tid = transaction_id, "ack for unknown transaction, dropping");
        Correlation::UnknownTransaction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::registry::SessionKey;
    use crate::session::pending::{AckState, TimerKey};
    use serde_json::{Value, json};
    use tokio::sync::{mpsc, oneshot};

    fn state() -> (SessionState, mpsc::UnboundedReceiver<TimerKey>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            SessionState::open(
                SessionKey::new("svc", 1),
                "peer".to_string(),
                &SessionConfig::default(),
                tx,
            ),
            rx,
        )
    }

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ok_response_delivers_payload() {
        let (mut state, _timers) = state();
        let (tx, rx) = oneshot::channel();
        let tid = state.register_pending("core".into(), "login".into(), Payload::new(), tx);

        let reply = payload(json!({"session_id": "S1"}));
        assert_eq!(
            on_response(&mut state, tid, Outcome::Ok, reply.clone()),
            Correlation::Delivered
        );
        assert_eq!(rx.await.expect("delivered"), Ok(reply));
        assert!(state.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_response_carries_code_and_message() {
        let (mut state, _timers) = state();
        let (tx, rx) = oneshot::channel();
        let tid = state.register_pending("svc".into(), "op".into(), Payload::new(), tx);

        on_response(
            &mut state,
            tid,
            Outcome::Error,
            payload(json!({"code": 12, "error": "locked"})),
        );
        assert_eq!(
            rx.await.expect("delivered"),
            Err(ReplyError::Remote(RemoteError::new(12, "locked")))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_response_without_data_uses_defaults() {
        let (mut state, _timers) = state();
        let (tx, rx) = oneshot::channel();
        let tid = state.register_pending("svc".into(), "op".into(), Payload::new(), tx);

        on_response(&mut state, tid, Outcome::Error, Payload::new());
        assert_eq!(
            rx.await.expect("delivered"),
            Err(ReplyError::Remote(RemoteError::new(0, "")))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_response_is_unknown() {
        let (mut state, _timers) = state();
        let (tx, _rx) = oneshot::channel();
        let tid = state.register_pending("svc".into(), "op".into(), Payload::new(), tx);

        assert_eq!(
            on_response(&mut state, tid, Outcome::Ok, Payload::new()),
            Correlation::Delivered
        );
        assert_eq!(
            on_response(&mut state, tid, Outcome::Ok, Payload::new()),
            Correlation::UnknownTransaction
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_extends_without_resolving() {
        let (mut state, _timers) = state();
        let (tx, mut rx) = oneshot::channel();
        let tid = state.register_pending("svc".into(), "op".into(), Payload::new(), tx);

        assert_eq!(on_ack(&mut state, tid), Correlation::Extended);
        assert_eq!(state.pending().ack_state(tid), Some(AckState::Acked));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_for_unknown_is_dropped() {
        let (mut state, _timers) = state();
        assert_eq!(on_ack(&mut state, 99), Correlation::UnknownTransaction);
    }
}
