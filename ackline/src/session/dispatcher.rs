//! Inbound request dispatch.
//!
//! Peer-initiated requests are handed to the [`RequestHandler`] injected at
//! session construction. `core`/`ping` never reaches the handler; it is
//! answered on the spot with an empty ok Response.

use std::fmt::Display;

use super::handle::Session;
use super::state::SessionState;
use crate::wire::{Payload, RemoteError, TransactionId, WireMessage};

/// A request issued by the peer.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundRequest {
    /// Service class.
    pub class: String,
    /// Command within the class.
    pub command: String,
    /// Transaction id chosen by the peer; answers must carry it.
    pub transaction_id: TransactionId,
    /// Request arguments; empty when the peer sent none.
    pub payload: Payload,
}

/// What a handler decided to do with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome<E> {
    /// Answer now with an ok Response.
    Reply(Payload),
    /// Send an Ack now and answer later through
    /// [`Session::reply_ok`] or [`Session::reply_error`].
    Ack,
    /// Answer now with an error Response.
    Fail(E),
}

/// Service logic for peer-initiated requests.
///
/// Runs on the session actor, so it must not block. Work that takes longer
/// should return [`HandlerOutcome::Ack`] and finish on a spawned task using a
/// clone of the [`Session`].
pub trait RequestHandler: Send + 'static {
    /// Error type returned through [`HandlerOutcome::Fail`].
    type Error: Display + Send;

    /// Decide how to answer `request`.
    fn handle(
        &mut self,
        request: InboundRequest,
        session: &Session,
    ) -> HandlerOutcome<Self::Error>;

    /// Translate a handler error into the `{code, error}` pair sent to the
    /// peer. Defaults to code 0 and the error's display text.
    fn map_error(&self, error: &Self::Error) -> RemoteError {
        RemoteError::new(0, error.to_string())
    }
}

/// Error returned by [`RejectingHandler`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported request {class}/{command}")]
pub struct UnsupportedRequest {
    /// Requested class.
    pub class: String,
    /// Requested command.
    pub command: String,
}

/// Handler for sessions that only issue calls: every peer request fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectingHandler;

impl RequestHandler for RejectingHandler {
    type Error = UnsupportedRequest;

    fn handle(
        &mut self,
        request: InboundRequest,
        _session: &Session,
    ) -> HandlerOutcome<Self::Error> {
        HandlerOutcome::Fail(UnsupportedRequest {
            class: request.class,
            command: request.command,
        })
    }
}

/// Answer a ping.
pub fn on_ping(transaction_id: TransactionId) -> WireMessage {
    tracing::debug!(tid = transaction_id, "answering ping");
    WireMessage::ok(transaction_id, Payload::new())
}

/// Run `request` through the handler and build the frame to send back.
pub fn on_request<H: RequestHandler>(
    handler: &mut H,
    state: &mut SessionState,
    session: &Session,
    request: InboundRequest,
) -> WireMessage {
    let transaction_id = request.transaction_id;
    tracing::debug!(
        tid = transaction_id,
        class = %request.class,
        command = %request.command,
        "dispatching peer request"
    );

    match handler.handle(request, session) {
        HandlerOutcome::Reply(payload) => WireMessage::ok(transaction_id, payload),
        HandlerOutcome::Ack => {
            if !state.owe_reply(transaction_id) {
                tracing::warn!(
                    tid = transaction_id,
                    "peer reused a transaction id still awaiting a reply"
                );
            }
            WireMessage::Ack { transaction_id }
        }
        HandlerOutcome::Fail(error) => {
            let remote = handler.map_error(&error);
            tracing::debug!(
                tid = transaction_id,
                code = remote.code,
                %error,
                "handler failed request"
            );
            WireMessage::error(transaction_id, &remote)
        }
    }
}
