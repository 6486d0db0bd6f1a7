//! The per-session event loop.
//!
//! One task per session owns the [`SessionState`] and processes three
//! queues in arrival order: commands from [`Session`] handles, frames from
//! the transport, and expired deadline timers. Nothing here is shared with
//! other sessions.

use tokio::sync::{mpsc, watch};

use super::correlator;
use super::dispatcher::{self, InboundRequest, RequestHandler};
use super::handle::Session;
use super::pending::{ReplySink, TimerKey};
use super::state::{Lifecycle, SessionState};
use crate::error::{CloseReason, ReplyError};
use crate::registry::SessionRegistry;
use crate::transport::{Connection, InboundFrame, InboundReceiver, Transport};
use crate::wire::{Payload, RemoteError, TransactionId, WireCodec, WireMessage};

/// Work queued for the actor by a [`Session`] handle.
#[derive(Debug)]
pub(crate) enum Command {
    Call {
        class: String,
        command: String,
        payload: Payload,
        reply: ReplySink,
    },
    Reply {
        transaction_id: TransactionId,
        result: Result<Payload, RemoteError>,
    },
    Stop,
}

/// Lifecycle snapshot published by the actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    /// Current lifecycle state.
    pub lifecycle: Lifecycle,
    /// Why the session stopped; set once it reaches `Closed`.
    pub reason: Option<CloseReason>,
}

impl SessionStatus {
    pub(crate) fn active() -> Self {
        Self {
            lifecycle: Lifecycle::Active,
            reason: None,
        }
    }
}

pub(crate) struct SessionActor<H, C> {
    state: SessionState,
    handler: H,
    codec: C,
    transport: Box<dyn Transport>,
    inbound: InboundReceiver,
    commands: mpsc::UnboundedReceiver<Command>,
    expirations: mpsc::UnboundedReceiver<TimerKey>,
    status: watch::Sender<SessionStatus>,
    /// Context handed to the request handler.
    session: Session,
    registry: SessionRegistry,
}

impl<H: RequestHandler, C: WireCodec> SessionActor<H, C> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        state: SessionState,
        handler: H,
        codec: C,
        connection: Connection,
        commands: mpsc::UnboundedReceiver<Command>,
        expirations: mpsc::UnboundedReceiver<TimerKey>,
        status: watch::Sender<SessionStatus>,
        session: Session,
        registry: SessionRegistry,
    ) -> Self {
        Self {
            state,
            handler,
            codec,
            transport: connection.transport,
            inbound: connection.inbound,
            commands,
            expirations,
            status,
            session,
            registry,
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::debug!("session actor started");

        let reason = loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    None => break CloseReason::Stopped,
                    Some(command) => {
                        if let Err(reason) = self.on_command(command).await {
                            break reason;
                        }
                    }
                },
                frame = self.inbound.recv() => match frame {
                    Some(InboundFrame::Data(bytes)) => {
                        if let Err(reason) = self.on_frame(&bytes).await {
                            break reason;
                        }
                    }
                    Some(InboundFrame::Closed(None)) | None => break CloseReason::TransportClosed,
                    Some(InboundFrame::Closed(Some(error))) => break CloseReason::Transport(error),
                },
                Some(key) = self.expirations.recv() => {
                    if let Some(reason) = self.on_expired(key) {
                        break reason;
                    }
                }
            }
        };

        self.shutdown(reason).await;
    }

    async fn on_command(&mut self, command: Command) -> Result<(), CloseReason> {
        match command {
            Command::Call {
                class,
                command,
                payload,
                reply,
            } => {
                let transaction_id = self.state.register_pending(
                    class.clone(),
                    command.clone(),
                    payload.clone(),
                    reply,
                );
                tracing::debug!(tid = transaction_id, %class, %command, "issuing call");
                let request = WireMessage::Request {
                    class,
                    command,
                    transaction_id,
                    payload,
                };

                let frame = match self.codec.encode(&request) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(
                            tid = transaction_id,
                            error = %e,
                            "request could not be encoded"
                        );
                        if let Some(op) = self.state.resolve_pending(transaction_id) {
                            op.complete(Err(ReplyError::ConnectionFailed {
                                message: e.to_string(),
                            }));
                        }
                        return Ok(());
                    }
                };
                if let Err(e) = self.transport.send(frame).await {
                    if let Some(op) = self.state.resolve_pending(transaction_id) {
                        op.complete(Err(ReplyError::from(e.clone())));
                    }
                    return Err(CloseReason::Transport(e));
                }
                Ok(())
            }
            Command::Reply {
                transaction_id,
                result,
            } => {
                if !self.state.settle_reply(transaction_id) {
                    tracing::warn!(
                        tid = transaction_id,
                        "reply for a transaction that is not awaiting one, dropping"
                    );
                    return Ok(());
                }
                let message = match result {
                    Ok(payload) => WireMessage::ok(transaction_id, payload),
                    Err(error) => WireMessage::error(transaction_id, &error),
                };
                self.send(&message).await
            }
            Command::Stop => Err(CloseReason::Stopped),
        }
    }

    async fn on_frame(&mut self, bytes: &[u8]) -> Result<(), CloseReason> {
        let message = self.codec.decode(bytes).map_err(|e| {
            tracing::error!(error = %e, "undecodable frame, closing session");
            CloseReason::Wire(e)
        })?;
        tracing::trace!(kind = message.kind(), tid = message.transaction_id(), "frame received");

        match message {
            WireMessage::Response {
                transaction_id,
                outcome,
                payload,
            } => {
                correlator::on_response(&mut self.state, transaction_id, outcome, payload);
                Ok(())
            }
            WireMessage::Ack { transaction_id } => {
                correlator::on_ack(&mut self.state, transaction_id);
                Ok(())
            }
            WireMessage::Ping { transaction_id } => {
                self.send(&dispatcher::on_ping(transaction_id)).await
            }
            WireMessage::Request {
                class,
                command,
                transaction_id,
                payload,
            } => {
                let request = InboundRequest {
                    class,
                    command,
                    transaction_id,
                    payload,
                };
                let answer = dispatcher::on_request(
                    &mut self.handler,
                    &mut self.state,
                    &self.session,
                    request,
                );
                self.send(&answer).await
            }
        }
    }

    fn on_expired(&mut self, key: TimerKey) -> Option<CloseReason> {
        let op = self.state.pending_mut().expire(key)?;
        let transaction_id = op.transaction_id();
        tracing::error!(
            tid = transaction_id,
            ack = ?op.ack_state(),
            class = %op.request().class,
            command = %op.request().command,
            elapsed = ?op.elapsed(),
            "operation timed out, closing session"
        );
        op.complete(Err(ReplyError::Timeout));
        Some(CloseReason::OperationTimeout { transaction_id })
    }

    async fn send(&mut self, message: &WireMessage) -> Result<(), CloseReason> {
        let frame = self.codec.encode(message)?;
        tracing::trace!(kind = message.kind(), tid = message.transaction_id(), "frame sent");
        self.transport.send(frame).await.map_err(|e| {
            tracing::error!(error = %e, "send failed, closing session");
            CloseReason::Transport(e)
        })
    }

    async fn shutdown(mut self, reason: CloseReason) {
        self.status.send_replace(SessionStatus {
            lifecycle: Lifecycle::Closing,
            reason: None,
        });

        // Calls queued behind the terminal event never reached the table.
        self.commands.close();
        let mut drained = 0usize;
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Call { reply, .. } = command {
                let _ = reply.send(Err(ReplyError::Cancelled));
                drained += 1;
            }
        }
        let owed = self.state.owed_reply_count();
        if owed > 0 {
            tracing::warn!(owed, "closing with Acked peer requests never answered");
        }
        let cancelled = self.state.close();
        self.registry.remove(self.state.key());
        self.transport.close().await;

        match &reason {
            CloseReason::Stopped | CloseReason::TransportClosed => {
                tracing::info!(%reason, cancelled, drained, owed, "session closed");
            }
            _ => tracing::error!(%reason, cancelled, drained, owed, "session terminated"),
        }
        self.status.send_replace(SessionStatus {
            lifecycle: Lifecycle::Closed,
            reason: Some(reason),
        });
    }
}
