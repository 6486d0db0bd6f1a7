//! Per-session state owned by the session actor.

use std::collections::HashSet;

use tokio::sync::mpsc;

use super::pending::{OutboundRequest, PendingOperation, PendingTable, ReplySink, TimerKey};
use crate::config::SessionConfig;
use crate::registry::SessionKey;
use crate::wire::{Payload, TransactionId};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Accepting calls and processing frames.
    Active,
    /// Shutting down; pending calls are being cancelled.
    Closing,
    /// The actor has exited.
    Closed,
}

/// Everything one session knows about its connection.
///
/// All mutation happens on the session actor, so nothing here is shared
/// or locked.
#[derive(Debug)]
pub struct SessionState {
    key: SessionKey,
    remote_address: String,
    next_transaction_id: TransactionId,
    pending: PendingTable,
    /// Peer requests answered with an Ack that still owe a Response.
    owed_replies: HashSet<TransactionId>,
}

impl SessionState {
    /// Create the state for a new session.
    ///
    /// Timers armed by the pending table post onto `expirations`.
    pub fn open(
        key: SessionKey,
        remote_address: String,
        config: &SessionConfig,
        expirations: mpsc::UnboundedSender<TimerKey>,
    ) -> Self {
        Self {
            key,
            remote_address,
            next_transaction_id: config.initial_transaction_id,
            pending: PendingTable::new(expirations, config.op_timeout, config.acked_timeout),
            owed_replies: HashSet::new(),
        }
    }

    /// Registry key.
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Identifier of the owning service.
    pub fn service_id(&self) -> &str {
        &self.key.service_id
    }

    /// Remote address, for diagnostics.
    pub fn remote_address(&self) -> &str {
        &self.remote_address
    }

    /// Outstanding client-issued calls.
    pub fn pending(&self) -> &PendingTable {
        &self.pending
    }

    /// Mutable access for the correlator.
    pub fn pending_mut(&mut self) -> &mut PendingTable {
        &mut self.pending
    }

    /// Allocate the next transaction id and track the call under it.
    ///
    /// Ids increase monotonically; an id still live (only possible after
    /// wrap-around) is skipped.
    pub fn register_pending(
        &mut self,
        class: String,
        command: String,
        payload: Payload,
        reply: ReplySink,
    ) -> TransactionId {
        let request = OutboundRequest {
            class,
            command,
            payload,
        };
        loop {
            let transaction_id = self.next_transaction_id;
            self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
            if !self.pending.contains(transaction_id) {
                self.pending.insert(transaction_id, request, reply);
                return transaction_id;
            }
        }
    }

    /// Remove a call and cancel its timer. Idempotent.
    pub fn resolve_pending(&mut self, transaction_id: TransactionId) -> Option<PendingOperation> {
        self.pending.resolve(transaction_id)
    }

    /// Extend a call's deadline after an Ack. No-op on unknown ids.
    pub fn extend_pending(&mut self, transaction_id: TransactionId) -> bool {
        self.pending.extend(transaction_id)
    }

    /// Remember that a peer request was Acked and still needs an answer.
    pub fn owe_reply(&mut self, transaction_id: TransactionId) -> bool {
        self.owed_replies.insert(transaction_id)
    }

    /// Settle an owed answer. Returns `false` if none was owed.
    pub fn settle_reply(&mut self, transaction_id: TransactionId) -> bool {
        self.owed_replies.remove(&transaction_id)
    }

    /// Number of Acked peer requests still awaiting an answer.
    pub fn owed_reply_count(&self) -> usize {
        self.owed_replies.len()
    }

    /// Cancel every timer and fail every pending call.
    ///
    /// Returns how many calls were cancelled. Idempotent.
    pub fn close(&mut self) -> usize {
        self.owed_replies.clear();
        self.pending.close()
    }
}
