//! Pending operation table.
//!
//! Tracks every client-issued call awaiting a terminal Response. Each entry
//! owns exactly one armed deadline timer. A timer is a spawned task that
//! sleeps and then posts a [`TimerKey`] onto the session's expiration queue;
//! the actor processes it like any other event.
//!
//! # Lifecycle
//!
//! ```text
//!   insert ──► Unacked (op_timeout armed)
//!                 │ ack
//!                 ▼
//!              Acked (acked_timeout armed)
//!                 │ response / expiry / close
//!                 ▼
//!              removed, timer cancelled, reply delivered once
//! ```
//!
//! Re-arming bumps the timer epoch, so an expiry that was already queued
//! for a superseded timer is recognised as stale and ignored.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::ReplyError;
use crate::wire::{Payload, TransactionId};

/// Result delivered to the issuer of a call.
pub type CallResult = Result<Payload, ReplyError>;

/// Sink through which a call's result is delivered.
pub type ReplySink = oneshot::Sender<CallResult>;

/// Acknowledgement state of a pending call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckState {
    /// No Ack received; the short deadline applies.
    Unacked,
    /// The peer acknowledged; the long deadline applies.
    Acked,
}

/// Identifies one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey {
    /// Call the timer guards.
    pub transaction_id: TransactionId,
    /// Arming generation; stale keys are ignored.
    pub epoch: u64,
}

/// Handle to an armed deadline. Dropping it cancels the timer.
#[derive(Debug)]
struct TimerHandle {
    epoch: u64,
    deadline: Instant,
    task: JoinHandle<()>,
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The request a pending call was issued with.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    /// Service class.
    pub class: String,
    /// Command within the class.
    pub command: String,
    /// Request arguments.
    pub payload: Payload,
}

/// One outstanding client-issued call.
#[derive(Debug)]
pub struct PendingOperation {
    transaction_id: TransactionId,
    request: OutboundRequest,
    reply: Option<ReplySink>,
    timer: Option<TimerHandle>,
    ack_state: AckState,
    issued_at: Instant,
}

impl PendingOperation {
    /// Transaction id of the call.
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// Request this call was issued with.
    pub fn request(&self) -> &OutboundRequest {
        &self.request
    }

    /// Whether the peer acknowledged the call.
    pub fn ack_state(&self) -> AckState {
        self.ack_state
    }

    /// Time since the call was issued.
    pub fn elapsed(&self) -> Duration {
        self.issued_at.elapsed()
    }

    /// Deliver the result to the caller.
    ///
    /// Consumes the operation, so a result can be delivered at most once.
    /// Returns `false` if the caller stopped waiting.
    pub fn complete(mut self, result: CallResult) -> bool {
        self.timer = None;
        match self.reply.take() {
            Some(sink) => {
                if sink.send(result).is_err() {
                    tracing::debug!(
                        tid = self.transaction_id,
                        "caller stopped waiting before completion"
                    );
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }
}

/// Outstanding calls keyed by transaction id.
///
/// Owned by a single session actor; needs no locking.
#[derive(Debug)]
pub struct PendingTable {
    entries: HashMap<TransactionId, PendingOperation>,
    expirations: mpsc::UnboundedSender<TimerKey>,
    next_epoch: u64,
    op_timeout: Duration,
    acked_timeout: Duration,
}

impl PendingTable {
    /// Create an empty table whose timers post onto `expirations`.
    pub fn new(
        expirations: mpsc::UnboundedSender<TimerKey>,
        op_timeout: Duration,
        acked_timeout: Duration,
    ) -> Self {
        Self {
            entries: HashMap::new(),
            expirations,
            next_epoch: 0,
            op_timeout,
            acked_timeout,
        }
    }

    /// Number of outstanding calls.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no call is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `transaction_id` is outstanding.
    pub fn contains(&self, transaction_id: TransactionId) -> bool {
        self.entries.contains_key(&transaction_id)
    }

    /// Acknowledgement state of an outstanding call.
    pub fn ack_state(&self, transaction_id: TransactionId) -> Option<AckState> {
        self.entries.get(&transaction_id).map(|op| op.ack_state)
    }

    /// Current deadline of an outstanding call.
    pub fn deadline(&self, transaction_id: TransactionId) -> Option<Instant> {
        self.entries
            .get(&transaction_id)
            .and_then(|op| op.timer.as_ref())
            .map(|timer| timer.deadline)
    }

    /// Track a new call and arm its `op_timeout` deadline.
    ///
    /// Returns `false` without touching the table if `transaction_id` is
    /// already live; the caller must pick a fresh id.
    pub fn insert(
        &mut self,
        transaction_id: TransactionId,
        request: OutboundRequest,
        reply: ReplySink,
    ) -> bool {
        if self.entries.contains_key(&transaction_id) {
            return false;
        }
        let timer = self.arm(transaction_id, self.op_timeout);
        self.entries.insert(
            transaction_id,
            PendingOperation {
                transaction_id,
                request,
                reply: Some(reply),
                timer: Some(timer),
                ack_state: AckState::Unacked,
                issued_at: Instant::now(),
            },
        );
        true
    }

    /// Remove an outstanding call and cancel its timer.
    ///
    /// Idempotent: a second resolve of the same id returns `None`.
    pub fn resolve(&mut self, transaction_id: TransactionId) -> Option<PendingOperation> {
        let mut op = self.entries.remove(&transaction_id)?;
        op.timer = None;
        Some(op)
    }

    /// Replace the deadline with `acked_timeout` and mark the call Acked.
    ///
    /// Returns `false` for an unknown id.
    pub fn extend(&mut self, transaction_id: TransactionId) -> bool {
        if !self.entries.contains_key(&transaction_id) {
            return false;
        }
        let timer = self.arm(transaction_id, self.acked_timeout);
        match self.entries.get_mut(&transaction_id) {
            Some(op) => {
                // Assigning drops, and so aborts, the previous timer.
                op.timer = Some(timer);
                op.ack_state = AckState::Acked;
                true
            }
            None => false,
        }
    }

    /// Resolve the call guarded by an expired timer.
    ///
    /// Returns `None` if the call is gone or the timer was superseded.
    pub fn expire(&mut self, key: TimerKey) -> Option<PendingOperation> {
        let current_epoch = self
            .entries
            .get(&key.transaction_id)
            .and_then(|op| op.timer.as_ref())
            .map(|timer| timer.epoch)?;
        if current_epoch != key.epoch {
            tracing::debug!(
                tid = key.transaction_id,
                epoch = key.epoch,
                current_epoch,
                "ignoring superseded timer"
            );
            return None;
        }
        self.resolve(key.transaction_id)
    }

    /// Cancel every timer and fail every call with `ReplyError::Cancelled`.
    ///
    /// Returns how many calls were cancelled. Idempotent.
    pub fn close(&mut self) -> usize {
        let cancelled = self.entries.len();
        for (_, op) in self.entries.drain() {
            op.complete(Err(ReplyError::Cancelled));
        }
        cancelled
    }

    fn arm(&mut self, transaction_id: TransactionId, timeout: Duration) -> TimerHandle {
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        let deadline = Instant::now() + timeout;
        let expirations = self.expirations.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = expirations.send(TimerKey {
                transaction_id,
                epoch,
            });
        });
        TimerHandle {
            epoch,
            deadline,
            task,
        }
    }
}
