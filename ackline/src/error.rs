//! Error types for ackline sessions.
//!
//! Terminal conditions (transport failure, malformed or unrecognized frames,
//! operation timeouts) close the single affected session. What a blocked
//! [`call`](crate::Session::call) observes is always a [`ReplyError`].

use serde::{Deserialize, Serialize};

use crate::transport::FrameError;
use crate::wire::{RemoteError, WireError};

/// Errors raised by a transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connect to {address} failed: {message}")]
    ConnectFailed {
        /// Address that was dialed.
        address: String,
        /// Underlying failure.
        message: String,
    },

    /// A frame could not be written.
    #[error("send failed: {message}")]
    SendFailed {
        /// Underlying failure.
        message: String,
    },

    /// Byte-level framing was corrupt.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// The connection is closed.
    #[error("transport closed")]
    Closed,
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::SendFailed {
            message: err.to_string(),
        }
    }
}

/// Failure delivered to the issuer of a call.
///
/// These errors are serializable so a caller can record or forward them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyError {
    /// No Ack within the operation timeout, or no Response within the
    /// acknowledged timeout. The session is closed as well.
    Timeout,

    /// The session was stopped or terminated while the call was pending.
    Cancelled,

    /// The peer answered with an error Response.
    Remote(RemoteError),

    /// The request could not be handed to the transport.
    ConnectionFailed {
        /// Human-readable error message.
        message: String,
    },

    /// The session was already closed when the call was issued.
    SessionClosed,
}

impl std::fmt::Display for ReplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplyError::Timeout => write!(f, "request timed out"),
            ReplyError::Cancelled => write!(f, "request cancelled"),
            ReplyError::Remote(err) => write!(f, "{}", err),
            ReplyError::ConnectionFailed { message } => {
                write!(f, "connection failed: {}", message)
            }
            ReplyError::SessionClosed => write!(f, "session closed"),
        }
    }
}

impl std::error::Error for ReplyError {}

impl From<TransportError> for ReplyError {
    fn from(err: TransportError) -> Self {
        ReplyError::ConnectionFailed {
            message: err.to_string(),
        }
    }
}

/// Errors surfaced by the session facade.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Establishing or using the transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A call failed.
    #[error("call failed: {0}")]
    Reply(#[from] ReplyError),

    /// The login reply did not carry a session identifier.
    #[error("login reply has no session_id")]
    MissingSessionId,

    /// Configuration is inconsistent.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        message: String,
    },
}

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CloseReason {
    /// `stop()` was called, or a registry sweep stopped it.
    #[error("stopped")]
    Stopped,

    /// The transport reported the connection closed.
    #[error("transport closed by peer")]
    TransportClosed,

    /// Sending failed.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// An inbound frame was malformed or unrecognized.
    #[error("wire failure: {0}")]
    Wire(#[from] WireError),

    /// A pending operation ran out of time.
    #[error("operation {transaction_id} timed out")]
    OperationTimeout {
        /// The call that timed out.
        transaction_id: u64,
    },
}
