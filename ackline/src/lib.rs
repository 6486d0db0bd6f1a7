//! # ackline
//!
//! Multiplexed request/response sessions over one persistent connection.
//!
//! Many calls can be in flight at once; each carries a transaction id and is
//! matched to its Response when it arrives. A peer that needs more time
//! answers with an Ack first, which stretches the deadline from
//! [`OP_TIMEOUT`] to [`ACKED_TIMEOUT`]. The peer may also issue requests of
//! its own, which are handed to an injected [`RequestHandler`].
//!
//! ```text
//!  caller ─► Session::call ─► SessionActor ─► Transport ─► peer
//!                                │  ▲
//!            PendingTable ◄──────┘  └── Response / Ack / Request / Ping
//!            (5s, 180s after Ack)
//! ```
//!
//! A session whose operation times out, whose transport fails, or which
//! receives a frame it cannot understand is closed. Other sessions are not
//! affected.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// =============================================================================
// Modules
// =============================================================================

/// Session and connection configuration.
pub mod config;

/// Error types.
pub mod error;

/// Process-wide session directory.
pub mod registry;

/// Session engine: pending table, correlator, dispatcher and actor.
pub mod session;

/// Transport collaborator contract and implementations.
pub mod transport;

/// Wire message model and codec.
pub mod wire;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{
    ACKED_TIMEOUT, CALL_TIMEOUT, ConnectOptions, DEFAULT_PORT, DEFAULT_SECURE_PORT, IDLE_TIMEOUT,
    OP_TIMEOUT, SessionConfig,
};
pub use error::{CloseReason, ReplyError, SessionError, TransportError};
pub use registry::{SessionKey, SessionRegistry};
pub use session::{
    Credentials, HandlerOutcome, InboundRequest, Lifecycle, RejectingHandler, RequestHandler,
    Session, SessionBuilder, SessionStatus,
};
pub use transport::{ChannelConnector, Connection, Connector, PeerEnd, TcpConnector, channel_pair};
pub use wire::{JsonCodec, Outcome, Payload, RemoteError, TransactionId, WireCodec, WireMessage};
