//! Transport collaborator contract.
//!
//! A session never touches sockets directly. It is handed a [`Connection`]:
//! a [`Transport`] that accepts encoded frames, plus a channel on which the
//! transport delivers inbound frames and, finally, a close notification.
//!
//! ```text
//! ┌──────────────┐  send(bytes)   ┌───────────┐
//! │ session actor├───────────────►│ Transport │──► peer
//! │              │◄───────────────┤  reader   │◄── peer
//! └──────────────┘  InboundFrame  └───────────┘
//! ```
//!
//! Two implementations ship with the crate:
//! - [`TcpConnector`]: length-prefixed, checksummed frames over plain TCP
//! - [`ChannelConnector`] / [`channel_pair`]: in-process loopback, used by
//!   tests and by embedders wiring both ends in one process

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::ConnectOptions;
use crate::error::TransportError;

mod channel;
mod frame;
mod tcp;

pub use channel::{ChannelConnector, PeerEnd, channel_pair};
pub use frame::{
    FrameError, FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE, serialize_frame,
    try_deserialize_frame,
};
pub use tcp::TcpConnector;

/// Event delivered by a transport's reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// One complete encoded message.
    Data(Vec<u8>),
    /// The connection ended. `None` means an orderly close.
    Closed(Option<TransportError>),
}

/// Receiving side of a connection.
pub type InboundReceiver = mpsc::UnboundedReceiver<InboundFrame>;

/// Sending side of a connection.
#[async_trait]
pub trait Transport: Send {
    /// Write one encoded message.
    ///
    /// # Errors
    ///
    /// Any error is terminal for the session using this transport.
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Release the connection. Must be idempotent.
    async fn close(&mut self);
}

/// An established connection handed to a session.
pub struct Connection {
    /// Outbound half.
    pub transport: Box<dyn Transport>,
    /// Inbound frames and the close notification.
    pub inbound: InboundReceiver,
    /// Remote address, for diagnostics.
    pub remote_address: String,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("remote_address", &self.remote_address)
            .finish_non_exhaustive()
    }
}

/// Establishes connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `host`, using `options` for port and timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectFailed`] when the peer is unreachable.
    async fn connect(
        &self,
        host: &str,
        options: &ConnectOptions,
    ) -> Result<Connection, TransportError>;
}
