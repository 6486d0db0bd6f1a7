//! In-process loopback transport.
//!
//! [`channel_pair`] returns a [`Connection`] for the session plus the
//! [`PeerEnd`] that plays the remote service: it sees every frame the session
//! sends and can inject frames or a close notification.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Connection, Connector, InboundFrame, Transport};
use crate::config::ConnectOptions;
use crate::error::TransportError;
use crate::wire::{JsonCodec, WireCodec, WireMessage};

struct ChannelTransport {
    outbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        let Some(outbound) = &self.outbound else {
            return Err(TransportError::Closed);
        };
        outbound.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) {
        self.outbound = None;
    }
}

/// The remote side of a loopback connection.
#[derive(Debug)]
pub struct PeerEnd {
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    inbound: mpsc::UnboundedSender<InboundFrame>,
    codec: JsonCodec,
}

impl PeerEnd {
    /// Next raw frame sent by the session, `None` once the session closed
    /// its transport.
    pub async fn recv_frame(&mut self) -> Option<Vec<u8>> {
        self.outbound.recv().await
    }

    /// Next frame sent by the session, decoded.
    ///
    /// Frames the codec cannot decode are skipped with a warning.
    pub async fn recv_message(&mut self) -> Option<WireMessage> {
        loop {
            let frame = self.outbound.recv().await?;
            match self.codec.decode(&frame) {
                Ok(message) => return Some(message),
                Err(e) => tracing::warn!(error = %e, "peer end: undecodable frame"),
            }
        }
    }

    /// A frame the session already sent, if any, without waiting.
    pub fn try_recv_message(&mut self) -> Option<WireMessage> {
        let frame = self.outbound.try_recv().ok()?;
        self.codec.decode(&frame).ok()
    }

    /// Deliver raw bytes to the session.
    ///
    /// Returns `false` if the session is gone.
    pub fn send_frame(&self, frame: impl Into<Vec<u8>>) -> bool {
        self.inbound.send(InboundFrame::Data(frame.into())).is_ok()
    }

    /// Encode and deliver a message to the session.
    pub fn send_message(&self, message: &WireMessage) -> bool {
        match self.codec.encode(message) {
            Ok(frame) => self.send_frame(frame),
            Err(e) => {
                tracing::warn!(error = %e, "peer end: failed to encode message");
                false
            }
        }
    }

    /// Notify the session that the connection closed.
    pub fn close(&self, error: Option<TransportError>) {
        let _ = self.inbound.send(InboundFrame::Closed(error));
    }
}

/// Create a connected loopback pair.
pub fn channel_pair(remote_address: impl Into<String>) -> (Connection, PeerEnd) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    let connection = Connection {
        transport: Box::new(ChannelTransport {
            outbound: Some(outbound_tx),
        }),
        inbound: inbound_rx,
        remote_address: remote_address.into(),
    };
    let peer = PeerEnd {
        outbound: outbound_rx,
        inbound: inbound_tx,
        codec: JsonCodec,
    };
    (connection, peer)
}

/// Connector producing loopback connections.
///
/// Every successful `connect` publishes the matching [`PeerEnd`] on the
/// receiver returned by [`ChannelConnector::new`].
#[derive(Debug, Clone)]
pub struct ChannelConnector {
    peers: mpsc::UnboundedSender<PeerEnd>,
}

impl ChannelConnector {
    /// Create a connector and the stream of peer ends it will produce.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PeerEnd>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (Self { peers }, rx)
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(
        &self,
        host: &str,
        options: &ConnectOptions,
    ) -> Result<Connection, TransportError> {
        let address = format!("{}:{}", host, options.effective_port());
        let (connection, peer) = channel_pair(address.clone());
        self.peers
            .send(peer)
            .map_err(|_| TransportError::ConnectFailed {
                address,
                message: "no listener for loopback connections".to_string(),
            })?;
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_frames_reach_peer() {
        let (mut connection, mut peer) = channel_pair("loopback");
        connection
            .transport
            .send(br#"{"ack":3}"#.to_vec())
            .await
            .expect("send");
        assert_eq!(
            peer.recv_message().await,
            Some(WireMessage::Ack { transaction_id: 3 })
        );
    }

    #[tokio::test]
    async fn test_peer_frames_reach_session() {
        let (mut connection, peer) = channel_pair("loopback");
        assert!(peer.send_message(&WireMessage::Ack { transaction_id: 1 }));
        peer.close(None);
        assert_eq!(
            connection.inbound.recv().await,
            Some(InboundFrame::Data(br#"{"ack":1}"#.to_vec()))
        );
        assert_eq!(
            connection.inbound.recv().await,
            Some(InboundFrame::Closed(None))
        );
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (mut connection, _peer) = channel_pair("loopback");
        connection.transport.close().await;
        assert_eq!(
            connection.transport.send(b"{}".to_vec()).await,
            Err(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn test_connector_publishes_peer_end() {
        let (connector, mut peers) = ChannelConnector::new();
        let connection = connector
            .connect("svc.local", &ConnectOptions::default())
            .await
            .expect("connect");
        assert_eq!(connection.remote_address, "svc.local:9010");
        assert!(peers.recv().await.is_some());
    }
}
