//! Plain TCP transport.
//!
//! The connection is split: the session owns the write half through
//! [`Transport`], and a background reader parses frames off the read half
//! and forwards them as [`InboundFrame`]s.
//!
//! Every message travels inside the length + CRC32C envelope written by
//! [`serialize_frame`](super::serialize_frame). That envelope is local to
//! this crate, not part of the peer protocol, so the connector only talks to
//! peers that frame the same way. Pointing it at a service on port 9010 that
//! expects bare text frames will fail. Integrating such a service means
//! supplying a [`Connector`] that matches its framing.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::frame::{serialize_frame, try_deserialize_frame};
use super::{Connection, Connector, InboundFrame, Transport};
use crate::config::ConnectOptions;
use crate::error::TransportError;

/// Connector for the plain TCP transport.
///
/// The secure transport is not provided by this crate; asking for it fails
/// with [`TransportError::ConnectFailed`].
#[derive(Debug, Clone, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        host: &str,
        options: &ConnectOptions,
    ) -> Result<Connection, TransportError> {
        let address = format!("{}:{}", host, options.effective_port());
        if options.secure {
            return Err(TransportError::ConnectFailed {
                address,
                message: "secure transport is not supported by TcpConnector".to_string(),
            });
        }

        tracing::debug!(%address, "connecting");
        let stream = match tokio::time::timeout(
            options.connect_timeout,
            TcpStream::connect(&address),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(TransportError::ConnectFailed {
                    address,
                    message: e.to_string(),
                });
            }
            Err(_) => {
                return Err(TransportError::ConnectFailed {
                    address,
                    message: format!("timed out after {:?}", options.connect_timeout),
                });
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }

        let (read_half, write_half) = stream.into_split();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(reader_task(read_half, inbound_tx, options.idle_timeout));

        Ok(Connection {
            transport: Box::new(TcpTransport {
                write_half: Some(write_half),
                reader,
            }),
            inbound: inbound_rx,
            remote_address: address,
        })
    }
}

struct TcpTransport {
    write_half: Option<OwnedWriteHalf>,
    reader: JoinHandle<()>,
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        let Some(stream) = self.write_half.as_mut() else {
            return Err(TransportError::Closed);
        };
        let data = serialize_frame(&frame)?;
        stream.write_all(&data).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.write_half.take()
            && let Err(e) = stream.shutdown().await
        {
            tracing::debug!(error = %e, "shutdown of write half failed");
        }
        self.reader.abort();
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Parse frames off the read half until the connection ends.
async fn reader_task(
    mut stream: OwnedReadHalf,
    inbound: mpsc::UnboundedSender<InboundFrame>,
    idle_timeout: Duration,
) {
    let mut read_buffer: Vec<u8> = Vec::with_capacity(4096);
    let mut chunk = vec![0u8; 4096];

    loop {
        let n = match tokio::time::timeout(idle_timeout, stream.read(&mut chunk)).await {
            Err(_) => {
                tracing::debug!(?idle_timeout, "connection idle, reclaiming");
                let _ = inbound.send(InboundFrame::Closed(None));
                return;
            }
            Ok(Ok(0)) => {
                tracing::debug!("connection closed by peer");
                let _ = inbound.send(InboundFrame::Closed(None));
                return;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                let _ = inbound.send(InboundFrame::Closed(Some(e.into())));
                return;
            }
        };
        read_buffer.extend_from_slice(&chunk[..n]);

        loop {
            match try_deserialize_frame(&read_buffer) {
                Ok(Some((payload, consumed))) => {
                    read_buffer.drain(..consumed);
                    if inbound.send(InboundFrame::Data(payload)).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "framing error, tearing down connection");
                    let _ = inbound.send(InboundFrame::Closed(Some(e.into())));
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_frames_cross_a_real_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = vec![0u8; 64];
            let mut received = Vec::new();
            let payload = loop {
                let n = socket.read(&mut buf).await.expect("read");
                received.extend_from_slice(&buf[..n]);
                if let Some((payload, _)) = try_deserialize_frame(&received).expect("frame") {
                    break payload;
                }
            };
            let reply = serialize_frame(&payload).expect("serialize");
            socket.write_all(&reply).await.expect("write");
        });

        let mut connection = TcpConnector
            .connect("127.0.0.1", &ConnectOptions::default().with_port(port))
            .await
            .expect("connect");
        connection
            .transport
            .send(br#"{"ack":5}"#.to_vec())
            .await
            .expect("send");

        assert_eq!(
            connection.inbound.recv().await,
            Some(InboundFrame::Data(br#"{"ack":5}"#.to_vec()))
        );
        server.await.expect("server");
        assert_eq!(
            connection.inbound.recv().await,
            Some(InboundFrame::Closed(None))
        );
    }

    #[tokio::test]
    async fn test_idle_connection_is_reclaimed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let (release, hold) = tokio::sync::oneshot::channel::<()>();

        let server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.expect("accept");
            let _ = hold.await;
        });

        let options = ConnectOptions {
            idle_timeout: Duration::from_millis(200),
            ..ConnectOptions::default().with_port(port)
        };
        let started = std::time::Instant::now();
        let mut connection = TcpConnector
            .connect("127.0.0.1", &options)
            .await
            .expect("connect");

        assert_eq!(
            connection.inbound.recv().await,
            Some(InboundFrame::Closed(None))
        );
        assert!(started.elapsed() >= Duration::from_millis(200));

        let _ = release.send(());
        server.await.expect("server");
    }

    #[tokio::test]
    async fn test_corrupted_frame_terminates_session() {
        use crate::error::CloseReason;
        use crate::registry::SessionRegistry;
        use crate::session::{RejectingHandler, SessionBuilder};
        use crate::transport::FrameError;

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let (release, hold) = tokio::sync::oneshot::channel::<()>();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut bytes = serialize_frame(br#"{"ack":1}"#).expect("serialize");
            let last = bytes.len() - 1;
            bytes[last] ^= 0xff;
            socket.write_all(&bytes).await.expect("write");
            let _ = hold.await;
        });

        let connection = TcpConnector
            .connect("127.0.0.1", &ConnectOptions::default().with_port(port))
            .await
            .expect("connect");
        let registry = SessionRegistry::new();
        let session = SessionBuilder::new("svc", RejectingHandler)
            .registry(registry.clone())
            .open(connection)
            .expect("open");

        let reason = session.closed().await;
        assert!(
            matches!(
                reason,
                CloseReason::Transport(TransportError::Frame(
                    FrameError::ChecksumMismatch { .. }
                ))
            ),
            "{reason:?}"
        );
        assert!(registry.is_empty());

        let _ = release.send(());
        server.await.expect("server");
    }

    #[tokio::test]
    async fn test_secure_is_rejected() {
        let err = TcpConnector
            .connect("127.0.0.1", &ConnectOptions::default().secure())
            .await
            .expect_err("secure unsupported");
        assert!(matches!(err, TransportError::ConnectFailed { .. }));
    }
}
