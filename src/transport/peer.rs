use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::core::codec::FrameCodec;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::identity::NodeId;
use crate::protocol::message::Message;
use crate::transport::event::{DisconnectReason, Role};
use crate::utils::metrics::Metrics;
use crate::utils::timeout::with_timeout_error;

pub type PeerReader = FramedRead<OwnedReadHalf, FrameCodec>;
pub type PeerWriter = FramedWrite<OwnedWriteHalf, FrameCodec>;

/// Public description of a connected peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: NodeId,
    pub addr: SocketAddr,
    pub role: Role,
    pub connected_at: Instant,
}

/// One established TCP session with a remote node.
///
/// Only exists once the handshake has completed, so the remote identity is
/// always known. The read half lives in the receive loop; the write half sits
/// behind an async mutex so concurrent senders never interleave frames.
pub struct PeerConnection {
    info: PeerInfo,
    writer: Mutex<PeerWriter>,
    write_timeout: Duration,
    token: CancellationToken,
    metrics: Arc<Metrics>,
}

impl PeerConnection {
    pub(crate) fn new(
        id: NodeId,
        addr: SocketAddr,
        role: Role,
        writer: PeerWriter,
        write_timeout: Duration,
        token: CancellationToken,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            info: PeerInfo {
                id,
                addr,
                role,
                connected_at: Instant::now(),
            },
            writer: Mutex::new(writer),
            write_timeout,
            token,
            metrics,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.info.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.info.addr
    }

    pub fn role(&self) -> Role {
        self.info.role
    }

    pub fn info(&self) -> PeerInfo {
        self.info.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Write one frame, bounded by the write timeout.
    ///
    /// A failed or timed-out write closes the connection; the receive loop then
    /// removes it from the node. Oversized messages are refused without
    /// touching the socket.
    #[instrument(skip(self, message), level = "debug", fields(peer = %self.info.id, opcode = message.opcode()))]
    pub async fn send(&self, message: Message) -> Result<()> {
        if self.is_closed() {
            debug!(peer = %self.info.id, "{}", constants::ERR_PEER_CLOSED);
            return Err(ProtocolError::PeerDisconnected(self.info.id.to_string()));
        }

        let result = with_timeout_error(
            async {
                let mut writer = self.writer.lock().await;
                writer.send(message).await
            },
            self.write_timeout,
        )
        .await;

        match result {
            Ok(()) => {
                self.metrics.message_sent();
                Ok(())
            }
            Err(e @ ProtocolError::OversizedFrame(_)) => Err(e),
            Err(ProtocolError::Timeout) => {
                self.metrics.send_failure();
                warn!(peer = %self.info.id, "{}, closing connection", constants::ERR_WRITE_TIMEOUT);
                self.close();
                Err(ProtocolError::PeerDisconnected(self.info.id.to_string()))
            }
            Err(e) => {
                self.metrics.send_failure();
                warn!(peer = %self.info.id, error = %e, "Write failed, closing connection");
                self.close();
                Err(ProtocolError::PeerDisconnected(self.info.id.to_string()))
            }
        }
    }

    /// Signal the receive loop to exit. Idempotent.
    pub fn close(&self) {
        self.token.cancel();
    }

    /// Flush and shut down the write half so the remote sees EOF.
    pub(crate) async fn shutdown_writer(&self) {
        let result = tokio::time::timeout(self.write_timeout, async {
            let mut writer = self.writer.lock().await;
            writer.close().await
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(peer = %self.info.id, error = %e, "Writer shutdown failed"),
            Err(_) => debug!(peer = %self.info.id, "Writer shutdown timed out"),
        }
    }
}

/// Read frames until the socket ends or the connection is closed.
///
/// Every decoded message is handed to `dispatch` in arrival order. Malformed
/// frames are counted and skipped; they never end the loop.
pub(crate) async fn receive_loop<F>(
    conn: &PeerConnection,
    mut reader: PeerReader,
    mut dispatch: F,
) -> DisconnectReason
where
    F: FnMut(Message),
{
    loop {
        tokio::select! {
            _ = conn.token.cancelled() => return DisconnectReason::Closed,
            frame = reader.next() => match frame {
                Some(Ok(Ok(Message::Hello(announced)))) => {
                    warn!(peer = %conn.info.id, announced = %announced, "Ignoring HELLO after handshake");
                }
                Some(Ok(Ok(message))) => {
                    conn.metrics.message_received();
                    dispatch(message);
                }
                Some(Ok(Err(framing))) => {
                    conn.metrics.framing_error();
                    warn!(peer = %conn.info.id, error = %framing, "Discarded malformed frame");
                }
                Some(Err(e)) => return DisconnectReason::Error(e.to_string()),
                None => return DisconnectReason::Eof,
            }
        }
    }
}
