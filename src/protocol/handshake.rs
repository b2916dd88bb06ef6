//! Identity handshake.
//!
//! Both sides write `HELLO <id>` as their very first frame and then wait for
//! the remote's. Because each side writes before it reads, the exchange cannot
//! deadlock regardless of who opened the TCP connection.
//!
//! The exchange is unauthenticated: the identity is whatever the remote claims.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, instrument};

use crate::core::codec::FrameCodec;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::identity::NodeId;
use crate::protocol::message::Message;
use crate::utils::timeout::with_timeout_error;

/// Send our identity and read the remote's, all within `timeout`.
///
/// # Errors
/// `ProtocolError::Handshake` when the remote sends anything other than a
/// well-formed HELLO, closes early, answers too slowly, or announces our own
/// identity. I/O errors are passed through.
#[instrument(skip(reader, writer, local), fields(local = %local))]
pub async fn exchange_identities<R, W>(
    reader: &mut FramedRead<R, FrameCodec>,
    writer: &mut FramedWrite<W, FrameCodec>,
    local: &NodeId,
    timeout: Duration,
) -> Result<NodeId>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let exchange = async {
        writer.send(Message::Hello(local.clone())).await?;
        read_hello(reader).await
    };

    let remote = with_timeout_error(exchange, timeout)
        .await
        .map_err(|e| match e {
            ProtocolError::Timeout => {
                ProtocolError::Handshake(constants::ERR_HANDSHAKE_TIMEOUT.into())
            }
            other => other,
        })?;

    if remote == *local {
        return Err(ProtocolError::Handshake(
            constants::ERR_SELF_CONNECTION.into(),
        ));
    }

    debug!(remote = %remote, "Handshake complete");
    Ok(remote)
}

async fn read_hello<R>(reader: &mut FramedRead<R, FrameCodec>) -> Result<NodeId>
where
    R: AsyncRead + Unpin,
{
    match reader.next().await {
        Some(Ok(Ok(Message::Hello(id)))) => Ok(id),
        Some(Ok(Ok(other))) => Err(ProtocolError::Handshake(format!(
            "{}, got {}",
            constants::ERR_EXPECTED_HELLO,
            other.opcode()
        ))),
        Some(Ok(Err(framing))) => Err(ProtocolError::Handshake(format!(
            "{}: {framing}",
            constants::ERR_EXPECTED_HELLO
        ))),
        Some(Err(e)) => Err(e),
        None => Err(ProtocolError::Handshake(
            constants::ERR_HANDSHAKE_CLOSED.into(),
        )),
    }
}
