use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::config::{MAGIC_BYTES, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
use crate::error::{FramingError, ProtocolError, Result};
use crate::protocol::message::Message;

/// Magic + version + length.
pub const HEADER_LEN: usize = MAGIC_BYTES.len() + 1 + 2;

/// One decoded frame: either a message or the reason its bytes were dropped.
pub type Decoded = std::result::Result<Message, FramingError>;

/// Length-prefixed frame codec.
///
/// Malformed input never fails the stream: it is yielded as `Ok(Some(Err(_)))`
/// after the offending bytes have been skipped. Only I/O errors end a
/// `FramedRead`.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_payload: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl FrameCodec {
    /// The limit is clamped to what the 16-bit length field can express.
    pub fn new(max_payload: usize) -> Self {
        Self {
            max_payload: max_payload.min(u16::MAX as usize),
        }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

/// Offset of the first byte that could start a frame header.
///
/// Only called when the buffer does not start with the magic, so index 0 is skipped.
/// A trailing partial magic is kept so a header split across reads survives.
fn resync_offset(buf: &[u8]) -> usize {
    (1..buf.len())
        .find(|&start| {
            let tail = &buf[start..];
            let n = tail.len().min(MAGIC_BYTES.len());
            tail[..n] == MAGIC_BYTES[..n]
        })
        .unwrap_or(buf.len())
}

impl Decoder for FrameCodec {
    type Item = Decoded;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Decoded>> {
        if src.is_empty() {
            return Ok(None);
        }

        let probe = src.len().min(MAGIC_BYTES.len());
        if src[..probe] != MAGIC_BYTES[..probe] {
            let discarded = resync_offset(src);
            src.advance(discarded);
            trace!(discarded, "Skipped bytes while resynchronising");
            return Ok(Some(Err(FramingError::BadMagic { discarded })));
        }

        if src.len() < HEADER_LEN {
            src.reserve(HEADER_LEN - src.len());
            return Ok(None);
        }

        let version = src[MAGIC_BYTES.len()];
        let length = u16::from_be_bytes([src[HEADER_LEN - 2], src[HEADER_LEN - 1]]) as usize;

        if length > self.max_payload {
            // The length field cannot be trusted; drop the header and resync on what follows.
            src.advance(HEADER_LEN);
            return Ok(Some(Err(FramingError::OversizedFrame(length))));
        }

        let total = HEADER_LEN + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let frame = src.split_to(total);
        if version != PROTOCOL_VERSION {
            return Ok(Some(Err(FramingError::UnsupportedVersion(version))));
        }

        let text = match std::str::from_utf8(&frame[HEADER_LEN..]) {
            Ok(text) => text,
            Err(_) => return Ok(Some(Err(FramingError::InvalidUtf8))),
        };

        Ok(Some(text.parse::<Message>()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Decoded>> {
        match self.decode(src)? {
            Some(decoded) => Ok(Some(decoded)),
            None if src.is_empty() => Ok(None),
            None => {
                let left = src.len();
                src.clear();
                Ok(Some(Err(FramingError::Truncated(left))))
            }
        }
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let payload = item.to_string();
        if payload.len() > self.max_payload {
            return Err(ProtocolError::OversizedFrame(payload.len()));
        }

        dst.reserve(HEADER_LEN + payload.len());
        dst.put_slice(&MAGIC_BYTES);
        dst.put_u8(PROTOCOL_VERSION);
        dst.put_u16(payload.len() as u16);
        dst.put_slice(payload.as_bytes());
        Ok(())
    }
}
