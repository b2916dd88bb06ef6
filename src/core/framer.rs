//! Pure framing helpers over byte slices.
//!
//! These wrap [`FrameCodec`] for callers that own their own buffers
//! (tests, fuzzing, tooling). Peer connections use the codec directly
//! through `FramedRead` / `FramedWrite`.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::core::codec::{Decoded, FrameCodec};
use crate::error::{FramingError, Result};
use crate::protocol::message::Message;

/// Outcome of feeding bytes to the decoder.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Feed {
    /// Messages decoded, in stream order
    pub messages: Vec<Message>,
    /// Frames that were discarded, in stream order
    pub errors: Vec<FramingError>,
    /// Bytes of an incomplete frame, to be prefixed to the next read
    pub remaining: Vec<u8>,
}

/// Encode one message into a self-delimiting frame.
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    let mut buf = BytesMut::new();
    FrameCodec::default().encode(message.clone(), &mut buf)?;
    Ok(buf.to_vec())
}

/// Decode every complete frame in `buffer`.
pub fn feed(buffer: &[u8]) -> Feed {
    let mut framer = Framer::default();
    let mut feed = Feed::default();
    for decoded in framer.push(buffer) {
        match decoded {
            Ok(message) => feed.messages.push(message),
            Err(error) => feed.errors.push(error),
        }
    }
    feed.remaining = framer.buffer.to_vec();
    feed
}

/// Per-connection accumulator: bytes go in as they arrive, frames come out.
#[derive(Debug, Default)]
pub struct Framer {
    codec: FrameCodec,
    buffer: BytesMut,
}

impl Framer {
    pub fn new(codec: FrameCodec) -> Self {
        Self {
            codec,
            buffer: BytesMut::new(),
        }
    }

    /// Append a chunk and drain every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Decoded> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();
        // The codec only returns Err for I/O, which cannot happen on an in-memory buffer.
        while let Ok(Some(decoded)) = self.codec.decode(&mut self.buffer) {
            out.push(decoded);
        }
        out
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn feed_returns_unconsumed_tail() {
        let mut bytes = encode(&Message::Greet).unwrap();
        let second = encode(&Message::Set { row: 2, col: 0 }).unwrap();
        bytes.extend_from_slice(&second[..4]);

        let feed = feed(&bytes);
        assert_eq!(feed.messages, vec![Message::Greet]);
        assert!(feed.errors.is_empty());
        assert_eq!(feed.remaining, second[..4].to_vec());

        let mut resumed = feed.remaining.clone();
        resumed.extend_from_slice(&second[4..]);
        assert_eq!(
            super::feed(&resumed).messages,
            vec![Message::Set { row: 2, col: 0 }]
        );
    }

    #[test]
    fn framer_handles_byte_at_a_time() {
        let bytes = encode(&Message::Set { row: 1, col: 1 }).unwrap();
        let mut framer = Framer::default();

        let mut decoded = Vec::new();
        for byte in &bytes {
            decoded.extend(framer.push(std::slice::from_ref(byte)));
        }

        assert_eq!(decoded, vec![Ok(Message::Set { row: 1, col: 1 })]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn feed_reports_garbage_and_keeps_going() {
        let mut bytes = b"???".to_vec();
        bytes.extend(encode(&Message::Greet).unwrap());

        let feed = feed(&bytes);
        assert_eq!(feed.messages, vec![Message::Greet]);
        assert_eq!(feed.errors, vec![FramingError::BadMagic { discarded: 3 }]);
        assert!(feed.remaining.is_empty());
    }
}
