//! # Error Types
//!
//! Error handling for the peer-to-peer game layer.
//!
//! Two tiers are kept apart on purpose:
//! - [`FramingError`]: a single malformed frame. Always recoverable; the
//!   offending bytes are discarded and the connection keeps running.
//! - [`ProtocolError`]: everything that fails an operation, from socket I/O
//!   up to misuse of the node lifecycle (`AlreadyRunning` / `NotRunning`).
//!
//! ## Example Usage
//! ```rust
//! use ttt_mesh::error::{ProtocolError, Result};
//!
//! fn require_port(port: Option<u16>) -> Result<u16> {
//!     port.ok_or_else(|| ProtocolError::ConfigError("port missing".into()))
//! }
//!
//! assert!(require_port(None).is_err());
//! ```

use std::io;
use thiserror::Error;

/// Static error messages, borrowed instead of formatted on the error path.
pub mod constants {
    /// Handshake errors
    pub const ERR_HANDSHAKE_TIMEOUT: &str = "Peer did not identify itself in time";
    pub const ERR_HANDSHAKE_CLOSED: &str = "Connection closed before handshake completed";
    pub const ERR_EXPECTED_HELLO: &str = "Expected HELLO as the first frame";
    pub const ERR_SELF_CONNECTION: &str = "Remote peer announced our own identity";
    pub const ERR_DUPLICATE_PEER: &str = "A peer with this identity is already connected";

    /// Connection errors
    pub const ERR_CONNECT_TIMEOUT: &str = "TCP connect timed out";
    pub const ERR_WRITE_TIMEOUT: &str = "Write to peer timed out";
    pub const ERR_PEER_CLOSED: &str = "Peer connection already closed";

    /// Identity errors
    pub const ERR_IDENTITY_EMPTY: &str = "Identity cannot be empty";
    pub const ERR_IDENTITY_TOO_LONG: &str = "Identity exceeds 64 characters";
    pub const ERR_IDENTITY_CHARSET: &str =
        "Identity may only contain ASCII letters, digits, '-' or '_'";
}

/// A frame that could not be turned into a message.
///
/// The decoder has already skipped the offending bytes when one of these is
/// produced, so the stream can be polled again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("Invalid frame header, discarded {discarded} bytes")]
    BadMagic { discarded: usize },

    #[error("Unsupported wire version: {0}")]
    UnsupportedVersion(u8),

    #[error("Frame too large: {0} bytes")]
    OversizedFrame(usize),

    #[error("Frame payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("Malformed message: {0:?}")]
    Malformed(String),

    #[error("Stream ended inside a frame ({0} bytes left)")]
    Truncated(usize),
}

// ProtocolError is the primary error type for all node and session operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("Connection to {addr} failed: {reason}")]
    ConnectFailed { addr: String, reason: String },

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Peer {0} disconnected")]
    PeerDisconnected(String),

    #[error("No connected peer with identity {0}")]
    UnknownPeer(String),

    #[error("Node is already running")]
    AlreadyRunning,

    #[error("Node is not running")]
    NotRunning,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Frame too large: {0} bytes")]
    OversizedFrame(usize),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// Wrap any error as a failed connection attempt to `addr`.
    pub fn connect_failed(addr: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        ProtocolError::ConnectFailed {
            addr: addr.into(),
            reason: reason.to_string(),
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
