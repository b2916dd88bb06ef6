//! # Wire Framing
//!
//! Turns the TCP byte stream into discrete messages and back.
//!
//! ## Components
//! - **Codec**: Tokio codec used by every peer connection
//! - **Framer**: pure `encode` / `feed` helpers over plain byte slices
//!
//! ## Wire Format
//! ```text
//! [Magic(4)] [Version(1)] [Length(2)] [Payload(N)]
//! ```
//!
//! The payload is the UTF-8 text form of a [`Message`](crate::protocol::message::Message).
//! `0xFF` never appears in UTF-8, so a magic starting with it lets the decoder
//! resynchronise after garbage without misreading payload text as a header.

pub mod codec;
pub mod framer;
