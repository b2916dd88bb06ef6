//! # Protocol Layer
//!
//! What travels inside a frame and how a connection becomes usable.
//!
//! - [`message`]: the `HELLO` / `GREET` / `SET` commands and their text form
//! - [`identity`]: the token each node announces
//! - [`handshake`]: identity exchange performed before any other message

pub mod handshake;
pub mod identity;
pub mod message;

#[cfg(test)]
mod tests;
