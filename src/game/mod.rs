//! # Game Layer
//!
//! Tic-Tac-Toe on top of a [`Node`](crate::transport::node::Node).
//!
//! - [`board`]: pure board rules, no I/O
//! - [`session`]: turns local moves into `SET` broadcasts and applies remote ones

pub mod board;
pub mod session;
