//! # Transport Layer
//!
//! TCP sessions between nodes.
//!
//! ## Components
//! - **Node**: listener, dialer, task tracking and event publishing
//! - **Peer**: one handshaken connection with its serialized writer
//! - **Registry**: the node-owned map of live peers
//! - **Event**: what a node reports upward

pub mod event;
pub mod node;
pub mod peer;
pub mod registry;
