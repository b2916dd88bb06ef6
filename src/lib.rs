//! # ttt-mesh
//!
//! Peer-to-peer Tic-Tac-Toe state synchronization over direct TCP.
//!
//! Every process runs a [`Node`](transport::node::Node) that both listens and
//! dials. Connections exchange identities first, then carry framed text
//! commands (`GREET`, `SET <row> <col>`). A [`GameSession`](game::session::GameSession)
//! mirrors local moves to every peer and applies theirs to its own board.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ttt_mesh::game::session::{GameMode, GameSession};
//! use ttt_mesh::transport::node::Node;
//!
//! # async fn run() -> ttt_mesh::error::Result<()> {
//! let node = Arc::new(Node::with_port(2222)?);
//! node.start().await?;
//!
//! let session = Arc::new(GameSession::new(Arc::clone(&node), GameMode::Remote));
//! session.spawn_listener();
//! session.connect("192.168.1.20", 2222).await?;
//! session.play(0, 0).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod game;
pub mod protocol;
pub mod transport;
pub mod utils;
