//! Helpers shared by the loopback integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use ttt_mesh::config::NodeConfig;
use ttt_mesh::core::framer::{encode, Framer};
use ttt_mesh::protocol::identity::NodeId;
use ttt_mesh::protocol::message::Message;
use ttt_mesh::transport::event::NodeEvent;
use ttt_mesh::transport::node::Node;

pub const WAIT: Duration = Duration::from_secs(5);

/// Loopback config on an ephemeral port with short timeouts.
pub fn test_config() -> NodeConfig {
    NodeConfig::default_with_overrides(|c| {
        c.node.bind_address = "127.0.0.1".to_string();
        c.node.port = 0;
        c.transport.connect_timeout = Duration::from_secs(2);
        c.transport.handshake_timeout = Duration::from_secs(2);
        c.transport.write_timeout = Duration::from_millis(500);
    })
}

pub fn named_config(identity: &str) -> NodeConfig {
    let mut config = test_config();
    config.node.identity = Some(identity.to_string());
    config
}

/// Create and start a node; returns it with its listening port.
pub async fn started_node(config: NodeConfig) -> (Arc<Node>, u16) {
    let node = Arc::new(Node::new(config).expect("valid config"));
    let addr = node.start().await.expect("node starts");
    (node, addr.port())
}

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Wait for the first event matching `pred`, skipping others.
pub async fn next_matching<F>(rx: &mut broadcast::Receiver<NodeEvent>, mut pred: F) -> NodeEvent
where
    F: FnMut(&NodeEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(e) => panic!("event channel closed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Poll `cond` until it holds.
pub async fn eventually<F>(what: &str, mut cond: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out: {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A hand-driven peer speaking the wire protocol over a raw socket.
pub struct RawPeer {
    pub stream: TcpStream,
    framer: Framer,
    queued: VecDeque<Message>,
}

impl RawPeer {
    pub async fn connect(port: u16) -> Self {
        Self {
            stream: TcpStream::connect(("127.0.0.1", port)).await.unwrap(),
            framer: Framer::default(),
            queued: VecDeque::new(),
        }
    }

    pub async fn send(&mut self, message: &Message) {
        self.stream.write_all(&encode(message).unwrap()).await.unwrap();
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Next decoded message, or `None` on EOF.
    pub async fn recv(&mut self) -> Option<Message> {
        tokio::time::timeout(WAIT, async {
            let mut buf = [0u8; 512];
            loop {
                if let Some(message) = self.queued.pop_front() {
                    return Some(message);
                }
                let n = self.stream.read(&mut buf).await.unwrap_or(0);
                if n == 0 {
                    return None;
                }
                for decoded in self.framer.push(&buf[..n]) {
                    self.queued
                        .push_back(decoded.expect("node sends well-formed frames"));
                }
            }
        })
        .await
        .expect("timed out reading from node")
    }

    /// Complete the identity exchange as `id`; returns the node's identity.
    pub async fn handshake(&mut self, id: &str) -> NodeId {
        self.send(&Message::Hello(NodeId::new(id).unwrap())).await;
        match self.recv().await {
            Some(Message::Hello(remote)) => remote,
            other => panic!("expected HELLO, got {other:?}"),
        }
    }
}
