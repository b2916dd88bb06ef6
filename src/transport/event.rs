use std::net::SocketAddr;

use crate::protocol::identity::NodeId;
use crate::protocol::message::Message;

/// Which side opened the TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Inbound,
    Outbound,
}

/// Why a peer connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Closed locally: `disconnect`, `stop`, or pruned after a failed write
    Closed,
    /// The remote closed its side of the socket
    Eof,
    /// A read error ended the connection
    Error(String),
}

/// Everything a node reports to the layer above it.
///
/// Transport events (`*Connected`, `Disconnected`, `MessageReceived`) are
/// emitted for every peer; `SetReceived` is the parsed-protocol view of a
/// `SET` and always follows the matching `MessageReceived`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    InboundConnected {
        peer: NodeId,
        addr: SocketAddr,
    },
    OutboundConnected {
        peer: NodeId,
        addr: SocketAddr,
    },
    Disconnected {
        peer: NodeId,
        role: Role,
        reason: DisconnectReason,
    },
    MessageReceived {
        peer: NodeId,
        message: Message,
    },
    SetReceived {
        peer: NodeId,
        row: u8,
        col: u8,
    },
}

impl NodeEvent {
    /// The peer this event concerns.
    pub fn peer(&self) -> &NodeId {
        match self {
            NodeEvent::InboundConnected { peer, .. }
            | NodeEvent::OutboundConnected { peer, .. }
            | NodeEvent::Disconnected { peer, .. }
            | NodeEvent::MessageReceived { peer, .. }
            | NodeEvent::SetReceived { peer, .. } => peer,
        }
    }
}
