use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{constants, ProtocolError, Result};
use crate::protocol::identity::NodeId;
use crate::transport::peer::{PeerConnection, PeerInfo};

/// The set of live peers owned by one node.
///
/// The lock is only ever held for map operations, never across an `.await`,
/// so a disconnecting peer can always remove itself while a broadcast is
/// iterating its own snapshot.
#[derive(Default)]
pub struct PeerRegistry {
    peers: Mutex<HashMap<NodeId, Arc<PeerConnection>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<NodeId, Arc<PeerConnection>>> {
        // The map stays consistent even if a holder panicked; keep serving it.
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a peer; fails if another connection already claims its identity.
    pub fn insert(&self, conn: Arc<PeerConnection>) -> Result<()> {
        match self.lock().entry(conn.id().clone()) {
            Entry::Occupied(_) => Err(ProtocolError::Handshake(
                constants::ERR_DUPLICATE_PEER.into(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(conn);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &NodeId) -> Option<Arc<PeerConnection>> {
        self.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.lock().contains_key(id)
    }

    /// Remove `conn` only if it is still the registered connection for its id.
    pub fn remove_if_same(&self, conn: &Arc<PeerConnection>) -> bool {
        let mut peers = self.lock();
        match peers.get(conn.id()) {
            Some(current) if Arc::ptr_eq(current, conn) => {
                peers.remove(conn.id());
                true
            }
            _ => false,
        }
    }

    /// Current peers, detached from the lock.
    pub fn snapshot(&self) -> Vec<Arc<PeerConnection>> {
        self.lock().values().cloned().collect()
    }

    /// Remove and return every peer.
    pub fn drain(&self) -> Vec<Arc<PeerConnection>> {
        self.lock().drain().map(|(_, conn)| conn).collect()
    }

    pub fn infos(&self) -> Vec<PeerInfo> {
        self.lock().values().map(|conn| conn.info()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
