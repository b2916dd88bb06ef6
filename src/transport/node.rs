//! A single peer in the mesh.
//!
//! A `Node` listens for inbound TCP connections, dials outbound ones, runs the
//! identity handshake on both, and keeps every established connection in its
//! own [`PeerRegistry`]. Everything it observes is published as a
//! [`NodeEvent`] on a broadcast channel.
//!
//! Every task the node starts (accept loop, inbound handshakes, receive loops)
//! is tracked and joined by [`Node::stop`], so a stopped node leaves nothing
//! running behind it.

use futures::future::join_all;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{NodeConfig, TransportConfig};
use crate::core::codec::FrameCodec;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::handshake::exchange_identities;
use crate::protocol::identity::NodeId;
use crate::protocol::message::Message;
use crate::transport::event::{NodeEvent, Role};
use crate::transport::peer::{receive_loop, PeerConnection, PeerInfo, PeerReader};
use crate::transport::registry::PeerRegistry;
use crate::utils::metrics::Metrics;
use crate::utils::timeout::with_timeout_error;

/// Pause after a failed `accept`.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Handle to one mesh participant.
pub struct Node {
    config: NodeConfig,
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

/// Present only between `start` and `stop`.
struct Running {
    token: CancellationToken,
    local_addr: SocketAddr,
    accept: JoinHandle<()>,
}

/// State reachable from the node's background tasks.
struct Shared {
    identity: NodeId,
    transport: TransportConfig,
    registry: PeerRegistry,
    events: broadcast::Sender<NodeEvent>,
    metrics: Arc<Metrics>,
    tasks: StdMutex<JoinSet<()>>,
}

impl Node {
    /// Build a node from `config`. The identity is taken from the config when
    /// set, otherwise a random one is generated.
    ///
    /// # Errors
    /// `ConfigError` when the configuration does not validate,
    /// `InvalidIdentity` when the configured identity is unusable.
    pub fn new(config: NodeConfig) -> Result<Self> {
        config.validate_strict()?;

        let identity = match &config.node.identity {
            Some(id) => NodeId::new(id.clone())?,
            None => NodeId::generate(),
        };
        let (events, _) = broadcast::channel(config.transport.event_capacity);

        info!(identity = %identity, port = config.node.port, "Node created");

        Ok(Self {
            shared: Arc::new(Shared {
                identity,
                transport: config.transport.clone(),
                registry: PeerRegistry::new(),
                events,
                metrics: Arc::new(Metrics::new()),
                tasks: StdMutex::new(JoinSet::new()),
            }),
            config,
            running: Mutex::new(None),
        })
    }

    /// Default configuration listening on `port`.
    pub fn with_port(port: u16) -> Result<Self> {
        Self::new(NodeConfig::default_with_overrides(|c| c.node.port = port))
    }

    /// Bind the listener and start accepting peers.
    ///
    /// Returns the bound address, which differs from the configured one when
    /// port 0 was requested.
    #[instrument(skip(self), fields(identity = %self.shared.identity))]
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(ProtocolError::AlreadyRunning);
        }

        let bind = (self.config.node.bind_address.as_str(), self.config.node.port);
        let listener = TcpListener::bind(bind).await?;
        let local_addr = listener.local_addr()?;
        let token = CancellationToken::new();

        let accept = tokio::spawn(accept_loop(
            Arc::clone(&self.shared),
            listener,
            token.clone(),
        ));

        info!(address = %local_addr, "Listening for peers");
        *running = Some(Running {
            token,
            local_addr,
            accept,
        });
        Ok(local_addr)
    }

    /// Dial `host:port`, run the handshake and register the peer.
    ///
    /// # Errors
    /// `NotRunning` before `start` or when the node is stopped mid-handshake.
    /// Every other failure (refused, timed out,
    /// bad handshake, our own identity, an identity already connected) is
    /// reported as `ConnectFailed`. Nothing is retried.
    #[instrument(skip(self), fields(identity = %self.shared.identity))]
    pub async fn connect(&self, host: &str, port: u16) -> Result<NodeId> {
        let token = match self.running.lock().await.as_ref() {
            Some(running) => running.token.clone(),
            None => return Err(ProtocolError::NotRunning),
        };
        let target = format!("{host}:{port}");

        let stream = with_timeout_error(
            async { TcpStream::connect((host, port)).await.map_err(ProtocolError::from) },
            self.shared.transport.connect_timeout,
        )
        .await
        .map_err(|e| match e {
            ProtocolError::Timeout => {
                ProtocolError::connect_failed(&target, constants::ERR_CONNECT_TIMEOUT)
            }
            other => ProtocolError::connect_failed(&target, other),
        })?;

        let peer_addr = stream
            .peer_addr()
            .map_err(|e| ProtocolError::connect_failed(&target, e))?;

        let peer = self
            .shared
            .establish(stream, peer_addr, Role::Outbound, &token)
            .await
            .map_err(|e| match e {
                ProtocolError::NotRunning => e,
                e => {
                    warn!(target_addr = %target, error = %e, "Outbound connection failed");
                    ProtocolError::connect_failed(&target, e)
                }
            })?;

        Ok(peer)
    }

    /// Send `message` to every connected peer at once.
    ///
    /// Peers whose write fails are dropped from the node. Returns how many
    /// peers accepted the message.
    #[instrument(skip(self, message), fields(opcode = message.opcode()))]
    pub async fn broadcast(&self, message: Message) -> usize {
        self.shared.metrics.broadcast();
        let peers = self.shared.registry.snapshot();
        if peers.is_empty() {
            debug!("Broadcast with no peers connected");
            return 0;
        }

        let sends = peers.iter().map(|conn| {
            let message = message.clone();
            async move { (conn, conn.send(message).await) }
        });

        let mut delivered = 0;
        for (conn, result) in join_all(sends).await {
            match result {
                Ok(()) => delivered += 1,
                Err(e @ ProtocolError::OversizedFrame(_)) => {
                    warn!(peer = %conn.id(), error = %e, "Message too large to broadcast");
                }
                Err(e) => {
                    warn!(peer = %conn.id(), error = %e, "Broadcast to peer failed, pruning");
                    conn.close();
                    self.shared.registry.remove_if_same(conn);
                }
            }
        }

        debug!(delivered, total = peers.len(), "Broadcast complete");
        delivered
    }

    /// Send `message` to a single peer.
    pub async fn send_to(&self, peer: &NodeId, message: Message) -> Result<()> {
        let conn = self
            .shared
            .registry
            .get(peer)
            .ok_or_else(|| ProtocolError::UnknownPeer(peer.to_string()))?;

        let result = conn.send(message).await;
        if let Err(ProtocolError::PeerDisconnected(_)) = &result {
            self.shared.registry.remove_if_same(&conn);
        }
        result
    }

    /// Close the connection to `peer`. A `Disconnected` event follows once its
    /// receive loop has wound down.
    pub fn disconnect(&self, peer: &NodeId) -> Result<()> {
        let conn = self
            .shared
            .registry
            .get(peer)
            .ok_or_else(|| ProtocolError::UnknownPeer(peer.to_string()))?;

        info!(peer = %peer, "Disconnecting peer");
        self.shared.registry.remove_if_same(&conn);
        conn.close();
        Ok(())
    }

    /// Stop accepting, close every peer and wait for all node tasks to finish.
    ///
    /// The listening port is released when this returns, so the node can be
    /// started again.
    #[instrument(skip(self), fields(identity = %self.shared.identity))]
    pub async fn stop(&self) -> Result<()> {
        let running = self
            .running
            .lock()
            .await
            .take()
            .ok_or(ProtocolError::NotRunning)?;

        info!(address = %running.local_addr, "Stopping node");
        running.token.cancel();

        if let Err(e) = running.accept.await {
            warn!(error = %e, "Accept task ended abnormally");
        }
        for conn in self.shared.registry.drain() {
            conn.close();
        }
        self.shared.join_tasks().await;

        self.shared.metrics.log_metrics();
        info!("Node stopped");
        Ok(())
    }

    pub fn identity(&self) -> &NodeId {
        &self.shared.identity
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.shared.metrics
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// The bound listener address while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.local_addr)
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        self.shared.registry.infos()
    }

    pub fn peer_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.shared.events.subscribe()
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut() {
            running.token.cancel();
        }
    }
}

impl Shared {
    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Join every tracked task, including ones spawned while joining.
    async fn join_tasks(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *self.tasks());
            if tasks.is_empty() {
                break;
            }
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Node task ended abnormally");
                }
            }
        }
    }

    fn emit(&self, event: NodeEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn dispatch(&self, peer: &NodeId, message: Message) {
        debug!(peer = %peer, message = %message, "Message received");
        let set = match message {
            Message::Set { row, col } => Some((row, col)),
            _ => None,
        };

        self.emit(NodeEvent::MessageReceived {
            peer: peer.clone(),
            message,
        });
        if let Some((row, col)) = set {
            self.emit(NodeEvent::SetReceived {
                peer: peer.clone(),
                row,
                col,
            });
        }
    }

    /// Handshake a fresh socket and, on success, register it and start its
    /// receive loop.
    #[instrument(skip(self, stream, token), fields(identity = %self.identity))]
    async fn establish(
        self: &Arc<Self>,
        stream: TcpStream,
        addr: SocketAddr,
        role: Role,
        token: &CancellationToken,
    ) -> Result<NodeId> {
        self.metrics.handshake_attempt();
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Could not disable Nagle");
        }

        let codec = FrameCodec::new(self.transport.max_payload_size);
        let (read, write) = stream.into_split();
        let mut reader = FramedRead::new(read, codec);
        let mut writer = FramedWrite::new(write, codec);

        let handshake = tokio::select! {
            _ = token.cancelled() => Err(ProtocolError::NotRunning),
            result = exchange_identities(
                &mut reader,
                &mut writer,
                &self.identity,
                self.transport.handshake_timeout,
            ) => result,
        };

        let peer = match handshake {
            Ok(peer) => peer,
            Err(e) => {
                self.metrics.handshake_failed();
                return Err(e);
            }
        };

        let conn = Arc::new(PeerConnection::new(
            peer.clone(),
            addr,
            role,
            writer,
            self.transport.write_timeout,
            token.child_token(),
            Arc::clone(&self.metrics),
        ));
        if let Err(e) = self.admit(&conn, token) {
            self.metrics.handshake_failed();
            return Err(e);
        }
        self.metrics.handshake_success();
        self.metrics.connection_established();

        info!(peer = %peer, addr = %addr, role = ?role, "Peer connected");
        self.emit(match role {
            Role::Inbound => NodeEvent::InboundConnected {
                peer: peer.clone(),
                addr,
            },
            Role::Outbound => NodeEvent::OutboundConnected {
                peer: peer.clone(),
                addr,
            },
        });

        let shared = Arc::clone(self);
        self.spawn(async move { shared.run_peer(conn, reader).await });
        Ok(peer)
    }

    /// Register a freshly handshaken peer.
    ///
    /// `stop` may have drained the registry while the handshake finished, so a
    /// peer that lands after cancellation is taken back out.
    fn admit(&self, conn: &Arc<PeerConnection>, token: &CancellationToken) -> Result<()> {
        self.registry.insert(Arc::clone(conn))?;
        if token.is_cancelled() {
            self.registry.remove_if_same(conn);
            conn.close();
            debug!(peer = %conn.id(), "Node stopped during handshake");
            return Err(ProtocolError::NotRunning);
        }
        Ok(())
    }

    async fn run_peer(self: Arc<Self>, conn: Arc<PeerConnection>, reader: PeerReader) {
        let reason = receive_loop(&conn, reader, |message| self.dispatch(conn.id(), message)).await;

        conn.close();
        conn.shutdown_writer().await;
        self.registry.remove_if_same(&conn);
        self.metrics.connection_closed();

        info!(peer = %conn.id(), reason = ?reason, "Peer disconnected");
        self.emit(NodeEvent::Disconnected {
            peer: conn.id().clone(),
            role: conn.role(),
            reason,
        });
    }
}

async fn accept_loop(shared: Arc<Shared>, listener: TcpListener, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!(addr = %addr, "Accepted connection");
                    let task_shared = Arc::clone(&shared);
                    let task_token = token.clone();
                    shared.spawn(async move {
                        if let Err(e) = task_shared
                            .establish(stream, addr, Role::Inbound, &task_token)
                            .await
                        {
                            warn!(addr = %addr, error = %e, "Inbound handshake failed");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
    debug!("Accept loop exited");
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn shared() -> Arc<Shared> {
        let node = Node::new(NodeConfig::default_with_overrides(|c| {
            c.node.bind_address = "127.0.0.1".to_string();
            c.node.port = 0;
        }))
        .unwrap();
        Arc::clone(&node.shared)
    }

    async fn connection(shared: &Shared, id: &str, token: CancellationToken) -> Arc<PeerConnection> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stream, _) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let (_, write) = stream.unwrap().into_split();
        Arc::new(PeerConnection::new(
            NodeId::new(id).unwrap(),
            addr,
            Role::Outbound,
            FramedWrite::new(write, FrameCodec::new(shared.transport.max_payload_size)),
            shared.transport.write_timeout,
            token,
            Arc::clone(&shared.metrics),
        ))
    }

    #[tokio::test]
    async fn test_admit_registers_while_running() {
        let shared = shared();
        let token = CancellationToken::new();
        let conn = connection(&shared, "fresh", token.child_token()).await;

        shared.admit(&conn, &token).unwrap();
        assert!(shared.registry.contains(conn.id()));
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn test_admit_after_stop_leaves_registry_empty() {
        let shared = shared();
        let token = CancellationToken::new();
        let conn = connection(&shared, "late", token.child_token()).await;

        token.cancel();
        let err = shared.admit(&conn, &token).unwrap_err();
        assert!(matches!(err, ProtocolError::NotRunning));
        assert!(shared.registry.is_empty());
        assert!(conn.is_closed());
    }
}
