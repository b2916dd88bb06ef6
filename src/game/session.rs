use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::game::board::{Board, Tile};
use crate::protocol::identity::NodeId;
use crate::protocol::message::Message;
use crate::transport::event::NodeEvent;
use crate::transport::node::Node;

const GAME_EVENT_CAPACITY: usize = 64;

/// Where the opponent sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameMode {
    /// Both players share this process; nothing goes on the wire.
    Local,
    /// Moves are mirrored to every connected peer.
    Remote,
}

/// Result of a local move attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Placed(Tile),
    /// Cell taken or out of range
    Rejected,
    /// Waiting for the opponent's move
    NotYourTurn,
    GameOver,
}

/// What the session reports to its front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    RemoteMove { row: u8, col: u8, tile: Tile },
    /// `winner` is `None` for a draw.
    Finished { winner: Option<Tile> },
    Greeted { peer: NodeId },
    PeerJoined { peer: NodeId },
    PeerLeft { peer: NodeId },
}

#[derive(Debug, Default)]
struct SessionState {
    board: Board,
    awaiting_remote: bool,
}

/// One game of Tic-Tac-Toe bound to a node.
///
/// Local moves are applied to the board and, in remote mode, broadcast as
/// `SET`; remote `SET`s go through the same [`Board::set`], which is the only
/// place cells are validated.
///
/// There is no turn negotiation: in remote mode both sides start with moves
/// enabled, so if both move before either `SET` arrives each claims Player1
/// and the boards diverge. [`GameSession::new_game`] only resets this side.
pub struct GameSession {
    node: Arc<Node>,
    mode: GameMode,
    state: Mutex<SessionState>,
    events: broadcast::Sender<GameEvent>,
    token: CancellationToken,
}

impl GameSession {
    pub fn new(node: Arc<Node>, mode: GameMode) -> Self {
        let (events, _) = broadcast::channel(GAME_EVENT_CAPACITY);
        Self {
            node,
            mode,
            state: Mutex::new(SessionState::default()),
            events,
            token: CancellationToken::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: GameEvent) {
        let _ = self.events.send(event);
    }

    fn finish(&self, winner: Option<Tile>) {
        match winner {
            Some(tile) => info!(winner = %tile, "Game won"),
            None => info!("Game drawn"),
        }
        self.emit(GameEvent::Finished { winner });
    }

    /// Play `(row, col)` for the local player.
    #[instrument(skip(self), fields(mode = ?self.mode))]
    pub async fn play(&self, row: u8, col: u8) -> MoveOutcome {
        let (tile, finished) = {
            let mut state = self.state();
            if state.board.is_over() {
                return MoveOutcome::GameOver;
            }
            if state.awaiting_remote {
                return MoveOutcome::NotYourTurn;
            }
            let Some(tile) = state.board.set(usize::from(row), usize::from(col)) else {
                return MoveOutcome::Rejected;
            };
            if self.mode == GameMode::Remote {
                state.awaiting_remote = true;
            }
            let finished = state.board.is_over().then(|| state.board.winner());
            (tile, finished)
        };

        if self.mode == GameMode::Remote {
            let delivered = self.node.broadcast(Message::Set { row, col }).await;
            if delivered == 0 {
                warn!(row, col, "Move was not delivered to any peer");
            }
        }
        if let Some(winner) = finished {
            self.finish(winner);
        }
        MoveOutcome::Placed(tile)
    }

    /// Apply a move received from a peer.
    ///
    /// Unavailable cells and moves after the game ended are ignored.
    pub fn apply_remote(&self, row: u8, col: u8) -> Option<Tile> {
        let (tile, finished) = {
            let mut state = self.state();
            if state.board.is_over() {
                debug!(row, col, "Ignoring SET after game over");
                return None;
            }
            let Some(tile) = state.board.set(usize::from(row), usize::from(col)) else {
                debug!(row, col, "Ignoring SET for unavailable cell");
                return None;
            };
            state.awaiting_remote = false;
            let finished = state.board.is_over().then(|| state.board.winner());
            (tile, finished)
        };

        self.emit(GameEvent::RemoteMove { row, col, tile });
        if let Some(winner) = finished {
            self.finish(winner);
        }
        Some(tile)
    }

    /// Connect the node to `host:port` and greet the new peer once.
    pub async fn connect(&self, host: &str, port: u16) -> Result<NodeId> {
        let peer = self.node.connect(host, port).await?;
        if let Err(e) = self.node.send_to(&peer, Message::Greet).await {
            warn!(peer = %peer, error = %e, "GREET not delivered");
        }
        Ok(peer)
    }

    /// Send `GREET` to every peer. No reply is expected.
    pub async fn greet(&self) -> usize {
        self.node.broadcast(Message::Greet).await
    }

    /// Start forwarding node events into this session.
    ///
    /// The task holds only a weak reference and ends when the session is dropped.
    pub fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.node.subscribe();
        let weak = Arc::downgrade(self);
        let token = self.token.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => event,
                };
                let Some(session) = weak.upgrade() else {
                    break;
                };

                match event {
                    Ok(NodeEvent::SetReceived { row, col, .. }) => {
                        session.apply_remote(row, col);
                    }
                    Ok(NodeEvent::MessageReceived {
                        peer,
                        message: Message::Greet,
                    }) => {
                        info!(peer = %peer, "Greeted by peer");
                        session.emit(GameEvent::Greeted { peer });
                    }
                    Ok(NodeEvent::InboundConnected { peer, .. })
                    | Ok(NodeEvent::OutboundConnected { peer, .. }) => {
                        session.emit(GameEvent::PeerJoined { peer });
                    }
                    Ok(NodeEvent::Disconnected { peer, .. }) => {
                        session.emit(GameEvent::PeerLeft { peer });
                    }
                    Ok(NodeEvent::MessageReceived { .. }) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Session fell behind node events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Session listener exited");
        })
    }

    /// Clear the board and let the local player move. Peers are not told.
    pub fn new_game(&self) {
        *self.state() = SessionState::default();
        info!("New game");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }

    pub fn board(&self) -> Board {
        self.state().board.clone()
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn is_my_turn(&self) -> bool {
        let state = self.state();
        !state.awaiting_remote && !state.board.is_over()
    }

    pub fn is_finished(&self) -> bool {
        self.state().board.is_over()
    }
}

impl Drop for GameSession {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
