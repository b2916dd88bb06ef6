use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use ttt_mesh::config::NodeConfig;
use ttt_mesh::game::session::{GameEvent, GameMode, GameSession, MoveOutcome};
use ttt_mesh::transport::node::Node;
use ttt_mesh::utils::logging::init_logging;
use ttt_mesh::utils::net::local_ip;

const HELP: &str = "\
commands:
  connect <host> <port>   dial a peer and greet it
  set <row> <col>         play a move (0..=2)
  greet                   send GREET to every peer
  peers                   list connected peers
  board                   print the board
  new                     start a new game
  quit                    stop the node and exit";

#[derive(Parser, Debug)]
#[command(author, version, about = "Peer-to-peer Tic-Tac-Toe node", long_about = None)]
struct Cli {
    /// Port to listen on (overrides the config file)
    port: Option<u16>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Identity announced to peers instead of a random one
    #[arg(long)]
    identity: Option<String>,

    /// Peer to dial once the node is listening
    #[arg(long, value_name = "HOST:PORT")]
    connect: Option<String>,

    /// Play both sides locally; moves are not sent to peers
    #[arg(long)]
    local: bool,
}

fn load_config(cli: &Cli) -> Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => NodeConfig::default(),
    };
    config.apply_env();

    if let Some(port) = cli.port {
        config.node.port = port;
    }
    if let Some(identity) = &cli.identity {
        config.node.identity = Some(identity.clone());
    }
    Ok(config)
}

fn parse_target(target: &str) -> Result<(&str, u16)> {
    let (host, port) = target
        .rsplit_once(':')
        .with_context(|| format!("expected HOST:PORT, got {target:?}"))?;
    let port = port
        .parse()
        .with_context(|| format!("invalid port in {target:?}"))?;
    Ok((host, port))
}

fn parse_cell(args: &[&str]) -> Result<(u8, u8)> {
    match args {
        [row, col] => Ok((
            row.parse().context("row must be a number")?,
            col.parse().context("col must be a number")?,
        )),
        _ => bail!("usage: set <row> <col>"),
    }
}

/// Run one stdin command. Returns `false` when the user asked to quit.
async fn handle_command(session: &GameSession, line: &str) -> Result<bool> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&command, args)) = words.split_first() else {
        return Ok(true);
    };

    match command {
        "connect" => {
            let [host, port] = args else {
                bail!("usage: connect <host> <port>");
            };
            let port = port.parse().context("invalid port")?;
            let peer = session.connect(host, port).await?;
            println!("connected to {peer}");
        }
        "set" => {
            let (row, col) = parse_cell(args)?;
            match session.play(row, col).await {
                MoveOutcome::Placed(tile) => println!("{tile} played ({row},{col})\n{}", session.board()),
                MoveOutcome::Rejected => println!("cell ({row},{col}) is not available"),
                MoveOutcome::NotYourTurn => println!("waiting for the opponent"),
                MoveOutcome::GameOver => println!("game over, type `new` to play again"),
            }
        }
        "greet" => {
            let delivered = session.greet().await;
            println!("greeted {delivered} peer(s)");
        }
        "peers" => {
            let peers = session.node().peers();
            if peers.is_empty() {
                println!("no peers");
            }
            for peer in peers {
                println!("{} {} {:?}", peer.id, peer.addr, peer.role);
            }
        }
        "board" => println!("{}", session.board()),
        "new" => {
            session.new_game();
            println!("{}", session.board());
        }
        "quit" | "exit" => return Ok(false),
        "help" => println!("{HELP}"),
        other => println!("unknown command {other:?}\n{HELP}"),
    }
    Ok(true)
}

fn render_event(session: &GameSession, event: GameEvent) {
    match event {
        GameEvent::RemoteMove { row, col, tile } => {
            println!("{tile} played ({row},{col})\n{}", session.board());
        }
        GameEvent::Finished { winner: Some(tile) } => println!("{tile} won!"),
        GameEvent::Finished { winner: None } => println!("draw"),
        GameEvent::Greeted { peer } => println!("{peer} says hello"),
        GameEvent::PeerJoined { peer } => println!("{peer} joined"),
        GameEvent::PeerLeft { peer } => println!("{peer} left"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.logging);

    let node = Arc::new(Node::new(config)?);
    let addr = node.start().await?;
    println!(
        "node {} reachable at {}:{}",
        node.identity(),
        local_ip(),
        addr.port()
    );

    let mode = if cli.local {
        GameMode::Local
    } else {
        GameMode::Remote
    };
    let session = Arc::new(GameSession::new(Arc::clone(&node), mode));
    let mut game_events = session.subscribe();
    session.spawn_listener();

    if let Some(target) = &cli.connect {
        let (host, port) = parse_target(target)?;
        match session.connect(host, port).await {
            Ok(peer) => println!("connected to {peer}"),
            Err(e) => warn!(error = %e, "Initial connect failed"),
        }
    }

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => match handle_command(&session, &line).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("error: {e:#}"),
                },
                None => break,
            },
            event = game_events.recv() => match event {
                Ok(event) => render_event(&session, event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Dropped game events"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received CTRL+C signal, shutting down");
                break;
            }
        }
    }

    node.stop().await?;
    Ok(())
}
