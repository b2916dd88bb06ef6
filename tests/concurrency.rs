#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{eventually, named_config, next_matching, started_node, RawPeer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use ttt_mesh::protocol::identity::NodeId;
use ttt_mesh::protocol::message::Message;
use ttt_mesh::transport::event::NodeEvent;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_senders_never_interleave_frames() {
    let (node, port) = started_node(named_config("fanout")).await;
    let mut raw = RawPeer::connect(port).await;
    raw.handshake("sink").await;
    eventually("sink registered", || node.peer_count() == 1).await;

    let tasks_count = 16u8;
    let per_task = 50u8;
    let peer = node.peers()[0].id.clone();

    let mut tasks = JoinSet::new();
    for t in 0..tasks_count {
        let node = Arc::clone(&node);
        let peer = peer.clone();
        tasks.spawn(async move {
            for i in 0..per_task {
                node.send_to(&peer, Message::Set { row: t, col: i })
                    .await
                    .unwrap();
            }
        });
    }

    let expected = usize::from(tasks_count) * usize::from(per_task);
    let mut last_col = vec![None::<u8>; usize::from(tasks_count)];
    for _ in 0..expected {
        // `recv` panics on any malformed frame.
        match raw.recv().await {
            Some(Message::Set { row, col }) => {
                // Each sender's own frames keep their order.
                let slot = &mut last_col[usize::from(row)];
                assert!(slot.map_or(true, |prev| prev < col));
                *slot = Some(col);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }
    assert_eq!(
        node.metrics().snapshot().messages_sent,
        u64::try_from(expected).unwrap()
    );

    node.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn broadcast_races_with_disconnects() {
    let (hub, hub_port) = started_node(named_config("hub")).await;

    let mut peers = Vec::new();
    for i in 0..6 {
        let mut raw = RawPeer::connect(hub_port).await;
        raw.handshake(&format!("peer-{i}")).await;
        peers.push(raw);
    }
    eventually("all peers registered", || hub.peer_count() == 6).await;

    let mut tasks = JoinSet::new();
    for _ in 0..4 {
        let hub = Arc::clone(&hub);
        tasks.spawn(async move {
            for _ in 0..25 {
                hub.broadcast(Message::Greet).await;
            }
        });
    }
    // Half the peers leave while broadcasts are in flight.
    for peer in hub.peers().into_iter().take(3) {
        let _ = hub.disconnect(&peer.id);
    }

    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }
    assert_eq!(hub.peer_count(), 3);

    hub.stop().await.unwrap();
    assert_eq!(hub.metrics().snapshot().connections_active, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stalled_peer_times_out_without_blocking_others() {
    let (hub, hub_port) = started_node(named_config("hub")).await;
    let (live, live_port) = started_node(named_config("live")).await;
    let write_timeout = hub.config().transport.write_timeout;

    hub.connect("127.0.0.1", live_port).await.unwrap();
    // Handshakes, then never reads again.
    let mut stalled = RawPeer::connect(hub_port).await;
    stalled.handshake("stalled").await;
    eventually("hub sees both peers", || hub.peer_count() == 2).await;

    // Keep broadcasting until the stalled peer's socket buffers are full and
    // a write to it runs into the timeout.
    let (delivered, elapsed, rounds) = tokio::time::timeout(Duration::from_secs(60), async {
        let mut rounds = 0u64;
        loop {
            rounds += 1;
            let started = Instant::now();
            let delivered = hub.broadcast(Message::Set { row: 0, col: 0 }).await;
            if delivered < 2 {
                break (delivered, started.elapsed(), rounds);
            }
        }
    })
    .await
    .expect("stalled peer never hit the write timeout");

    assert_eq!(delivered, 1, "live peer missed broadcast {rounds}");
    assert!(elapsed >= write_timeout.mul_f32(0.8), "took {elapsed:?}");
    assert!(elapsed < write_timeout * 4, "took {elapsed:?}");
    assert!(hub.metrics().snapshot().send_failures >= 1);

    eventually("stalled peer pruned", || hub.peer_count() == 1).await;
    assert_eq!(hub.peers()[0].id.as_str(), "live");

    let mut live_events = live.subscribe();
    assert_eq!(hub.broadcast(Message::Set { row: 2, col: 2 }).await, 1);
    let event = next_matching(&mut live_events, |e| {
        matches!(e, NodeEvent::SetReceived { row: 2, col: 2, .. })
    })
    .await;
    assert_eq!(
        event,
        NodeEvent::SetReceived {
            peer: NodeId::new("hub").unwrap(),
            row: 2,
            col: 2
        }
    );

    drop(stalled);
    hub.stop().await.unwrap();
    live.stop().await.unwrap();
}
