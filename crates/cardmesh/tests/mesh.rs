//! Integration tests for a mesh of real nodes on loopback TCP.

use std::future::Future;
use std::time::Duration;

use cardmesh::GameError;
use cardmesh::prelude::*;
use cardmesh_protocol::{
    BincodeCodec, Codec, EncryptedDeck, Envelope, EnvelopeCodec, Handshake,
    PeerList, WireEnvelope,
};
use cardmesh_transport::{Connection, DEFAULT_MAX_FRAME_LEN, TcpConnection};
use futures_util::future::join_all;

// =========================================================================
// Helpers
// =========================================================================

async fn start(builder: NodeBuilder) -> NodeHandle {
    builder
        .listen("127.0.0.1:0")
        .heartbeat_interval(Duration::ZERO)
        .build()
        .await
        .unwrap()
        .spawn()
}

async fn node() -> NodeHandle {
    start(Node::builder()).await
}

async fn dealer() -> NodeHandle {
    start(Node::builder().dealer(true)).await
}

/// Polls `check` until it returns true, panicking after ~2 seconds.
async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn status_of(viewer: &NodeHandle, addr: &str) -> Option<GameStatus> {
    viewer
        .players()
        .await
        .unwrap()
        .into_iter()
        .find(|p| p.addr == addr)
        .map(|p| p.status)
}

/// A hand-driven peer speaking the wire protocol directly.
struct RawPeer {
    conn: TcpConnection,
    codec: EnvelopeCodec<BincodeCodec>,
    addr: String,
}

impl RawPeer {
    /// Connects to `target` and completes the handshake, advertising
    /// `addr` and reporting `WaitingForCards`.
    async fn connect(target: &str, addr: &str) -> (Self, Handshake) {
        Self::connect_with_status(target, addr, GameStatus::WaitingForCards)
            .await
    }

    async fn connect_with_status(
        target: &str,
        addr: &str,
        status: GameStatus,
    ) -> (Self, Handshake) {
        let conn = TcpConnection::connect(
            target,
            Duration::from_secs(1),
            DEFAULT_MAX_FRAME_LEN,
        )
        .await
        .unwrap();
        let peer = Self {
            conn,
            codec: EnvelopeCodec::default(),
            addr: addr.to_string(),
        };
        peer.send(Payload::Handshake(Handshake {
            version: cardmesh::PROTOCOL_VERSION.into(),
            game_variant: GameVariant::TEXAS_HOLDEM,
            game_status: status,
            listen_addr: addr.to_string(),
        }))
        .await;

        let theirs = match peer.recv().await.unwrap().payload {
            Payload::Handshake(hs) => hs,
            other => panic!("expected handshake, got {other:?}"),
        };
        (peer, theirs)
    }

    async fn send(&self, payload: Payload) {
        let envelope = Envelope::new(self.addr.clone(), payload);
        let bytes = self.codec.encode(&envelope).unwrap();
        self.conn.send(&bytes).await.unwrap();
    }

    async fn recv(&self) -> Option<Envelope> {
        let bytes = self.conn.recv().await.unwrap()?;
        Some(self.codec.decode(&bytes).unwrap())
    }

    /// Reads until a deck arrives, skipping status and gossip traffic.
    async fn recv_deck(&self) -> EncryptedDeck {
        let wait = async {
            loop {
                if let Payload::EncryptedDeck(deck) =
                    self.recv().await.unwrap().payload
                {
                    return deck;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(2), wait)
            .await
            .expect("no deck arrived")
    }

    /// Waits briefly for a message; `None` if nothing arrives.
    async fn try_recv(&self) -> Option<Envelope> {
        tokio::time::timeout(Duration::from_millis(200), self.recv())
            .await
            .ok()
            .flatten()
    }
}

// =========================================================================
// Connect
// =========================================================================

#[tokio::test]
async fn test_connect_twice_creates_one_entry() {
    let a = node().await;
    let b = node().await;

    b.connect(a.listen_addr()).await.unwrap();
    b.connect(a.listen_addr()).await.unwrap();

    assert_eq!(b.peers().await.unwrap(), vec![a.listen_addr().to_string()]);
    eventually("a to register b", || async {
        a.peers().await.unwrap() == vec![b.listen_addr().to_string()]
    })
    .await;
    assert_eq!(b.connected_players(), 1);
}

#[tokio::test]
async fn test_connect_concurrent_calls_share_one_connection() {
    let a = node().await;
    let b = node().await;

    let (first, second) =
        tokio::join!(b.connect(a.listen_addr()), b.connect(a.listen_addr()));
    first.unwrap();
    second.unwrap();

    assert_eq!(b.peers().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_connect_own_address_is_rejected() {
    let a = node().await;
    let result = a.connect(a.listen_addr()).await;
    assert!(matches!(result, Err(NodeError::SelfConnect(_))));
    assert!(a.peers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_connect_nothing_listening_returns_error() {
    let a = start(
        Node::builder().dial_timeout(Duration::from_millis(500)),
    )
    .await;

    // Bind then drop to get a port nobody listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let result = a.connect(&addr).await;
    assert!(matches!(result, Err(NodeError::Transport(_))));
    assert!(a.peers().await.unwrap().is_empty());
}

// =========================================================================
// Handshake gate
// =========================================================================

#[tokio::test]
async fn test_handshake_variant_mismatch_registers_nothing() {
    let holdem = node().await;
    let other = start(Node::builder().game_variant(GameVariant::OTHER)).await;

    let result = other.connect(holdem.listen_addr()).await;
    assert!(matches!(result, Err(NodeError::VariantMismatch { .. })));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(holdem.peers().await.unwrap().is_empty());
    assert!(other.peers().await.unwrap().is_empty());
    assert!(holdem.players().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_handshake_version_mismatch_registers_nothing() {
    let a = node().await;
    let b = start(Node::builder().version("9.9.9")).await;

    let result = b.connect(a.listen_addr()).await;
    assert!(matches!(result, Err(NodeError::VersionMismatch { .. })));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(a.peers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_handshake_carries_advertised_address_not_socket_address() {
    let a = node().await;
    let (_raw, theirs) = RawPeer::connect(a.listen_addr(), "10.1.2.3:7000").await;

    assert_eq!(theirs.listen_addr, a.listen_addr());
    eventually("a to register the advertised address", || async {
        a.peers().await.unwrap() == vec!["10.1.2.3:7000".to_string()]
    })
    .await;
}

// =========================================================================
// Gossip
// =========================================================================

#[tokio::test]
async fn test_gossip_convergence_c_learns_a_through_b() {
    let a = node().await;
    let b = node().await;
    let c = node().await;

    b.connect(a.listen_addr()).await.unwrap();
    c.connect(b.listen_addr()).await.unwrap();

    eventually("c to discover a", || async {
        c.peers()
            .await
            .unwrap()
            .contains(&a.listen_addr().to_string())
    })
    .await;
    eventually("a to register c", || async {
        a.peers().await.unwrap().len() == 2
    })
    .await;
    assert_eq!(c.peers().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_gossip_convergence_line_of_four_becomes_full_mesh() {
    let nodes = join_all((0..4).map(|_| node())).await;
    for pair in nodes.windows(2) {
        pair[1].connect(pair[0].listen_addr()).await.unwrap();
    }

    for n in &nodes {
        eventually("every node to know the other three", || async {
            n.peers().await.unwrap().len() == 3
        })
        .await;
    }
}

#[tokio::test]
async fn test_gossip_two_node_mesh_sends_no_peer_list() {
    let a = node().await;
    let (raw, _) = RawPeer::connect(a.listen_addr(), "10.1.2.3:7000").await;

    assert!(raw.try_recv().await.is_none());
}

#[tokio::test]
async fn test_gossip_inbound_peer_receives_other_peers() {
    let a = node().await;
    let b = node().await;
    b.connect(a.listen_addr()).await.unwrap();
    eventually("a to register b", || async {
        a.peers().await.unwrap().len() == 1
    })
    .await;

    let (raw, _) = RawPeer::connect(a.listen_addr(), "10.1.2.3:7000").await;
    let msg = raw.recv().await.unwrap();
    assert_eq!(
        msg.payload,
        Payload::PeerList(PeerList {
            peers: vec![b.listen_addr().to_string()],
        })
    );
}

// =========================================================================
// Read loop and disconnects
// =========================================================================

#[tokio::test]
async fn test_unknown_kind_is_dropped_and_peer_stays() {
    let a = node().await;
    let (raw, _) = RawPeer::connect(a.listen_addr(), "10.1.2.3:7000").await;

    let unknown = WireEnvelope {
        from: raw.addr.clone(),
        kind: 42,
        body: vec![1, 2, 3],
    };
    raw.conn
        .send(&raw.codec.codec().encode(&unknown).unwrap())
        .await
        .unwrap();
    raw.send(Payload::PlayerStatus(PlayerStatus {
        status: GameStatus::Turn,
    }))
    .await;

    eventually("status update after unknown kind", || async {
        status_of(&a, "10.1.2.3:7000").await == Some(GameStatus::Turn)
    })
    .await;
    assert_eq!(a.peers().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_disconnect_removes_peer_but_keeps_player() {
    let a = node().await;
    let (raw, _) = RawPeer::connect(a.listen_addr(), "10.1.2.3:7000").await;
    eventually("a to register raw peer", || async {
        a.peers().await.unwrap().len() == 1
    })
    .await;

    raw.conn.close().await.unwrap();

    eventually("a to drop raw peer", || async {
        a.peers().await.unwrap().is_empty()
    })
    .await;
    assert_eq!(a.connected_players(), 0);
    let players = a.players().await.unwrap();
    assert_eq!(players.len(), 1);
    assert_eq!(players[0].status, GameStatus::WaitingForCards);
    assert!(!players[0].connected);
    assert_eq!(a.players_waiting(), 1);
}

// =========================================================================
// Quorum trigger and shuffle chain
// =========================================================================

#[tokio::test]
async fn test_quorum_dealer_deals_once_when_peer_waits() {
    let d = dealer().await;
    let p = node().await;

    p.connect(d.listen_addr()).await.unwrap();

    eventually("peer to finish the shuffle chain", || async {
        p.status() == GameStatus::Dealing
    })
    .await;
    eventually("dealer to follow the peer into dealing", || async {
        d.status() == GameStatus::Dealing
    })
    .await;
    eventually("peer to learn the dealer is dealing", || async {
        status_of(&p, d.listen_addr()).await == Some(GameStatus::Dealing)
    })
    .await;
    assert_eq!(d.players_waiting(), 1);
}

#[tokio::test]
async fn test_quorum_dealer_hands_deck_to_first_player() {
    let d = dealer().await;
    let (raw, _) = RawPeer::connect(d.listen_addr(), "10.1.2.3:7000").await;

    // One peer, waiting: registration alone completes the quorum.
    let first = raw.recv().await.unwrap();
    assert_eq!(
        first.payload,
        Payload::PlayerStatus(PlayerStatus {
            status: GameStatus::ReceivingCards,
        })
    );
    match raw.recv().await.unwrap().payload {
        Payload::EncryptedDeck(deck) => {
            assert_eq!(deck.deck.len(), 52);
            assert_eq!(deck.contributors, vec![d.listen_addr().to_string()]);
        }
        other => panic!("expected deck, got {other:?}"),
    }
    assert_eq!(d.status(), GameStatus::ReceivingCards);
}

#[tokio::test]
async fn test_quorum_waits_for_every_connected_peer() {
    let d = dealer().await;
    let (first, _) = RawPeer::connect_with_status(
        d.listen_addr(),
        "10.0.0.1:1",
        GameStatus::Flop,
    )
    .await;
    eventually("first registered", || async {
        d.peers().await.unwrap().len() == 1
    })
    .await;
    let (second, _) = RawPeer::connect(d.listen_addr(), "10.0.0.2:2").await;
    eventually("second registered", || async {
        d.peers().await.unwrap().len() == 2
    })
    .await;

    // One of two waiting.
    assert_eq!(d.players_waiting(), 1);
    assert_eq!(d.status(), GameStatus::WaitingForCards);

    first
        .send(Payload::PlayerStatus(PlayerStatus {
            status: GameStatus::WaitingForCards,
        }))
        .await;
    eventually("dealer to start dealing", || async {
        d.status() == GameStatus::ReceivingCards
    })
    .await;

    // The deck goes to the earliest joiner.
    assert!(matches!(
        first.recv().await.unwrap().payload,
        Payload::PlayerStatus(_)
    ));
    assert!(matches!(
        first.recv().await.unwrap().payload,
        Payload::EncryptedDeck(_)
    ));
    assert!(matches!(
        second.recv().await.unwrap().payload,
        Payload::PeerList(_)
    ));
    assert!(matches!(
        second.recv().await.unwrap().payload,
        Payload::PlayerStatus(_)
    ));
    assert!(second.try_recv().await.is_none());
}

#[tokio::test]
async fn test_quorum_skips_departed_player_for_deck() {
    let d = dealer().await;
    let (gone, _) = RawPeer::connect_with_status(
        d.listen_addr(),
        "10.0.0.1:1",
        GameStatus::Flop,
    )
    .await;
    eventually("first registered", || async {
        d.peers().await.unwrap().len() == 1
    })
    .await;
    let (second, _) = RawPeer::connect(d.listen_addr(), "10.0.0.2:2").await;
    eventually("second registered", || async {
        d.peers().await.unwrap().len() == 2
    })
    .await;

    gone.conn.close().await.unwrap();
    eventually("first to leave", || async {
        d.peers().await.unwrap().len() == 1
    })
    .await;

    // 2 waiting, 2 connected: deals, and the earliest joiner has left.
    let (_third, _) = RawPeer::connect(d.listen_addr(), "10.0.0.3:3").await;
    let deck = second.recv_deck().await;
    assert_eq!(deck.contributors, vec![d.listen_addr().to_string()]);
    assert_eq!(d.status(), GameStatus::ReceivingCards);
}

#[tokio::test]
async fn test_advance_status_full_hand_loops_to_second_deal() {
    let d = dealer().await;
    let p = node().await;
    p.connect(d.listen_addr()).await.unwrap();
    eventually("both dealing", || async {
        p.status() == GameStatus::Dealing && d.status() == GameStatus::Dealing
    })
    .await;

    for expected in [
        GameStatus::PreFlop,
        GameStatus::Flop,
        GameStatus::Turn,
        GameStatus::River,
    ] {
        assert_eq!(d.advance_status().await.unwrap(), expected);
        assert_eq!(p.advance_status().await.unwrap(), expected);
    }
    eventually("dealer to see the peer on the river", || async {
        status_of(&d, p.listen_addr()).await == Some(GameStatus::River)
    })
    .await;

    // Dealer starts the next hand first and waits for the peer.
    assert_eq!(
        d.advance_status().await.unwrap(),
        GameStatus::WaitingForCards
    );
    let err = d.advance_status().await.unwrap_err();
    assert!(matches!(err, NodeError::Game(GameError::InvalidTransition(_))));

    assert_eq!(
        p.advance_status().await.unwrap(),
        GameStatus::WaitingForCards
    );
    eventually("second hand to be dealt", || async {
        p.status() == GameStatus::Dealing && d.status() == GameStatus::Dealing
    })
    .await;
}

// =========================================================================
// Broadcast
// =========================================================================

#[tokio::test]
async fn test_broadcast_unreachable_destination_still_delivers_to_others() {
    let a = node().await;
    let b = node().await;
    b.connect(a.listen_addr()).await.unwrap();
    eventually("a to register b", || async {
        a.peers().await.unwrap().len() == 1
    })
    .await;

    a.broadcast(
        vec!["127.0.0.1:1".to_string(), b.listen_addr().to_string()],
        Payload::PlayerStatus(PlayerStatus {
            status: GameStatus::Flop,
        }),
    )
    .await
    .unwrap();

    eventually("b to receive the broadcast", || async {
        status_of(&b, a.listen_addr()).await == Some(GameStatus::Flop)
    })
    .await;
}

#[tokio::test]
async fn test_send_to_player_reaches_only_that_peer() {
    let a = node().await;
    let (one, _) = RawPeer::connect(a.listen_addr(), "10.0.0.1:1").await;
    eventually("a to register one", || async {
        a.peers().await.unwrap().len() == 1
    })
    .await;
    let (two, _) = RawPeer::connect(a.listen_addr(), "10.0.0.2:2").await;
    // `two` is told about `one` on connect.
    assert_eq!(
        two.recv().await.unwrap().payload,
        Payload::PeerList(PeerList {
            peers: vec!["10.0.0.1:1".to_string()],
        })
    );

    a.send_to_player(
        "10.0.0.1:1",
        Payload::PlayerStatus(PlayerStatus {
            status: GameStatus::River,
        }),
    )
    .await
    .unwrap();

    let got = one.recv().await.unwrap();
    assert_eq!(got.from, a.listen_addr());
    assert!(two.try_recv().await.is_none());
}
