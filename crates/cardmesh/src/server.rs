//! `Node` builder and the dispatch loop.
//!
//! The dispatch loop is the only task that touches the peer directory and
//! the game state. Everything else reaches it through one of its queues:
//!
//! | Queue     | Producer                         | Event             |
//! |-----------|----------------------------------|-------------------|
//! | add       | acceptor / dial tasks            | [`PendingPeer`]   |
//! | gone      | per-peer read loops              | [`PeerGone`]      |
//! | inbound   | per-peer read loops              | [`InboundMessage`]|
//! | broadcast | [`NodeHandle`]                   | [`BroadcastRequest`] |
//! | control   | [`NodeHandle`], dial tasks       | [`Command`]       |
//!
//! Handlers never do network I/O inline. Dials run on their own tasks and
//! report back through a queue; writes go onto each peer's outbox.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cardmesh_game::{DeckContributor, GameState, Outbound, PlaintextDeck, Player};
use cardmesh_protocol::{
    BincodeCodec, Codec, Envelope, EnvelopeCodec, GameStatus, GameVariant,
    Payload, PeerList, ProtocolError, Recipient,
};
use cardmesh_transport::{
    Connection, ConnectionId, Direction, TcpConnection, TcpTransport,
    Transport, TransportError,
};
use tokio::sync::{mpsc, oneshot};

use crate::directory::PeerDirectory;
use crate::gossip;
use crate::handle::NodeHandle;
use crate::heartbeat;
use crate::peer::{self, Handshaker, Peer, PendingPeer};
use crate::{NodeConfig, NodeError};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A decoded message from a registered peer.
pub(crate) struct InboundMessage {
    /// The advertised address the connection is registered under.
    pub(crate) from: String,
    pub(crate) envelope: Envelope,
}

/// A peer's read loop ended.
pub(crate) struct PeerGone {
    pub(crate) addr: String,
    pub(crate) conn_id: ConnectionId,
}

/// A caller asking for a payload to go to a set of peers.
pub(crate) struct BroadcastRequest {
    pub(crate) to: Vec<String>,
    pub(crate) payload: Payload,
}

pub(crate) type ConnectReply = oneshot::Sender<Result<(), NodeError>>;

/// Requests and dial outcomes for the dispatch loop.
pub(crate) enum Command {
    /// Dial a peer unless it's already registered or being dialed.
    Connect { addr: String, reply: ConnectReply },

    /// A dial task failed before producing a handshaken peer.
    DialFailed { addr: String, error: NodeError },

    /// Directory keys in registration order.
    Peers { reply: oneshot::Sender<Vec<String>> },

    /// Roster snapshot in join order.
    Players { reply: oneshot::Sender<Vec<Player>> },

    /// Move the local hand one step forward.
    AdvanceStatus {
        reply: oneshot::Sender<Result<GameStatus, NodeError>>,
    },
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and binding a [`Node`].
///
/// # Example
///
/// ```rust,no_run
/// use cardmesh::prelude::*;
///
/// # async fn start() -> Result<(), NodeError> {
/// let node = Node::builder()
///     .listen("127.0.0.1:3000")
///     .dealer(true)
///     .build()
///     .await?;
/// let handle = node.spawn();
/// handle.connect("127.0.0.1:4000").await?;
/// # Ok(())
/// # }
/// ```
pub struct NodeBuilder {
    config: NodeConfig,
    deck: Box<dyn DeckContributor>,
}

impl NodeBuilder {
    /// Creates a builder with [`NodeConfig::default`] and the plaintext
    /// deck.
    pub fn new() -> Self {
        Self {
            config: NodeConfig::default(),
            deck: Box::new(PlaintextDeck),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the listener to.
    pub fn listen(mut self, addr: &str) -> Self {
        self.config.listen_addr = addr.to_string();
        self
    }

    /// Sets the address published to peers.
    pub fn advertise(mut self, addr: &str) -> Self {
        self.config.advertise_addr = Some(addr.to_string());
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.config.version = version.to_string();
        self
    }

    pub fn game_variant(mut self, variant: GameVariant) -> Self {
        self.config.game_variant = variant;
        self
    }

    /// Makes this node the dealer.
    pub fn dealer(mut self, is_dealer: bool) -> Self {
        self.config.is_dealer = is_dealer;
        self
    }

    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.config.dial_timeout = timeout;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Sets how long one write to a peer may take before the peer is
    /// disconnected.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Sets the heartbeat period. Zero turns the heartbeat off.
    pub fn heartbeat_interval(mut self, every: Duration) -> Self {
        self.config.heartbeat_interval = every;
        self
    }

    /// Sets this node's step in the shuffle chain.
    pub fn deck(mut self, deck: impl DeckContributor) -> Self {
        self.deck = Box::new(deck);
        self
    }

    /// Binds the listener and builds a node speaking bincode.
    pub async fn build(self) -> Result<Node<BincodeCodec>, NodeError> {
        self.build_with_codec(BincodeCodec).await
    }

    /// Binds the listener and builds a node with the given codec. Every
    /// node in a mesh must use the same one.
    ///
    /// # Errors
    /// Binding the listener is the only failure; it is returned as
    /// [`NodeError::Transport`].
    pub async fn build_with_codec<C: Codec>(
        self,
        codec: C,
    ) -> Result<Node<C>, NodeError> {
        let NodeBuilder { config, deck } = self;

        let transport = TcpTransport::bind(&config.listen_addr)
            .await?
            .with_max_frame_len(config.max_frame_len);
        let local_addr = match &config.advertise_addr {
            Some(addr) => addr.clone(),
            None => transport
                .local_addr()
                .map_err(TransportError::AcceptFailed)?
                .to_string(),
        };

        let game = GameState::with_contributor(
            local_addr.clone(),
            config.is_dealer,
            deck,
        );
        let snapshot = game.snapshot();
        let codec = Arc::new(EnvelopeCodec::new(codec));
        let handshaker = Arc::new(Handshaker {
            codec: Arc::clone(&codec),
            local_addr: local_addr.clone(),
            version: config.version.clone(),
            game_variant: config.game_variant,
            snapshot: Arc::clone(&snapshot),
            timeout: config.handshake_timeout,
        });

        let capacity = config.queue_capacity.max(1);
        let (add_tx, add_rx) = mpsc::channel(capacity);
        let (gone_tx, gone_rx) = mpsc::channel(capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(capacity);
        let (control_tx, control_rx) = mpsc::channel(capacity);

        let handle = NodeHandle::new(
            local_addr.clone(),
            control_tx.clone(),
            broadcast_tx,
            snapshot,
        );

        let dispatcher = Dispatcher {
            local_addr,
            dial_timeout: config.dial_timeout,
            write_timeout: config.write_timeout,
            max_frame_len: config.max_frame_len,
            codec,
            handshaker,
            directory: PeerDirectory::new(),
            game,
            dialing: HashMap::new(),
            add_tx,
            gone_tx,
            inbound_tx,
            control_tx,
            add_rx,
            gone_rx,
            inbound_rx,
            broadcast_rx,
            control_rx,
        };

        Ok(Node {
            transport,
            dispatcher,
            handle,
            heartbeat_interval: config.heartbeat_interval,
        })
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A bound node that hasn't started yet.
///
/// [`spawn()`](Self::spawn) runs it in the background;
/// [`run()`](Self::run) runs it on the current task.
pub struct Node<C: Codec = BincodeCodec> {
    transport: TcpTransport,
    dispatcher: Dispatcher<C>,
    handle: NodeHandle,
    heartbeat_interval: Duration,
}

impl Node {
    /// Creates a new builder.
    pub fn builder() -> NodeBuilder {
        NodeBuilder::new()
    }
}

impl<C: Codec> Node<C> {
    /// The address this node advertises to peers.
    pub fn listen_addr(&self) -> &str {
        self.handle.listen_addr()
    }

    /// A handle for talking to the node once it runs.
    pub fn handle(&self) -> NodeHandle {
        self.handle.clone()
    }

    /// Starts the node on background tasks and returns its handle.
    pub fn spawn(self) -> NodeHandle {
        let handle = self.handle.clone();
        tokio::spawn(self.run());
        handle
    }

    /// Runs the node: the acceptor and heartbeat on their own tasks, the
    /// dispatch loop on this one. Only returns if every
    /// queue closes.
    pub async fn run(self) -> Result<(), NodeError> {
        let Node {
            transport,
            mut dispatcher,
            handle,
            heartbeat_interval,
        } = self;

        tracing::info!(
            node = %handle.listen_addr(),
            dealer = dispatcher.game.is_dealer(),
            "cardmesh node running"
        );

        heartbeat::spawn(
            handle.listen_addr().to_string(),
            dispatcher.game.snapshot(),
            heartbeat_interval,
        );
        tokio::spawn(accept_loop(
            transport,
            Arc::clone(&dispatcher.handshaker),
            dispatcher.add_tx.clone(),
        ));

        dispatcher.run().await;
        Ok(())
    }
}

/// Accepts connections forever, handshaking each on its own task.
async fn accept_loop<C: Codec>(
    mut transport: TcpTransport,
    handshaker: Arc<Handshaker<C>>,
    add_tx: mpsc::Sender<PendingPeer>,
) {
    loop {
        match transport.accept().await {
            Ok(conn) => {
                let handshaker = Arc::clone(&handshaker);
                let add_tx = add_tx.clone();
                tokio::spawn(async move {
                    let remote = conn.remote_addr();
                    match handshaker.exchange(&conn).await {
                        Ok(handshake) => {
                            let pending = PendingPeer {
                                conn,
                                handshake,
                                dialed: None,
                            };
                            let _ = add_tx.send(pending).await;
                        }
                        Err(e) => {
                            tracing::warn!(
                                %remote,
                                error = %e,
                                "rejected inbound connection"
                            );
                            let _ = conn.close().await;
                        }
                    }
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch loop
// ---------------------------------------------------------------------------

struct Dispatcher<C: Codec> {
    local_addr: String,
    dial_timeout: Duration,
    write_timeout: Duration,
    max_frame_len: usize,
    codec: Arc<EnvelopeCodec<C>>,
    handshaker: Arc<Handshaker<C>>,
    directory: PeerDirectory,
    game: GameState,
    /// Addresses with a dial in flight, and who is waiting on each.
    dialing: HashMap<String, Vec<ConnectReply>>,

    add_tx: mpsc::Sender<PendingPeer>,
    gone_tx: mpsc::Sender<PeerGone>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    control_tx: mpsc::Sender<Command>,

    add_rx: mpsc::Receiver<PendingPeer>,
    gone_rx: mpsc::Receiver<PeerGone>,
    inbound_rx: mpsc::Receiver<InboundMessage>,
    broadcast_rx: mpsc::Receiver<BroadcastRequest>,
    control_rx: mpsc::Receiver<Command>,
}

impl<C: Codec> Dispatcher<C> {
    /// Processes one event at a time until every queue closes.
    async fn run(&mut self) {
        loop {
            tokio::select! {
                Some(pending) = self.add_rx.recv() => {
                    self.handle_add_peer(pending);
                }
                Some(gone) = self.gone_rx.recv() => {
                    self.handle_peer_gone(gone);
                }
                Some(msg) = self.inbound_rx.recv() => {
                    self.handle_inbound(msg);
                }
                Some(req) = self.broadcast_rx.recv() => {
                    self.deliver(req.to, req.payload);
                }
                Some(cmd) = self.control_rx.recv() => {
                    self.handle_command(cmd);
                }
                else => break,
            }
        }
        tracing::info!(node = %self.local_addr, "dispatch loop stopped");
    }

    // -- peer-add ----------------------------------------------------------

    fn handle_add_peer(&mut self, pending: PendingPeer) {
        let PendingPeer {
            conn,
            handshake,
            dialed,
        } = pending;
        let addr = handshake.listen_addr.clone();
        let direction = conn.direction();

        if addr == self.local_addr {
            tracing::warn!(%addr, "connected to self, closing");
            close_detached(conn);
            if let Some(dialed) = &dialed {
                self.finish_dial(dialed, || {
                    Err(NodeError::SelfConnect(addr.clone()))
                });
            }
            return;
        }

        let replacing = match self.directory.get(&addr) {
            None => false,
            Some(existing) => {
                if !self.keeps_new_connection(&addr, existing.direction(), direction) {
                    tracing::warn!(
                        %addr,
                        %direction,
                        "duplicate connection, keeping the existing one"
                    );
                    close_detached(conn);
                    if let Some(dialed) = &dialed {
                        self.finish_dial(dialed, || Ok(()));
                    }
                    return;
                }
                tracing::warn!(
                    %addr,
                    %direction,
                    "duplicate connection, replacing the existing one"
                );
                true
            }
        };

        let peer = Peer::new(addr.clone(), conn, self.write_timeout);
        if let Some(old) = self.directory.insert(peer.clone()) {
            old.close_in_background();
        }
        peer::spawn_read_loop(
            &peer,
            Arc::clone(&self.codec),
            self.inbound_tx.clone(),
            self.gone_tx.clone(),
        );
        let connected = self.directory.len();
        self.game.set_connected(connected);
        if let Some(dialed) = &dialed {
            self.finish_dial(dialed, || Ok(()));
        }
        self.finish_dial(&addr, || Ok(()));
        tracing::info!(
            %addr,
            %direction,
            status = %handshake.game_status,
            peers = connected,
            "peer registered"
        );

        if !replacing && direction.is_inbound() {
            self.send_peer_list(&peer);
        }

        let out = self.game.add_player(&addr, handshake.game_status, connected);
        self.dispatch(out);
    }

    /// Decides which of two connections to the same peer survives. Both
    /// ends keep the one dialed by the node with the smaller advertised
    /// address; a second connection in the same direction replaces the
    /// first.
    fn keeps_new_connection(
        &self,
        remote: &str,
        existing: Direction,
        new: Direction,
    ) -> bool {
        if existing == new {
            return true;
        }
        let preferred = if self.local_addr.as_str() < remote {
            Direction::Outbound
        } else {
            Direction::Inbound
        };
        new == preferred
    }

    fn send_peer_list(&self, target: &Peer) {
        let Some(list) = gossip::peer_list_for(self.directory.addrs(), target.addr())
        else {
            tracing::debug!(peer = %target.addr(), "no other peers to share");
            return;
        };
        let count = list.peers.len();
        match self.encode(Payload::PeerList(list)) {
            Ok(bytes) => {
                tracing::debug!(peer = %target.addr(), count, "sharing peer list");
                target.send(Arc::from(bytes));
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to encode peer list");
            }
        }
    }

    // -- peer-remove -------------------------------------------------------

    fn handle_peer_gone(&mut self, gone: PeerGone) {
        match self.directory.remove(&gone.addr, gone.conn_id) {
            Some(_) => {
                let connected = self.directory.len();
                self.game.set_connected(connected);
                self.game.player_departed(&gone.addr);
                tracing::info!(
                    addr = %gone.addr,
                    peers = connected,
                    "peer disconnected"
                );
            }
            None => {
                tracing::debug!(
                    addr = %gone.addr,
                    conn = %gone.conn_id,
                    "ignoring disconnect of a replaced connection"
                );
            }
        }
    }

    // -- inbound -----------------------------------------------------------

    fn handle_inbound(&mut self, msg: InboundMessage) {
        let InboundMessage { from, envelope } = msg;
        if envelope.from != from {
            tracing::debug!(
                %from,
                claimed = %envelope.from,
                "envelope sender differs from registered address"
            );
        }

        let connected = self.directory.len();
        match envelope.payload {
            Payload::PeerList(list) => self.handle_peer_list(&from, list),
            Payload::EncryptedDeck(deck) => {
                match self.game.receive_deck(&from, deck) {
                    Ok(out) => self.dispatch(out),
                    Err(e) => {
                        tracing::warn!(%from, error = %e, "dropping deck");
                    }
                }
            }
            Payload::PlayerStatus(update) => {
                match self.game.set_player_status(&from, update.status, connected) {
                    Ok(out) => self.dispatch(out),
                    Err(e) => {
                        tracing::warn!(%from, error = %e, "dropping status update");
                    }
                }
            }
            Payload::Handshake(_) => {
                tracing::warn!(%from, "unexpected handshake from registered peer");
            }
        }
    }

    fn handle_peer_list(&mut self, from: &str, list: PeerList) {
        let to_dial: Vec<String> = gossip::addrs_to_dial(
            &list,
            &self.local_addr,
            |addr| self.directory.contains(addr) || self.dialing.contains_key(addr),
        )
        .map(str::to_string)
        .collect();

        tracing::debug!(
            %from,
            received = list.peers.len(),
            new = to_dial.len(),
            "received peer list"
        );
        for addr in to_dial {
            self.start_dial(addr, None);
        }
    }

    // -- control -----------------------------------------------------------

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { addr, reply } => self.handle_connect(addr, reply),
            Command::DialFailed { addr, error } => {
                tracing::warn!(%addr, error = %error, "dial failed");
                let reason = error.to_string();
                let mut first = Some(error);
                for reply in self.dialing.remove(&addr).unwrap_or_default() {
                    let err = first.take().unwrap_or_else(|| {
                        NodeError::ConnectFailed {
                            addr: addr.clone(),
                            reason: reason.clone(),
                        }
                    });
                    let _ = reply.send(Err(err));
                }
            }
            Command::Peers { reply } => {
                let _ = reply.send(self.directory.addrs().map(str::to_string).collect());
            }
            Command::Players { reply } => {
                let _ = reply.send(self.game.players().to_vec());
            }
            Command::AdvanceStatus { reply } => {
                let result = match self.game.advance(self.directory.len()) {
                    Ok(out) => {
                        self.dispatch(out);
                        Ok(self.game.status())
                    }
                    Err(e) => Err(NodeError::Game(e)),
                };
                let _ = reply.send(result);
            }
        }
    }

    fn handle_connect(&mut self, addr: String, reply: ConnectReply) {
        if addr == self.local_addr {
            let _ = reply.send(Err(NodeError::SelfConnect(addr)));
            return;
        }
        if self.directory.contains(&addr) {
            tracing::debug!(%addr, "already connected");
            let _ = reply.send(Ok(()));
            return;
        }
        if let Some(waiters) = self.dialing.get_mut(&addr) {
            waiters.push(reply);
            return;
        }
        self.start_dial(addr, Some(reply));
    }

    /// Spawns a dial + handshake. The outcome comes back on the add queue
    /// or as [`Command::DialFailed`].
    fn start_dial(&mut self, addr: String, reply: Option<ConnectReply>) {
        tracing::info!(%addr, "dialing peer");
        self.dialing.entry(addr.clone()).or_default().extend(reply);

        let handshaker = Arc::clone(&self.handshaker);
        let add_tx = self.add_tx.clone();
        let control_tx = self.control_tx.clone();
        let dial_timeout = self.dial_timeout;
        let max_frame_len = self.max_frame_len;
        tokio::spawn(async move {
            match handshaker.dial(&addr, dial_timeout, max_frame_len).await {
                Ok((conn, handshake)) => {
                    let pending = PendingPeer {
                        conn,
                        handshake,
                        dialed: Some(addr),
                    };
                    let _ = add_tx.send(pending).await;
                }
                Err(error) => {
                    let _ = control_tx.send(Command::DialFailed { addr, error }).await;
                }
            }
        });
    }

    fn finish_dial(
        &mut self,
        addr: &str,
        result: impl Fn() -> Result<(), NodeError>,
    ) {
        if let Some(waiters) = self.dialing.remove(addr) {
            for reply in waiters {
                let _ = reply.send(result());
            }
        }
    }

    // -- outbound ----------------------------------------------------------

    fn encode(&self, payload: Payload) -> Result<Vec<u8>, ProtocolError> {
        self.codec
            .encode(&Envelope::new(self.local_addr.clone(), payload))
    }

    /// Sends what the game state asked for.
    fn dispatch(&self, out: Outbound) {
        for (to, payload) in out {
            let addrs = self.resolve(&to);
            self.deliver(addrs, payload);
        }
    }

    fn resolve(&self, to: &Recipient) -> Vec<String> {
        match to {
            Recipient::All => self.directory.addrs().map(str::to_string).collect(),
            Recipient::Player(addr) => vec![addr.clone()],
        }
    }

    /// Encodes `payload` once and queues it on the outbox of every
    /// registered peer in `to`. Unknown addresses are skipped.
    fn deliver(&self, to: Vec<String>, payload: Payload) {
        let kind = payload.kind();
        let targets: Vec<&Peer> = to
            .iter()
            .filter_map(|addr| {
                let peer = self.directory.get(addr);
                if peer.is_none() {
                    tracing::warn!(%addr, %kind, "no registered peer, skipping");
                }
                peer
            })
            .collect();
        if targets.is_empty() {
            return;
        }

        let bytes: Arc<[u8]> = match self.encode(payload) {
            Ok(bytes) => Arc::from(bytes),
            Err(e) => {
                tracing::error!(%kind, error = %e, "failed to encode message");
                return;
            }
        };
        tracing::debug!(%kind, destinations = targets.len(), "sending");

        for peer in targets {
            if !peer.send(Arc::clone(&bytes)) {
                tracing::debug!(addr = %peer.addr(), %kind, "writer stopped, message dropped");
            }
        }
    }
}

/// Closes a connection that never made it into the directory.
fn close_detached(conn: TcpConnection) {
    tokio::spawn(async move {
        let _ = conn.close().await;
    });
}
