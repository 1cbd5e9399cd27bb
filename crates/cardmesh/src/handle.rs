//! `NodeHandle`: the outside world's way into a running node.

use std::sync::Arc;

use cardmesh_game::{Player, StatusSnapshot};
use cardmesh_protocol::{GameStatus, Payload};
use tokio::sync::{mpsc, oneshot};

use crate::server::{BroadcastRequest, Command};
use crate::NodeError;

/// Handle to a running node.
///
/// Cheap to clone. Requests go through the dispatch loop's queues; the
/// counters (`status`, `players_waiting`, `connected_players`) are read
/// straight from the published snapshot without a round trip.
#[derive(Clone)]
pub struct NodeHandle {
    listen_addr: String,
    control: mpsc::Sender<Command>,
    broadcast: mpsc::Sender<BroadcastRequest>,
    snapshot: Arc<StatusSnapshot>,
}

impl NodeHandle {
    pub(crate) fn new(
        listen_addr: String,
        control: mpsc::Sender<Command>,
        broadcast: mpsc::Sender<BroadcastRequest>,
        snapshot: Arc<StatusSnapshot>,
    ) -> Self {
        Self {
            listen_addr,
            control,
            broadcast,
            snapshot,
        }
    }

    /// The address this node advertises.
    pub fn listen_addr(&self) -> &str {
        &self.listen_addr
    }

    /// Connects to the peer listening at `addr` and waits until it is
    /// registered or the attempt fails.
    ///
    /// Connecting to an address that is already registered, or already
    /// being dialed, does not open a second connection.
    ///
    /// # Errors
    /// - [`NodeError::SelfConnect`] for our own address
    /// - [`NodeError::Transport`] if the dial fails or times out
    /// - a handshake error if the peer fails the compatibility gate
    pub async fn connect(&self, addr: &str) -> Result<(), NodeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.control
            .send(Command::Connect {
                addr: addr.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| NodeError::Unavailable)?;
        reply_rx.await.map_err(|_| NodeError::Unavailable)?
    }

    /// Advertised addresses of every registered peer, in registration
    /// order.
    pub async fn peers(&self) -> Result<Vec<String>, NodeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.control
            .send(Command::Peers { reply: reply_tx })
            .await
            .map_err(|_| NodeError::Unavailable)?;
        reply_rx.await.map_err(|_| NodeError::Unavailable)
    }

    /// Every player seen so far, in join order. Includes players whose
    /// connection has since closed.
    pub async fn players(&self) -> Result<Vec<Player>, NodeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.control
            .send(Command::Players { reply: reply_tx })
            .await
            .map_err(|_| NodeError::Unavailable)?;
        reply_rx.await.map_err(|_| NodeError::Unavailable)
    }

    /// Moves the local hand one step and returns the new status. From
    /// `River` this starts the next hand.
    ///
    /// # Errors
    /// [`NodeError::Game`] while waiting for or receiving cards.
    pub async fn advance_status(&self) -> Result<GameStatus, NodeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.control
            .send(Command::AdvanceStatus { reply: reply_tx })
            .await
            .map_err(|_| NodeError::Unavailable)?;
        reply_rx.await.map_err(|_| NodeError::Unavailable)?
    }

    /// Queues `payload` for every address in `to`. Addresses that aren't
    /// registered are skipped, and a failed delivery to one peer doesn't
    /// affect the others.
    pub async fn broadcast(
        &self,
        to: Vec<String>,
        payload: Payload,
    ) -> Result<(), NodeError> {
        self.broadcast
            .send(BroadcastRequest { to, payload })
            .await
            .map_err(|_| NodeError::Unavailable)
    }

    /// Queues `payload` for a single peer.
    pub async fn send_to_player(
        &self,
        addr: &str,
        payload: Payload,
    ) -> Result<(), NodeError> {
        self.broadcast(vec![addr.to_string()], payload).await
    }

    /// The node's global status.
    pub fn status(&self) -> GameStatus {
        self.snapshot.status()
    }

    /// Players counted at `WaitingForCards` for the current hand.
    pub fn players_waiting(&self) -> usize {
        self.snapshot.players_waiting()
    }

    /// Size of the peer directory.
    pub fn connected_players(&self) -> usize {
        self.snapshot.connected_players()
    }
}
