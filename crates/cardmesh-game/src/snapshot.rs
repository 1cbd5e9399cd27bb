//! Lock-free, read-only view of the game counters.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use cardmesh_protocol::GameStatus;

/// Counters published by the game state for readers outside the dispatch
/// loop (the heartbeat, the handshake sender, node handles).
///
/// Only [`GameState`](crate::GameState) writes these.
#[derive(Debug, Default)]
pub struct StatusSnapshot {
    status: AtomicI32,
    players_waiting: AtomicUsize,
    connected: AtomicUsize,
}

impl StatusSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The node's global status.
    pub fn status(&self) -> GameStatus {
        GameStatus::try_from(self.status.load(Ordering::Acquire))
            .unwrap_or_default()
    }

    /// Players counted at `WaitingForCards` for the current hand.
    pub fn players_waiting(&self) -> usize {
        self.players_waiting.load(Ordering::Acquire)
    }

    /// Peers currently registered in the directory.
    pub fn connected_players(&self) -> usize {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn store_status(&self, status: GameStatus) {
        self.status.store(status.code(), Ordering::Release);
    }

    pub(crate) fn store_players_waiting(&self, n: usize) {
        self.players_waiting.store(n, Ordering::Release);
    }

    pub(crate) fn store_connected(&self, n: usize) {
        self.connected.store(n, Ordering::Release);
    }
}
