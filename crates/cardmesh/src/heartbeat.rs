//! Periodic status log.
//!
//! Reads the game's [`StatusSnapshot`] on a fixed interval and logs it.
//! Never writes state.

use std::sync::Arc;
use std::time::Duration;

use cardmesh_game::StatusSnapshot;
use cardmesh_protocol::GameStatus;
use tokio::time::MissedTickBehavior;

/// One heartbeat's worth of counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Beat {
    pub(crate) players: usize,
    pub(crate) waiting: usize,
    pub(crate) status: GameStatus,
}

impl Beat {
    pub(crate) fn read(snapshot: &StatusSnapshot) -> Self {
        Self {
            players: snapshot.connected_players(),
            waiting: snapshot.players_waiting(),
            status: snapshot.status(),
        }
    }
}

/// Starts the heartbeat task. A zero interval disables it.
pub(crate) fn spawn(
    local_addr: String,
    snapshot: Arc<StatusSnapshot>,
    every: Duration,
) {
    if every.is_zero() {
        tracing::debug!("heartbeat disabled");
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;
            let beat = Beat::read(&snapshot);
            tracing::info!(
                node = %local_addr,
                players = beat.players,
                waiting = beat.waiting,
                status = %beat.status,
                "heartbeat"
            );
        }
    });
}
