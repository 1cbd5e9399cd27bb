//! Node configuration.

use std::time::Duration;

use cardmesh_protocol::GameVariant;
use cardmesh_transport::DEFAULT_MAX_FRAME_LEN;
use serde::{Deserialize, Serialize};

/// The protocol version this build speaks by default.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// NodeConfig
// ---------------------------------------------------------------------------

/// Everything a node needs to know before it starts.
///
/// Missing fields fall back to [`NodeConfig::default`] when deserialized,
/// so a config file only has to name what it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Address the listener binds to.
    pub listen_addr: String,

    /// Address published in handshakes and gossip. Defaults to the
    /// address the listener actually bound, which matters when
    /// `listen_addr` uses port 0.
    pub advertise_addr: Option<String>,

    /// Protocol version string. Peers must match exactly.
    pub version: String,

    /// Game variant. Peers must match exactly.
    pub game_variant: GameVariant,

    /// Whether this node starts hands. Fixed for the node's lifetime.
    pub is_dealer: bool,

    /// Bound on establishing an outbound TCP connection.
    pub dial_timeout: Duration,

    /// Bound on receiving the remote's handshake once connected.
    pub handshake_timeout: Duration,

    /// Bound on writing one message to a peer. A peer that stops reading
    /// for longer is disconnected.
    pub write_timeout: Duration,

    /// How often the heartbeat logs the node's counters.
    pub heartbeat_interval: Duration,

    /// Largest frame accepted from a peer, in bytes.
    pub max_frame_len: usize,

    /// Capacity of each dispatch-loop queue.
    pub queue_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
            advertise_addr: None,
            version: PROTOCOL_VERSION.to_string(),
            game_variant: GameVariant::TEXAS_HOLDEM,
            is_dealer: false,
            dial_timeout: Duration::from_secs(3),
            handshake_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(5),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            queue_capacity: 256,
        }
    }
}
