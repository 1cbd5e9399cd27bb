//! Unified error type for a cardmesh node.

use cardmesh_game::GameError;
use cardmesh_protocol::{GameVariant, MessageKind, ProtocolError};
use cardmesh_transport::TransportError;

/// Top-level error that wraps the sub-crate errors plus the failures that
/// only make sense at the node level (handshake gate, dialing, a stopped
/// dispatch loop).
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Bind, dial, send, or receive failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame couldn't be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The game state machine rejected an operation.
    #[error(transparent)]
    Game(#[from] GameError),

    /// The remote speaks a different protocol version.
    #[error("protocol version mismatch: local {local}, remote {remote}")]
    VersionMismatch { local: String, remote: String },

    /// The remote plays a different game.
    #[error("game variant mismatch: local {local}, remote {remote}")]
    VariantMismatch {
        local: GameVariant,
        remote: GameVariant,
    },

    /// The remote didn't send its handshake in time.
    #[error("no handshake from {0} before the timeout")]
    HandshakeTimeout(String),

    /// The first message on a connection wasn't a handshake.
    #[error("expected {expected}, got {got}")]
    UnexpectedMessage {
        expected: MessageKind,
        got: MessageKind,
    },

    /// Dialed our own advertised address.
    #[error("refusing to connect to own address {0}")]
    SelfConnect(String),

    /// A dial that another caller started failed.
    #[error("connect to {addr} failed: {reason}")]
    ConnectFailed { addr: String, reason: String },

    /// The node's dispatch loop is no longer running.
    #[error("node is not running")]
    Unavailable,
}
