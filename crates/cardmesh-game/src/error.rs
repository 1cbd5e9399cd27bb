//! Error types for the game layer.

use cardmesh_protocol::GameStatus;

/// Errors that can occur while driving the game state machine.
///
/// All of these are recoverable: they describe a stale or out-of-order
/// message about one player, never a reason to stop the node.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// No player is registered under this advertised address.
    #[error("no player registered at {0}")]
    UnknownPlayer(String),

    /// A deck arrived while the local hand was past the shuffle phase.
    #[error("unexpected deck while {0}")]
    UnexpectedDeck(GameStatus),

    /// The requested status change isn't allowed from the current status.
    #[error("cannot advance from {0}")]
    InvalidTransition(GameStatus),

    /// The deck contributor rejected the incoming deck.
    #[error("deck contribution failed: {0}")]
    Contribute(String),
}
