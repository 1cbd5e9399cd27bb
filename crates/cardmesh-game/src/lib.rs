//! Game-level state for a cardmesh node.
//!
//! - [`GameState`]: the local hand status, the roster of known players,
//!   the waiting-player counter that drives the deal trigger, and the
//!   shuffle chain.
//! - [`DeckContributor`]: the seam where each node transforms the deck
//!   before passing it on. [`PlaintextDeck`] only shuffles.
//! - [`StatusSnapshot`]: lock-free counters published for the heartbeat
//!   and for handshakes that run outside the dispatch loop.
//!
//! Nothing here does I/O. State changes return the messages to send as
//! [`Outbound`] and the node delivers them.

mod deck;
mod error;
mod player;
mod snapshot;
mod state;

pub use deck::{DECK_SIZE, DeckContributor, PlaintextDeck, ShuffleContext};
pub use error::GameError;
pub use player::{Player, Roster};
pub use snapshot::StatusSnapshot;
pub use state::{GameState, Outbound};
