//! # cardmesh
//!
//! A peer-to-peer mesh node for turn-based card games.
//!
//! Nodes connect over TCP, agree on protocol version and game variant in
//! a handshake, discover each other through peer-list gossip, and drive a
//! shared hand status. When every connected player is waiting for cards,
//! the dealer starts a shuffle chain that passes the deck from player to
//! player.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cardmesh::prelude::*;
//!
//! # async fn start() -> Result<(), NodeError> {
//! let dealer = Node::builder()
//!     .listen("127.0.0.1:3000")
//!     .dealer(true)
//!     .build()
//!     .await?
//!     .spawn();
//!
//! let player = Node::builder().listen("127.0.0.1:4000").build().await?.spawn();
//! player.connect(dealer.listen_addr()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! The library only emits `tracing` events; installing a subscriber is up
//! to the binary.

mod config;
mod directory;
mod error;
mod gossip;
mod handle;
mod heartbeat;
mod outbox;
mod peer;
mod server;

pub use config::{NodeConfig, PROTOCOL_VERSION};
pub use error::NodeError;
pub use handle::NodeHandle;
pub use server::{Node, NodeBuilder};

pub use cardmesh_game::{
    DeckContributor, GameError, PlaintextDeck, Player, ShuffleContext,
};
pub use cardmesh_protocol::{
    BincodeCodec, Codec, EncryptedDeck, GameStatus, GameVariant, JsonCodec,
    Payload, PeerList, PlayerStatus, ProtocolError,
};
pub use cardmesh_transport::TransportError;

/// Everything needed to build and drive a node.
pub mod prelude {
    pub use crate::{
        DeckContributor, GameStatus, GameVariant, Node, NodeBuilder,
        NodeConfig, NodeError, NodeHandle, Payload, PlaintextDeck, Player,
        PlayerStatus,
    };
}
