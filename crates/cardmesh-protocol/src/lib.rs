//! Wire protocol for cardmesh.
//!
//! This crate defines the "language" that nodes speak to each other:
//!
//! - **Types** ([`Handshake`], [`PeerList`], [`EncryptedDeck`],
//!   [`PlayerStatus`], [`Envelope`]) — the messages that travel between
//!   nodes, plus the shared [`GameStatus`] and [`GameVariant`] vocabulary.
//! - **Codec** ([`Codec`] trait, [`BincodeCodec`], [`JsonCodec`]) — how
//!   values are converted to/from bytes.
//! - **Envelope codec** ([`EnvelopeCodec`], [`PayloadTable`]) — how a
//!   whole message is tagged with its kind and decoded through an explicit
//!   table of decoders.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between transport (framed bytes) and the node
//! (peers, gossip, game state). It doesn't know about connections — it
//! only knows how to serialize and deserialize messages.
//!
//! ```text
//! Transport (frames) → Protocol (Envelope) → Node (dispatch loop)
//! ```

mod codec;
mod envelope;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "binary")]
pub use codec::BincodeCodec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use envelope::{DecodeFn, EnvelopeCodec, PayloadTable, WireEnvelope};
pub use error::{BoxError, ProtocolError};
pub use types::{
    EncryptedDeck, Envelope, GameStatus, GameVariant, Handshake, MessageKind,
    Payload, PeerList, PlayerStatus, Recipient,
};
