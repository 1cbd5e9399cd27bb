//! The shuffle pipeline seam.
//!
//! Card dealing among mutually distrusting nodes ("mental poker") works by
//! passing the deck around so every player shuffles and encrypts it in
//! turn. The protocol for that is owned by the deck implementation; the
//! state machine only needs [`DeckContributor`] to transform the deck it
//! holds before handing it on.

use cardmesh_protocol::GameStatus;
use rand::seq::SliceRandom;

use crate::GameError;

/// What a contributor may know about the local node when it works on a
/// deck.
#[derive(Debug, Clone, Copy)]
pub struct ShuffleContext<'a> {
    /// The local node's advertised address.
    pub local_addr: &'a str,
    /// The local node's status when the deck arrived.
    pub status: GameStatus,
    /// Addresses that already worked on this deck, in order. Empty when
    /// the dealer starts a new chain.
    pub contributors: &'a [String],
}

/// One node's step in the shuffle chain.
pub trait DeckContributor: Send + 'static {
    /// Takes the incoming deck (empty for the dealer's first step) and
    /// returns the deck to pass on.
    fn contribute(
        &mut self,
        ctx: &ShuffleContext<'_>,
        incoming: Vec<Vec<u8>>,
    ) -> Result<Vec<Vec<u8>>, GameError>;
}

/// Number of cards in a standard deck.
pub const DECK_SIZE: usize = 52;

/// Placeholder contributor: cards travel in the clear as `[suit, rank]`
/// blocks and each step only shuffles.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextDeck;

impl PlaintextDeck {
    /// A fresh, ordered deck: suits 0–3, ranks 1–13.
    pub fn fresh() -> Vec<Vec<u8>> {
        (0u8..4)
            .flat_map(|suit| (1u8..=13).map(move |rank| vec![suit, rank]))
            .collect()
    }
}

impl DeckContributor for PlaintextDeck {
    fn contribute(
        &mut self,
        ctx: &ShuffleContext<'_>,
        incoming: Vec<Vec<u8>>,
    ) -> Result<Vec<Vec<u8>>, GameError> {
        let mut deck = if incoming.is_empty() {
            Self::fresh()
        } else {
            incoming
        };
        if deck.len() != DECK_SIZE {
            return Err(GameError::Contribute(format!(
                "expected {DECK_SIZE} cards, got {}",
                deck.len()
            )));
        }
        deck.shuffle(&mut rand::rng());
        tracing::debug!(
            local = ctx.local_addr,
            step = ctx.contributors.len() + 1,
            "shuffled deck"
        );
        Ok(deck)
    }
}
