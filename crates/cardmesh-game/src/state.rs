//! The per-node game state machine.
//!
//! `GameState` is owned by the node's dispatch loop and is only ever
//! touched from there, so it needs no locking. Every method that can
//! change state returns the messages the node must send as a result,
//! as `(Recipient, Payload)` pairs; the caller does the I/O.
//!
//! # Deal trigger
//!
//! A dealer starts a hand when every connected peer has reported
//! `WaitingForCards` and the local hand hasn't started yet:
//!
//! ```text
//! is_dealer && players_waiting == connected && status == WaitingForCards
//! ```
//!
//! `connected` is the peer directory's size, passed in by the caller.
//!
//! # Shuffle chain
//!
//! The dealer contributes first and hands the deck to the earliest-joined
//! connected player. Each recipient contributes and passes it on to the
//! next connected player that hasn't worked on it. The last contributor
//! moves to `Dealing` and announces it; every other contributor follows
//! when that announcement arrives.

use std::collections::HashSet;
use std::sync::Arc;

use cardmesh_protocol::{
    EncryptedDeck, GameStatus, Payload, PlayerStatus, Recipient,
};

use crate::{
    DeckContributor, GameError, Player, Roster, ShuffleContext,
    StatusSnapshot,
};

/// Messages a state change asks the node to send.
pub type Outbound = Vec<(Recipient, Payload)>;

/// Hand status, players, and the shuffle chain for one node.
pub struct GameState {
    local_addr: String,
    is_dealer: bool,
    status: GameStatus,
    players: Roster,
    /// Players observed at `WaitingForCards` since the hand began.
    players_waiting: usize,
    /// Addresses that have worked on the deck in flight.
    decks_received: HashSet<String>,
    contributor: Box<dyn DeckContributor>,
    snapshot: Arc<StatusSnapshot>,
}

impl GameState {
    /// Creates the state for a node advertising `local_addr`.
    pub fn new(
        local_addr: impl Into<String>,
        is_dealer: bool,
        contributor: impl DeckContributor,
    ) -> Self {
        Self::with_contributor(local_addr, is_dealer, Box::new(contributor))
    }

    /// Like [`new`](Self::new), for a contributor chosen at runtime.
    pub fn with_contributor(
        local_addr: impl Into<String>,
        is_dealer: bool,
        contributor: Box<dyn DeckContributor>,
    ) -> Self {
        Self {
            local_addr: local_addr.into(),
            is_dealer,
            status: GameStatus::WaitingForCards,
            players: Roster::new(),
            players_waiting: 0,
            decks_received: HashSet::new(),
            contributor,
            snapshot: Arc::new(StatusSnapshot::new()),
        }
    }

    /// A shared handle to the published counters.
    pub fn snapshot(&self) -> Arc<StatusSnapshot> {
        Arc::clone(&self.snapshot)
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn is_dealer(&self) -> bool {
        self.is_dealer
    }

    pub fn players_waiting(&self) -> usize {
        self.players_waiting
    }

    pub fn players(&self) -> &Roster {
        &self.players
    }

    pub fn decks_received(&self) -> &HashSet<String> {
        &self.decks_received
    }

    /// Publishes the directory size for snapshot readers.
    pub fn set_connected(&mut self, connected: usize) {
        self.snapshot.store_connected(connected);
    }

    /// Registers a player that just completed its handshake.
    ///
    /// A player already on the roster (a reconnect, or a duplicate
    /// connection) is updated in place and only counted again if it moves
    /// into `WaitingForCards` from some other status.
    pub fn add_player(
        &mut self,
        addr: &str,
        status: GameStatus,
        connected: usize,
    ) -> Outbound {
        match self.players.get_mut(addr) {
            Some(player) => {
                let previous = player.status;
                player.status = status;
                player.connected = true;
                if status == GameStatus::WaitingForCards
                    && previous != GameStatus::WaitingForCards
                {
                    self.players_waiting += 1;
                }
                tracing::info!(%addr, %status, "known player rejoined");
            }
            None => {
                self.players.insert(Player {
                    addr: addr.to_string(),
                    status,
                    connected: true,
                });
                if status == GameStatus::WaitingForCards {
                    self.players_waiting += 1;
                }
                tracing::info!(%addr, %status, "new player joined");
            }
        }
        self.snapshot.store_players_waiting(self.players_waiting);
        self.check_need_deal_cards(connected)
    }

    /// Marks a player's connection as closed.
    ///
    /// The player keeps its place on the roster and in the waiting count,
    /// but is skipped when choosing who receives the deck.
    pub fn player_departed(&mut self, addr: &str) {
        if let Some(player) = self.players.get_mut(addr) {
            player.connected = false;
            tracing::debug!(%addr, "player marked departed");
        }
    }

    /// Records a status reported by a registered player.
    ///
    /// A contributor still in `ReceivingCards` follows a peer into
    /// `Dealing`: that announcement means the shuffle chain is complete.
    ///
    /// # Errors
    /// [`GameError::UnknownPlayer`] if `addr` never joined.
    pub fn set_player_status(
        &mut self,
        addr: &str,
        status: GameStatus,
        connected: usize,
    ) -> Result<Outbound, GameError> {
        let player = self
            .players
            .get_mut(addr)
            .ok_or_else(|| GameError::UnknownPlayer(addr.to_string()))?;

        if status == GameStatus::WaitingForCards
            && player.status != GameStatus::WaitingForCards
        {
            self.players_waiting += 1;
        }
        player.status = status;
        tracing::debug!(%addr, %status, "player status updated");

        self.snapshot.store_players_waiting(self.players_waiting);

        if status == GameStatus::Dealing
            && self.status == GameStatus::ReceivingCards
            && self.decks_received.contains(&self.local_addr)
        {
            tracing::info!(%addr, "shuffle chain complete");
            return Ok(self.set_status(GameStatus::Dealing));
        }
        Ok(self.check_need_deal_cards(connected))
    }

    /// Starts the shuffle chain if this node is the dealer and every
    /// connected peer is waiting for cards.
    pub fn check_need_deal_cards(&mut self, connected: usize) -> Outbound {
        if !self.is_dealer || self.status != GameStatus::WaitingForCards {
            return Vec::new();
        }
        if self.players_waiting > connected {
            tracing::warn!(
                waiting = self.players_waiting,
                connected,
                "more players waiting than connected, not dealing"
            );
            return Vec::new();
        }
        if connected == 0 || self.players_waiting != connected {
            return Vec::new();
        }

        let Some(recipient) =
            self.players.first_connected(|_| true).map(|p| p.addr.clone())
        else {
            tracing::warn!("no connected player to receive the deck");
            return Vec::new();
        };

        let ctx = ShuffleContext {
            local_addr: &self.local_addr,
            status: self.status,
            contributors: &[],
        };
        let deck = match self.contributor.contribute(&ctx, Vec::new()) {
            Ok(deck) => deck,
            Err(e) => {
                tracing::error!(error = %e, "dealer could not build a deck");
                return Vec::new();
            }
        };

        tracing::info!(
            players = connected,
            %recipient,
            "all players waiting, dealing cards"
        );
        self.decks_received.insert(self.local_addr.clone());

        let mut out = self.set_status(GameStatus::ReceivingCards);
        out.push((
            Recipient::Player(recipient),
            Payload::EncryptedDeck(EncryptedDeck {
                deck,
                contributors: vec![self.local_addr.clone()],
            }),
        ));
        out
    }

    /// Handles a deck handed to us along the shuffle chain.
    ///
    /// The local contributor works on the deck once; it is then passed to
    /// the earliest-joined connected player that hasn't contributed. When
    /// nobody is left, the hand moves to `Dealing`.
    ///
    /// # Errors
    /// - [`GameError::UnexpectedDeck`] if the hand is past the shuffle
    /// - [`GameError::Contribute`] if the contributor rejects the deck
    pub fn receive_deck(
        &mut self,
        from: &str,
        deck: EncryptedDeck,
    ) -> Result<Outbound, GameError> {
        if !matches!(
            self.status,
            GameStatus::WaitingForCards | GameStatus::ReceivingCards
        ) {
            return Err(GameError::UnexpectedDeck(self.status));
        }

        let EncryptedDeck {
            deck: mut cards,
            mut contributors,
        } = deck;
        self.decks_received.insert(from.to_string());
        self.decks_received.extend(contributors.iter().cloned());

        let mut out = self.set_status(GameStatus::ReceivingCards);

        if !self.decks_received.contains(&self.local_addr) {
            let ctx = ShuffleContext {
                local_addr: &self.local_addr,
                status: self.status,
                contributors: &contributors,
            };
            cards = self.contributor.contribute(&ctx, cards)?;
            contributors.push(self.local_addr.clone());
            self.decks_received.insert(self.local_addr.clone());
        }

        let next = self
            .players
            .first_connected(|p| !self.decks_received.contains(&p.addr))
            .map(|p| p.addr.clone());

        match next {
            Some(next) => {
                tracing::info!(%from, %next, "passing deck along");
                out.push((
                    Recipient::Player(next),
                    Payload::EncryptedDeck(EncryptedDeck {
                        deck: cards,
                        contributors,
                    }),
                ));
            }
            None => {
                tracing::info!(
                    contributors = contributors.len(),
                    "every player contributed to the deck"
                );
                out.extend(self.set_status(GameStatus::Dealing));
            }
        }
        Ok(out)
    }

    /// Moves the local hand one step forward. From `River` this resets to
    /// `WaitingForCards` for the next hand.
    ///
    /// # Errors
    /// [`GameError::InvalidTransition`] while waiting for or receiving
    /// cards; those steps are driven by the shuffle chain.
    pub fn advance(&mut self, connected: usize) -> Result<Outbound, GameError> {
        match self.status {
            GameStatus::WaitingForCards | GameStatus::ReceivingCards => {
                Err(GameError::InvalidTransition(self.status))
            }
            GameStatus::River => Ok(self.reset_hand(connected)),
            current => Ok(self.set_status(current.next())),
        }
    }

    /// Starts a new hand: back to `WaitingForCards`, shuffle chain
    /// cleared, waiting players recounted from the roster.
    pub fn reset_hand(&mut self, connected: usize) -> Outbound {
        self.decks_received.clear();
        self.players_waiting =
            self.players.count_with(GameStatus::WaitingForCards);
        self.snapshot.store_players_waiting(self.players_waiting);

        let mut out = self.set_status(GameStatus::WaitingForCards);
        out.extend(self.check_need_deal_cards(connected));
        out
    }

    /// Sets the global status. A no-op if it's unchanged; otherwise the
    /// change is published and announced to every peer.
    pub fn set_status(&mut self, status: GameStatus) -> Outbound {
        if self.status == status {
            return Vec::new();
        }
        tracing::info!(from = %self.status, to = %status, "game status changed");
        self.status = status;
        self.snapshot.store_status(status);
        vec![(
            Recipient::All,
            Payload::PlayerStatus(PlayerStatus { status }),
        )]
    }
}
