//! Players and the join-ordered roster.

use cardmesh_protocol::GameStatus;

/// One remote participant, keyed by its advertised address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub addr: String,
    pub status: GameStatus,
    /// `false` once the player's connection has closed. Departed players
    /// stay on the roster but are never handed the deck.
    pub connected: bool,
}

/// Every player this node has seen, in the order they joined.
///
/// Join order decides who receives the dealer's deck, so this is a single
/// ordered collection rather than a map plus a separate ordering list.
/// Meshes are small; lookups are linear.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    players: Vec<Player>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, addr: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.addr == addr)
    }

    pub fn get_mut(&mut self, addr: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.addr == addr)
    }

    /// Appends a player. Returns `false` (and changes nothing) if the
    /// address is already present.
    pub fn insert(&mut self, player: Player) -> bool {
        if self.get(&player.addr).is_some() {
            return false;
        }
        self.players.push(player);
        true
    }

    /// The earliest-joined player.
    pub fn first(&self) -> Option<&Player> {
        self.players.first()
    }

    /// The earliest-joined player that is still connected and matches
    /// `pred`.
    pub fn first_connected(
        &self,
        pred: impl Fn(&Player) -> bool,
    ) -> Option<&Player> {
        self.players.iter().find(|p| p.connected && pred(p))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    /// Number of players currently reporting `status`.
    pub fn count_with(&self, status: GameStatus) -> usize {
        self.players.iter().filter(|p| p.status == status).count()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// A copy of the roster, for callers outside the dispatch loop.
    pub fn to_vec(&self) -> Vec<Player> {
        self.players.clone()
    }
}
