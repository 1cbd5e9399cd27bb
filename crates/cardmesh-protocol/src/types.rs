//! Core protocol types for cardmesh's wire format.
//!
//! Every type here travels between nodes. The set of payloads is closed:
//! [`Payload`] lists every message a node can send, and [`MessageKind`]
//! gives each one the numeric tag that identifies it on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// GameVariant
// ---------------------------------------------------------------------------

/// The card game a node is configured to play.
///
/// A newtype over the raw `u8` code rather than a closed enum: two nodes
/// only need to agree on the code, and a node must be able to decode (and
/// then reject) a variant it has never heard of.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct GameVariant(pub u8);

impl GameVariant {
    /// Texas Hold'em.
    pub const TEXAS_HOLDEM: Self = Self(0);
    /// Any other game.
    pub const OTHER: Self = Self(1);
}

impl fmt::Display for GameVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::TEXAS_HOLDEM => write!(f, "Texas Hold'em"),
            Self::OTHER => write!(f, "Other"),
            Self(code) => write!(f, "Unknown({code})"),
        }
    }
}

// ---------------------------------------------------------------------------
// GameStatus
// ---------------------------------------------------------------------------

/// Where a node is in the current hand.
///
/// ```text
/// WaitingForCards → ReceivingCards → Dealing → PreFlop → Flop → Turn → River
///        ↑                                                              │
///        └──────────────────────────── next hand ───────────────────────┘
/// ```
///
/// Serialized as its `i32` code so the wire format doesn't depend on
/// variant names.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(into = "i32", try_from = "i32")]
pub enum GameStatus {
    #[default]
    WaitingForCards,
    ReceivingCards,
    Dealing,
    PreFlop,
    Flop,
    Turn,
    River,
}

impl GameStatus {
    /// The status that follows this one. `River` wraps to
    /// `WaitingForCards` to start the next hand.
    pub fn next(self) -> Self {
        match self {
            Self::WaitingForCards => Self::ReceivingCards,
            Self::ReceivingCards => Self::Dealing,
            Self::Dealing => Self::PreFlop,
            Self::PreFlop => Self::Flop,
            Self::Flop => Self::Turn,
            Self::Turn => Self::River,
            Self::River => Self::WaitingForCards,
        }
    }

    /// Returns the wire code for this status.
    pub fn code(self) -> i32 {
        self.into()
    }
}

impl From<GameStatus> for i32 {
    fn from(status: GameStatus) -> Self {
        match status {
            GameStatus::WaitingForCards => 0,
            GameStatus::ReceivingCards => 1,
            GameStatus::Dealing => 2,
            GameStatus::PreFlop => 3,
            GameStatus::Flop => 4,
            GameStatus::Turn => 5,
            GameStatus::River => 6,
        }
    }
}

impl TryFrom<i32> for GameStatus {
    type Error = ProtocolError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::WaitingForCards),
            1 => Ok(Self::ReceivingCards),
            2 => Ok(Self::Dealing),
            3 => Ok(Self::PreFlop),
            4 => Ok(Self::Flop),
            5 => Ok(Self::Turn),
            6 => Ok(Self::River),
            other => Err(ProtocolError::InvalidStatus(other)),
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WaitingForCards => "WAITING FOR CARDS",
            Self::ReceivingCards => "RECEIVING CARDS",
            Self::Dealing => "DEALING",
            Self::PreFlop => "PRE-FLOP",
            Self::Flop => "FLOP",
            Self::Turn => "TURN",
            Self::River => "RIVER",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Who should receive an outbound message, by advertised address.
///
/// The game state machine returns `(Recipient, Payload)` pairs; the
/// dispatch loop resolves them against the peer directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every registered peer.
    All,
    /// One peer.
    Player(String),
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// First message on every connection, sent by both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    /// Protocol version string. Must match exactly.
    pub version: String,
    /// Game variant code. Must match exactly.
    pub game_variant: GameVariant,
    /// The sender's global status at connection time.
    pub game_status: GameStatus,
    /// The address the sender listens on (what gossip publishes).
    pub listen_addr: String,
}

/// Advertised addresses of every peer the sender knows, minus the receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerList {
    pub peers: Vec<String>,
}

/// A deck moving along the shuffle chain.
///
/// The blocks are opaque here; only the deck contributor knows what they
/// mean. `contributors` lists every advertised address that has already
/// worked on this deck, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedDeck {
    pub deck: Vec<Vec<u8>>,
    pub contributors: Vec<String>,
}

/// A node announcing its new global status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub status: GameStatus,
}

/// Every message a node can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Handshake(Handshake),
    PeerList(PeerList),
    EncryptedDeck(EncryptedDeck),
    PlayerStatus(PlayerStatus),
}

impl Payload {
    /// The wire tag for this payload.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Handshake(_) => MessageKind::Handshake,
            Self::PeerList(_) => MessageKind::PeerList,
            Self::EncryptedDeck(_) => MessageKind::EncryptedDeck,
            Self::PlayerStatus(_) => MessageKind::PlayerStatus,
        }
    }
}

/// Numeric tag identifying a payload on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Handshake = 1,
    PeerList = 2,
    EncryptedDeck = 3,
    PlayerStatus = 4,
}

impl MessageKind {
    /// Returns the raw tag byte.
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Handshake => "Handshake",
            Self::PeerList => "PeerList",
            Self::EncryptedDeck => "EncryptedDeck",
            Self::PlayerStatus => "PlayerStatus",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A decoded message plus the advertised address of the node that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(from: impl Into<String>, payload: Payload) -> Self {
        Self {
            from: from.into(),
            payload,
        }
    }
}
