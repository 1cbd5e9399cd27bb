//! Envelope encoding with an explicit payload table.
//!
//! On the wire every message is a [`WireEnvelope`]: the sender's address,
//! a one-byte kind tag, and the payload body encoded on its own. Decoding
//! looks the tag up in a [`PayloadTable`] built once when the
//! [`EnvelopeCodec`] is created, so an unknown tag is a recoverable
//! [`ProtocolError::UnknownKind`] instead of a failed decode of the whole
//! frame.

use serde::{Deserialize, Serialize};

use crate::{
    Codec, EncryptedDeck, Envelope, Handshake, MessageKind, Payload, PeerList,
    PlayerStatus, ProtocolError,
};

/// The outer frame contents, before the body is interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub from: String,
    pub kind: u8,
    pub body: Vec<u8>,
}

/// Decodes one payload body with codec `C`.
pub type DecodeFn<C> = fn(&C, &[u8]) -> Result<Payload, ProtocolError>;

fn decode_handshake<C: Codec>(
    codec: &C,
    body: &[u8],
) -> Result<Payload, ProtocolError> {
    codec.decode::<Handshake>(body).map(Payload::Handshake)
}

fn decode_peer_list<C: Codec>(
    codec: &C,
    body: &[u8],
) -> Result<Payload, ProtocolError> {
    codec.decode::<PeerList>(body).map(Payload::PeerList)
}

fn decode_encrypted_deck<C: Codec>(
    codec: &C,
    body: &[u8],
) -> Result<Payload, ProtocolError> {
    codec.decode::<EncryptedDeck>(body).map(Payload::EncryptedDeck)
}

fn decode_player_status<C: Codec>(
    codec: &C,
    body: &[u8],
) -> Result<Payload, ProtocolError> {
    codec.decode::<PlayerStatus>(body).map(Payload::PlayerStatus)
}

/// Maps kind tags to the function that decodes that kind's body.
pub struct PayloadTable<C: Codec> {
    entries: Vec<(MessageKind, DecodeFn<C>)>,
}

impl<C: Codec> PayloadTable<C> {
    /// Builds the table of every payload kind this protocol version knows.
    pub fn new() -> Self {
        Self {
            entries: vec![
                (MessageKind::Handshake, decode_handshake::<C> as DecodeFn<C>),
                (MessageKind::PeerList, decode_peer_list::<C> as DecodeFn<C>),
                (MessageKind::EncryptedDeck, decode_encrypted_deck::<C> as DecodeFn<C>),
                (MessageKind::PlayerStatus, decode_player_status::<C> as DecodeFn<C>),
            ],
        }
    }

    /// Looks up the kind and decoder for a raw tag.
    pub fn lookup(&self, tag: u8) -> Option<(MessageKind, DecodeFn<C>)> {
        self.entries
            .iter()
            .find(|(kind, _)| kind.tag() == tag)
            .copied()
    }

    /// Every kind in the table.
    pub fn kinds(&self) -> impl Iterator<Item = MessageKind> + '_ {
        self.entries.iter().map(|(kind, _)| *kind)
    }
}

impl<C: Codec> Default for PayloadTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns [`Envelope`]s into frame bytes and back.
pub struct EnvelopeCodec<C: Codec> {
    codec: C,
    table: PayloadTable<C>,
}

impl<C: Codec> EnvelopeCodec<C> {
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            table: PayloadTable::new(),
        }
    }

    /// The inner codec.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Encodes an envelope. Callers broadcasting to many peers encode once
    /// and reuse the bytes.
    pub fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
        let body = match &envelope.payload {
            Payload::Handshake(hs) => self.codec.encode(hs)?,
            Payload::PeerList(list) => self.codec.encode(list)?,
            Payload::EncryptedDeck(deck) => self.codec.encode(deck)?,
            Payload::PlayerStatus(status) => self.codec.encode(status)?,
        };
        let wire = WireEnvelope {
            from: envelope.from.clone(),
            kind: envelope.payload.kind().tag(),
            body,
        };
        self.codec.encode(&wire)
    }

    /// Decodes one frame.
    ///
    /// # Errors
    /// - [`ProtocolError::Decode`] if the frame or body is malformed
    /// - [`ProtocolError::UnknownKind`] if the tag isn't in the table
    pub fn decode(&self, data: &[u8]) -> Result<Envelope, ProtocolError> {
        let wire: WireEnvelope = self.codec.decode(data)?;
        let (_, decode) = self
            .table
            .lookup(wire.kind)
            .ok_or(ProtocolError::UnknownKind(wire.kind))?;
        let payload = decode(&self.codec, &wire.body)?;
        Ok(Envelope {
            from: wire.from,
            payload,
        })
    }
}

impl<C: Codec + Default> Default for EnvelopeCodec<C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}
