//! Error types for the protocol layer.
//!
//! Each cardmesh crate defines its own error enum. A `ProtocolError`
//! always means the bytes were fine as bytes but could not be turned
//! into (or out of) a message.

/// Boxed error from whichever serialization backend a codec wraps.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] BoxError),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: truncated frames, missing fields, or a peer
    /// speaking a different codec.
    #[error("decode failed: {0}")]
    Decode(#[source] BoxError),

    /// The envelope decoded, but its kind tag is not in the payload table.
    ///
    /// Receivers log and drop these; they never tear down a connection.
    #[error("unknown message kind {0}")]
    UnknownKind(u8),

    /// A game status code outside the known range.
    #[error("invalid game status {0}")]
    InvalidStatus(i32),
}

impl ProtocolError {
    /// Returns `true` for errors that should drop one message but keep
    /// the connection alive.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnknownKind(_))
    }
}
