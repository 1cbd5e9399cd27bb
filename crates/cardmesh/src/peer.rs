//! Peers: the handshake that admits a connection, and the read loop that
//! runs once it is registered.
//!
//! A connection goes through three stages:
//!
//! 1. **Handshake.** Both ends send a [`Handshake`] as their first frame
//!    and then wait for the other's. Runs on the acceptor's or dialer's
//!    task, never on the dispatch loop.
//! 2. **Registration.** The dispatch loop files the connection in the
//!    peer directory under the remote's advertised address.
//! 3. **Read loop.** One task per peer decodes frames into the inbound
//!    queue. When it ends it reports the peer gone, exactly once. Writes
//!    go through the peer's [`Outbox`].

use std::sync::Arc;
use std::time::Duration;

use cardmesh_game::StatusSnapshot;
use cardmesh_protocol::{
    Codec, Envelope, EnvelopeCodec, GameVariant, Handshake, MessageKind,
    Payload,
};
use cardmesh_transport::{
    Connection, ConnectionId, Direction, TcpConnection, TransportError,
};
use tokio::sync::mpsc;

use crate::outbox::Outbox;
use crate::server::{InboundMessage, PeerGone};
use crate::NodeError;

// ---------------------------------------------------------------------------
// Peer
// ---------------------------------------------------------------------------

/// A registered, handshaken connection.
#[derive(Clone)]
pub(crate) struct Peer {
    addr: String,
    conn: Arc<TcpConnection>,
    outbox: Outbox,
}

impl Peer {
    /// Wraps a handshaken connection and starts its writer task.
    pub(crate) fn new(
        addr: String,
        conn: TcpConnection,
        write_timeout: Duration,
    ) -> Self {
        let conn = Arc::new(conn);
        let outbox = Outbox::spawn(addr.clone(), Arc::clone(&conn), write_timeout);
        Self { addr, conn, outbox }
    }

    /// The remote's advertised listen address.
    pub(crate) fn addr(&self) -> &str {
        &self.addr
    }

    pub(crate) fn conn(&self) -> &Arc<TcpConnection> {
        &self.conn
    }

    /// Queues an encoded message for this peer.
    pub(crate) fn send(&self, bytes: Arc<[u8]>) -> bool {
        self.outbox.push(bytes)
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.conn.id()
    }

    pub(crate) fn direction(&self) -> Direction {
        self.conn.direction()
    }

    /// Closes the connection without blocking the caller.
    pub(crate) fn close_in_background(&self) {
        let conn = Arc::clone(&self.conn);
        tokio::spawn(async move {
            let _ = conn.close().await;
        });
    }
}

/// A connection whose handshake succeeded but that the dispatch loop
/// hasn't registered yet.
pub(crate) struct PendingPeer {
    pub(crate) conn: TcpConnection,
    pub(crate) handshake: Handshake,
    /// The address we dialed, for outbound connections. May differ from
    /// `handshake.listen_addr`.
    pub(crate) dialed: Option<String>,
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// What a node needs to run handshakes off the dispatch loop.
pub(crate) struct Handshaker<C: Codec> {
    pub(crate) codec: Arc<EnvelopeCodec<C>>,
    pub(crate) local_addr: String,
    pub(crate) version: String,
    pub(crate) game_variant: GameVariant,
    pub(crate) snapshot: Arc<StatusSnapshot>,
    pub(crate) timeout: Duration,
}

impl<C: Codec> Handshaker<C> {
    /// Our handshake, carrying the status as of right now.
    pub(crate) fn local_handshake(&self) -> Handshake {
        Handshake {
            version: self.version.clone(),
            game_variant: self.game_variant,
            game_status: self.snapshot.status(),
            listen_addr: self.local_addr.clone(),
        }
    }

    /// Sends our handshake, then waits for and validates the remote's.
    ///
    /// The caller closes the connection on error.
    ///
    /// # Errors
    /// - [`NodeError::HandshakeTimeout`] if nothing arrives in time
    /// - [`NodeError::UnexpectedMessage`] if the first frame isn't a handshake
    /// - [`NodeError::VersionMismatch`] / [`NodeError::VariantMismatch`]
    ///   if the remote fails the compatibility gate
    pub(crate) async fn exchange(
        &self,
        conn: &TcpConnection,
    ) -> Result<Handshake, NodeError> {
        let ours = Envelope::new(
            self.local_addr.clone(),
            Payload::Handshake(self.local_handshake()),
        );
        let bytes = self.codec.encode(&ours)?;
        conn.send(&bytes).await?;

        let remote = conn.remote_addr().to_string();
        let data = match tokio::time::timeout(self.timeout, conn.recv()).await
        {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                return Err(TransportError::ConnectionClosed(format!(
                    "{remote} closed before handshake"
                ))
                .into());
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(NodeError::HandshakeTimeout(remote)),
        };

        let envelope = self.codec.decode(&data)?;
        let theirs = match envelope.payload {
            Payload::Handshake(hs) => hs,
            other => {
                return Err(NodeError::UnexpectedMessage {
                    expected: MessageKind::Handshake,
                    got: other.kind(),
                });
            }
        };
        self.validate(&theirs)?;

        tracing::debug!(
            %remote,
            listen_addr = %theirs.listen_addr,
            status = %theirs.game_status,
            "handshake complete"
        );
        Ok(theirs)
    }

    /// Dials `addr` and runs the handshake on the new connection.
    pub(crate) async fn dial(
        &self,
        addr: &str,
        dial_timeout: Duration,
        max_frame_len: usize,
    ) -> Result<(TcpConnection, Handshake), NodeError> {
        let conn =
            TcpConnection::connect(addr, dial_timeout, max_frame_len).await?;
        match self.exchange(&conn).await {
            Ok(handshake) => Ok((conn, handshake)),
            Err(e) => {
                let _ = conn.close().await;
                Err(e)
            }
        }
    }

    fn validate(&self, theirs: &Handshake) -> Result<(), NodeError> {
        if theirs.version != self.version {
            return Err(NodeError::VersionMismatch {
                local: self.version.clone(),
                remote: theirs.version.clone(),
            });
        }
        if theirs.game_variant != self.game_variant {
            return Err(NodeError::VariantMismatch {
                local: self.game_variant,
                remote: theirs.game_variant,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Read loop
// ---------------------------------------------------------------------------

/// Starts the read loop for a freshly registered peer.
pub(crate) fn spawn_read_loop<C: Codec>(
    peer: &Peer,
    codec: Arc<EnvelopeCodec<C>>,
    inbound: mpsc::Sender<InboundMessage>,
    gone: mpsc::Sender<PeerGone>,
) {
    let addr = peer.addr().to_string();
    let conn = Arc::clone(peer.conn());
    tokio::spawn(async move {
        read_loop(&addr, &conn, &codec, &inbound).await;
        let _ = conn.close().await;
        let _ = gone
            .send(PeerGone {
                addr,
                conn_id: conn.id(),
            })
            .await;
    });
}

async fn read_loop<C: Codec>(
    addr: &str,
    conn: &TcpConnection,
    codec: &EnvelopeCodec<C>,
    inbound: &mpsc::Sender<InboundMessage>,
) {
    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(%addr, "connection closed");
                return;
            }
            Err(e) => {
                tracing::debug!(%addr, error = %e, "recv failed");
                return;
            }
        };

        let envelope = match codec.decode(&data) {
            Ok(envelope) => envelope,
            Err(e) if e.is_recoverable() => {
                tracing::warn!(%addr, error = %e, "dropping message");
                continue;
            }
            Err(e) => {
                tracing::debug!(%addr, error = %e, "undecodable frame");
                return;
            }
        };

        let msg = InboundMessage {
            from: addr.to_string(),
            envelope,
        };
        if inbound.send(msg).await.is_err() {
            return;
        }
    }
}
