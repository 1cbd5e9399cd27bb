//! Per-peer outbound queues.
//!
//! Every registered peer owns a writer task fed by an unbounded queue. The
//! dispatch loop encodes a message once and pushes the same bytes onto
//! each destination's queue, so a peer sees messages in the order the loop
//! produced them and a slow peer only ever delays itself.
//!
//! A write that doesn't finish within the write timeout closes the
//! connection. The peer's read loop then reports it gone.

use std::sync::Arc;
use std::time::Duration;

use cardmesh_transport::{Connection, TcpConnection};
use tokio::sync::mpsc;

/// Sender side of one peer's writer task.
#[derive(Clone)]
pub(crate) struct Outbox {
    tx: mpsc::UnboundedSender<Arc<[u8]>>,
}

impl Outbox {
    /// Starts the writer task for `conn`. It stops when every `Outbox`
    /// clone is dropped or a write fails.
    pub(crate) fn spawn(
        addr: String,
        conn: Arc<TcpConnection>,
        write_timeout: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(addr, conn, rx, write_timeout));
        Self { tx }
    }

    /// Queues one encoded message. Returns `false` if the writer has
    /// stopped.
    pub(crate) fn push(&self, bytes: Arc<[u8]>) -> bool {
        self.tx.send(bytes).is_ok()
    }
}

async fn write_loop(
    addr: String,
    conn: Arc<TcpConnection>,
    mut rx: mpsc::UnboundedReceiver<Arc<[u8]>>,
    write_timeout: Duration,
) {
    while let Some(bytes) = rx.recv().await {
        match tokio::time::timeout(write_timeout, conn.send(&bytes)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(%addr, error = %e, "delivery failed");
                break;
            }
            Err(_) => {
                tracing::warn!(
                    %addr,
                    timeout_ms = write_timeout.as_millis() as u64,
                    "peer stopped reading, closing connection"
                );
                let _ = conn.close().await;
                break;
            }
        }
    }
    tracing::debug!(%addr, "writer stopped");
}
