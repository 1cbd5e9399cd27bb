//! TCP transport: a listener plus framed, bidirectional connections.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, watch};

use crate::framing::{self, DEFAULT_MAX_FRAME_LEN};
use crate::{Connection, ConnectionId, Direction, Transport, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_connection_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// A TCP [`Transport`] that listens for incoming connections.
pub struct TcpTransport {
    listener: TcpListener,
    max_frame_len: usize,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "TCP transport listening");
        Ok(Self {
            listener,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        })
    }

    /// Sets the largest frame accepted on connections from this listener.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let conn = TcpConnection::from_stream(
            stream,
            addr,
            Direction::Inbound,
            self.max_frame_len,
        );
        tracing::debug!(id = %conn.id(), %addr, "accepted TCP connection");
        Ok(conn)
    }
}

/// A single framed TCP connection.
///
/// The read and write halves are locked independently so one task can sit
/// in [`recv`](Connection::recv) while others send.
pub struct TcpConnection {
    id: ConnectionId,
    remote_addr: SocketAddr,
    direction: Direction,
    max_frame_len: usize,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    closed: watch::Sender<bool>,
}

impl TcpConnection {
    /// Dials `addr`, giving up after `timeout`.
    pub async fn connect(
        addr: &str,
        timeout: Duration,
        max_frame_len: usize,
    ) -> Result<Self, TransportError> {
        let stream =
            match tokio::time::timeout(timeout, TcpStream::connect(addr))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(source)) => {
                    return Err(TransportError::DialFailed {
                        addr: addr.to_string(),
                        source,
                    });
                }
                Err(_) => {
                    return Err(TransportError::DialTimeout(addr.to_string()));
                }
            };

        let remote_addr =
            stream
                .peer_addr()
                .map_err(|source| TransportError::DialFailed {
                    addr: addr.to_string(),
                    source,
                })?;

        let conn = Self::from_stream(
            stream,
            remote_addr,
            Direction::Outbound,
            max_frame_len,
        );
        tracing::debug!(id = %conn.id, %remote_addr, "dialed TCP connection");
        Ok(conn)
    }

    fn from_stream(
        stream: TcpStream,
        remote_addr: SocketAddr,
        direction: Direction,
        max_frame_len: usize,
    ) -> Self {
        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();
        let (closed, _) = watch::channel(false);
        Self {
            id: next_connection_id(),
            remote_addr,
            direction,
            max_frame_len,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed,
        }
    }

    /// The socket address of the remote end.
    ///
    /// For inbound connections this is the remote's ephemeral port, not the
    /// address it listens on.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Whether this side accepted or dialed the connection.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns `true` once [`close`](Connection::close) has been called.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

impl Connection for TcpConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed(self.id.to_string()));
        }
        let mut writer = self.writer.lock().await;
        framing::write_frame(&mut *writer, data, self.max_frame_len).await
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Ok(None);
        }

        let mut reader = self.reader.lock().await;
        tokio::select! {
            frame = framing::read_frame(&mut *reader, self.max_frame_len) => frame,
            _ = closed.changed() => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        // send_replace never fails, even with no receivers.
        if self.closed.send_replace(true) {
            return Ok(());
        }
        use tokio::io::AsyncWriteExt;
        let mut writer = self.writer.lock().await;
        match writer.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(TransportError::SendFailed(e)),
        }
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
