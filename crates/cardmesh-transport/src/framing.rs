//! Length-delimited framing for stream connections.
//!
//! ```text
//! +------------------+------------------+
//! | Length (4B BE)   | Payload          |
//! +------------------+------------------+
//! ```
//!
//! The payload is whatever the protocol layer produced; this module only
//! knows about byte boundaries.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::TransportError;

/// Default upper bound on a single frame (4 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// Writes one frame: length prefix followed by `payload`.
pub async fn write_frame<W>(
    writer: &mut W,
    payload: &[u8],
    max_frame_len: usize,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > max_frame_len {
        return Err(TransportError::FrameTooLarge {
            size: payload.len(),
            max: max_frame_len,
        });
    }
    let len = u32::try_from(payload.len()).map_err(|_| {
        TransportError::FrameTooLarge {
            size: payload.len(),
            max: max_frame_len,
        }
    })?;

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);

    writer
        .write_all(&frame)
        .await
        .map_err(TransportError::SendFailed)?;
    writer.flush().await.map_err(TransportError::SendFailed)
}

/// Reads one frame. Returns `Ok(None)` when the stream ends cleanly on a
/// frame boundary.
pub async fn read_frame<R>(
    reader: &mut R,
    max_frame_len: usize,
) -> Result<Option<Vec<u8>>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        let n = reader
            .read(&mut header[filled..])
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(TransportError::ReceiveFailed(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("stream ended after {filled} header bytes"),
            )));
        }
        filled += n;
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > max_frame_len {
        return Err(TransportError::FrameTooLarge {
            size: len,
            max: max_frame_len,
        });
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(TransportError::ReceiveFailed)?;
    Ok(Some(payload))
}
