//! Byte relay between sockets.
//!
//! # Responsibilities
//! - Send the fully built outbound request to the origin
//! - Stream the origin response to the client through one bounded buffer
//!
//! # Design Decisions
//! - Read-then-write loop; a zero-length read is end of stream
//! - `write_all` absorbs partial writes
//! - Every read and write carries the idle deadline
//! - Errors end the session; nothing is retried or reported to the peer

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::resilience::deadline;

/// Relay buffer size used when none is configured.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Failure while moving bytes after forwarding began.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    #[error("no progress for {0:?}")]
    Idle(Duration),
}

/// Fixed-size scratch buffer reused for every read/write cycle.
#[derive(Debug)]
pub struct RelayBuffer {
    buf: Box<[u8]>,
}

impl RelayBuffer {
    /// A zero capacity is rounded up to one byte.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity.max(1)].into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl Default for RelayBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

/// Write `bytes` to `sink` in full and flush.
pub async fn send<W>(sink: &mut W, bytes: &[u8], idle: Duration) -> Result<(), RelayError>
where
    W: AsyncWrite + Unpin,
{
    deadline(
        idle,
        async {
            sink.write_all(bytes).await.map_err(RelayError::Write)?;
            sink.flush().await.map_err(RelayError::Write)
        },
        || RelayError::Idle(idle),
    )
    .await
}

/// Copy `source` into `sink` until `source` reaches end of stream.
///
/// Returns the number of bytes relayed.
pub async fn relay<R, W>(
    source: &mut R,
    sink: &mut W,
    buffer: &mut RelayBuffer,
    idle: Duration,
) -> Result<u64, RelayError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    loop {
        let n = deadline(
            idle,
            async { source.read(&mut buffer.buf).await.map_err(RelayError::Read) },
            || RelayError::Idle(idle),
        )
        .await?;

        if n == 0 {
            deadline(
                idle,
                async { sink.flush().await.map_err(RelayError::Write) },
                || RelayError::Idle(idle),
            )
            .await?;
            return Ok(total);
        }

        send_chunk(sink, &buffer.buf[..n], idle).await?;
        total += n as u64;
    }
}

async fn send_chunk<W>(sink: &mut W, chunk: &[u8], idle: Duration) -> Result<(), RelayError>
where
    W: AsyncWrite + Unpin,
{
    deadline(
        idle,
        async { sink.write_all(chunk).await.map_err(RelayError::Write) },
        || RelayError::Idle(idle),
    )
    .await
}
