//! `StreamPump`: the async task that moves bytes between a child's pipe end and whatever
//! [`Endpoint`] it is connected to.
//!
//! A pump is deadlock-free by construction: each standard stream gets its own task (so a
//! child that fills its stdout pipe while waiting for stdin never stalls the stdin
//! writer), and `PipelineCommand` connects one command's stdout pipe directly to the next
//! command's stdin pipe without routing bytes through a pump at all. Grounded on the
//! teacher's `communicate.rs` (the Unix `poll()`-loop and the Windows parallel-thread
//! strategies for servicing multiple pipes without deadlocking), reimagined as `tokio`
//! tasks instead of OS threads.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result, StdStream};
use crate::redirection::Endpoint;

/// How a pump should treat the bytes flowing through it.
pub enum PumpMode {
    /// Copy bytes straight through without retaining them (pass-through / backpressure
    /// mode): the reader only advances as fast as the writer drains.
    PassThrough,
    /// Retain a copy of every byte seen, up to `limit` (`None` = unbounded), in addition to
    /// passing it along. Used by `.capture()`-style helpers.
    Buffer { limit: Option<usize> },
    /// Read and discard: used for a stream that the caller never reads but wants
    /// drained so the child doesn't block on a full pipe.
    Discard,
}

/// A running (or finished) stream pump.
pub struct StreamPump {
    handle: JoinHandle<Result<Vec<u8>>>,
}

impl StreamPump {
    /// Spawns a task pumping `src` into `dst`, honoring `mode`.
    ///
    /// `which` identifies the standard stream this pump serves, purely for diagnostics.
    pub fn spawn<R, W>(which: StdStream, mut src: R, mut dst: W, mode: PumpMode) -> StreamPump
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut buf = [0u8; 8192];
            let mut collected = Vec::new();
            loop {
                let n = src
                    .read(&mut buf)
                    .await
                    .map_err(Error::PumpSourceFailed)?;
                if n == 0 {
                    break;
                }
                match &mode {
                    PumpMode::PassThrough => {
                        dst.write_all(&buf[..n]).await.map_err(Error::PumpSinkFailed)?;
                    }
                    PumpMode::Buffer { limit } => {
                        dst.write_all(&buf[..n]).await.map_err(Error::PumpSinkFailed)?;
                        if limit.is_none_or(|l| collected.len() < l) {
                            let room = limit.map(|l| l - collected.len()).unwrap_or(n);
                            collected.extend_from_slice(&buf[..n.min(room)]);
                        }
                    }
                    PumpMode::Discard => {}
                }
            }
            dst.flush().await.map_err(Error::PumpSinkFailed)?;
            debug!(stream = %which, bytes = collected.len(), "pump finished");
            Ok(collected)
        });
        StreamPump { handle }
    }

    /// Spawns a pump that copies bytes from `src` into a shared collection buffer,
    /// grounded on the `Endpoint::Collection` capture target.
    pub fn spawn_into_collection<R>(
        which: StdStream,
        mut src: R,
        collection: Arc<Mutex<Vec<u8>>>,
        limit: Option<usize>,
    ) -> StreamPump
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut buf = [0u8; 8192];
            loop {
                let n = src
                    .read(&mut buf)
                    .await
                    .map_err(Error::PumpSourceFailed)?;
                if n == 0 {
                    break;
                }
                let mut collected = collection.lock().await;
                if limit.is_none_or(|l| collected.len() < l) {
                    let room = limit.map(|l| l - collected.len()).unwrap_or(n);
                    collected.extend_from_slice(&buf[..n.min(room)]);
                } else {
                    warn!(stream = %which, "dropping pump bytes past configured buffer cap");
                }
            }
            Ok(Vec::new())
        });
        StreamPump { handle }
    }

    /// Spawns a pump that discards everything read from `src`. Used to drain a stream the
    /// caller redirected but never reads, so the child cannot block on a full pipe.
    pub fn spawn_discard<R>(which: StdStream, src: R) -> StreamPump
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        Self::spawn(which, src, tokio::io::sink(), PumpMode::Discard)
    }

    /// Spawns a pump that feeds a fixed [`Endpoint`] into `dst` and then closes `dst` so
    /// the child observes EOF on its end of the pipe.
    pub fn spawn_from_endpoint<W>(endpoint: Endpoint, mut dst: W) -> StreamPump
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let bytes = match endpoint {
                Endpoint::Bytes(b) => b,
                Endpoint::Text(s) => s.into_bytes(),
                Endpoint::Lines(lines) => {
                    let mut buf = Vec::new();
                    for line in lines {
                        buf.extend_from_slice(line.as_bytes());
                        buf.push(b'\n');
                    }
                    buf
                }
                Endpoint::FilePath(path) => tokio::fs::read(&path)
                    .await
                    .map_err(Error::PumpSourceFailed)?,
                Endpoint::Reader(mut reader) => {
                    let mut buf = Vec::new();
                    reader
                        .read_to_end(&mut buf)
                        .await
                        .map_err(Error::PumpSourceFailed)?;
                    buf
                }
                Endpoint::Writer(_) | Endpoint::Collection(_) => {
                    return Err(Error::StreamRedirected {
                        stream: StdStream::Stdin,
                        destination: "a write-only endpoint".into(),
                    });
                }
            };
            dst.write_all(&bytes).await.map_err(Error::PumpSinkFailed)?;
            dst.flush().await.map_err(Error::PumpSinkFailed)?;
            // Dropping `dst` here closes the pipe, signaling EOF to the child's stdin.
            drop(dst);
            Ok(Vec::new())
        });
        StreamPump { handle }
    }

    /// Awaits the pump's completion, returning any buffered bytes it collected.
    pub async fn join(self) -> Result<Vec<u8>> {
        match self.handle.await {
            Ok(result) => result,
            Err(join_err) => Err(Error::Io(std::io::Error::other(join_err))),
        }
    }

    /// Aborts the pump task without awaiting it, used when a command is being torn down
    /// early (timeout/cancellation) and the pump's own result no longer matters.
    pub fn abort(&self) {
        self.handle.abort();
    }
}
