//! Connection Handler Module
//!
//! This module handles individual client connections to memkv.
//! Each client gets its own handler task that runs in a loop,
//! reading a request and sending back exactly one reply.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! ACCEPTED ──> READING ──> DISPATCHING ──> WRITING ──┐
//!                 ▲                                   │
//!                 └───────────────────────────────────┘
//!
//! READING / WRITING ──> CLOSED on:
//!   - peer EOF
//!   - idle timeout elapsed while reading or writing
//!   - any I/O error
//!   - shutdown observed before the next read
//!   - a request that does not fit in the buffer
//! ```
//!
//! ## Buffer Management
//!
//! Each connection owns one fixed-size buffer of `buffer_size` bytes that is
//! reused for every read. One read is one request, so the buffer size is the
//! maximum request size. A read that fills the buffer completely is treated as
//! an oversized request: the client gets an error reply and the connection is
//! closed, since the rest of the payload would otherwise be read as a new
//! request.
//!
//! ## Teardown
//!
//! The [`ConnectionGuard`] held by every handler decrements the live
//! connection counter when it is dropped, so the counter is released on
//! every exit path, panics included.

use crate::commands::{Database, ERROR_PREFIX};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Statistics for connection handling.
///
/// `active_connections` doubles as the ceiling counter.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Connections closed immediately because the ceiling was reached
    pub connections_rejected: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicUsize,
    /// Total requests processed
    pub requests_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live connections.
    pub fn active(&self) -> usize {
        self.active_connections.load(Ordering::Acquire)
    }

    /// Registers a new connection unless `max_connections` are already live.
    ///
    /// The check and the increment are a single atomic update, so the
    /// ceiling is never exceeded by concurrent accepts.
    pub fn try_open(self: &Arc<Self>, max_connections: usize) -> Option<ConnectionGuard> {
        let opened = self
            .active_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < max_connections).then_some(active + 1)
            });

        match opened {
            Ok(previous) => {
                self.connections_accepted.fetch_add(1, Ordering::Relaxed);
                info!(active_connections = previous + 1, "new connection accepted");
                Some(ConnectionGuard {
                    stats: Arc::clone(self),
                })
            }
            Err(_) => {
                self.connections_rejected.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn request_processed(&self) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// A slot in the live connection count, released on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    stats: Arc<ConnectionStats>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let previous = self.stats.active_connections.fetch_sub(1, Ordering::AcqRel);
        info!(active_connections = previous - 1, "connection closed");
    }
}

/// Everything a connection needs from the server, cloned into each task.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub database: Database,
    pub stats: Arc<ConnectionStats>,
    pub shutdown: CancellationToken,
    /// Read and write deadline; `None` waits forever
    pub idle_timeout: Option<Duration>,
    /// Size of the read buffer, i.e. the maximum request size
    pub buffer_size: usize,
}

/// Handles a single client connection.
///
/// Generic over the stream so the state machine can be driven by any
/// `AsyncRead + AsyncWrite` transport.
pub struct ConnectionHandler<S> {
    /// The transport; dropped (closed) before the guard below
    stream: S,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Reusable request buffer
    buffer: Vec<u8>,

    ctx: ConnectionContext,

    _guard: ConnectionGuard,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a handler for an accepted connection.
    ///
    /// The guard ties the handler to its slot in the live connection count.
    pub fn new(stream: S, addr: SocketAddr, ctx: ConnectionContext, guard: ConnectionGuard) -> Self {
        Self {
            stream,
            addr,
            buffer: vec![0; ctx.buffer_size.max(1)],
            ctx,
            _guard: guard,
        }
    }

    /// Runs the read-dispatch-write loop until the connection ends.
    ///
    /// Consumes the handler: when this returns the socket is closed and the
    /// connection slot is released.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => debug!(client = %self.addr, "client disconnected"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    info!(client = %self.addr, "connection was closed by client")
                }
                ConnectionError::ReadTimeout(_) => {
                    info!(client = %self.addr, error = %e, "read timed out due to idle timeout")
                }
                ConnectionError::WriteTimeout(_) => {
                    info!(client = %self.addr, error = %e, "write timed out due to idle timeout")
                }
                ConnectionError::Shutdown => {
                    debug!(client = %self.addr, "closing connection for shutdown")
                }
                ConnectionError::Io { source, .. }
                    if source.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "connection error"),
            },
        }

        result
    }

    /// The main read-dispatch-write loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            // Cancellation is only observed between requests; a read already
            // in progress is bounded by the idle timeout instead.
            if self.ctx.shutdown.is_cancelled() {
                return Err(ConnectionError::Shutdown);
            }

            let n = self.read_request().await?;

            if n == self.buffer.len() {
                let max = self.buffer.len();
                let reply = format!(
                    "{}request exceeds maximum message size of {} bytes",
                    ERROR_PREFIX, max
                );
                self.send_response(&reply).await?;
                return Err(ConnectionError::MessageTooLarge { max });
            }

            let response = self.ctx.database.handle_bytes(&self.buffer[..n]);
            self.ctx.stats.request_processed();

            self.send_response(&response).await?;
        }
    }

    /// Reads one request into the buffer, returning its length.
    async fn read_request(&mut self) -> Result<usize, ConnectionError> {
        let read = self.stream.read(&mut self.buffer);

        let n = match self.ctx.idle_timeout {
            Some(limit) => timeout(limit, read)
                .await
                .map_err(|_| ConnectionError::ReadTimeout(limit))?,
            None => read.await,
        }
        .map_err(|source| ConnectionError::Io { op: "read", source })?;

        if n == 0 {
            return Err(ConnectionError::ClientDisconnected);
        }

        self.ctx.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "read request");

        Ok(n)
    }

    /// Writes the reply verbatim, with no added framing.
    async fn send_response(&mut self, response: &str) -> Result<(), ConnectionError> {
        let bytes = response.as_bytes();
        let idle_timeout = self.ctx.idle_timeout;
        let stream = &mut self.stream;
        let write = async move {
            stream.write_all(bytes).await?;
            stream.flush().await
        };

        let written = match idle_timeout {
            Some(limit) => timeout(limit, write)
                .await
                .map_err(|_| ConnectionError::WriteTimeout(limit))?,
            None => write.await,
        };
        written.map_err(|source| ConnectionError::Io { op: "write", source })?;

        self.ctx.stats.bytes_written(bytes.len());
        trace!(client = %self.addr, bytes = bytes.len(), "sent response");

        Ok(())
    }
}

/// Reasons a connection ends.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error on the socket
    #[error("failed to {op}: {source}")]
    Io {
        op: &'static str,
        source: std::io::Error,
    },

    /// Client closed its side of the connection
    #[error("client disconnected")]
    ClientDisconnected,

    /// No request arrived within the idle timeout
    #[error("read deadline of {0:?} exceeded")]
    ReadTimeout(Duration),

    /// The reply could not be written within the idle timeout
    #[error("write deadline of {0:?} exceeded")]
    WriteTimeout(Duration),

    /// A request filled the whole buffer
    #[error("request exceeds maximum message size of {max} bytes")]
    MessageTooLarge { max: usize },

    /// The server is shutting down
    #[error("server shutting down")]
    Shutdown,
}

/// Handles a client connection to completion.
///
/// The outcome has already been logged by [`ConnectionHandler::run`].
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    ctx: ConnectionContext,
    guard: ConnectionGuard,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, ctx, guard);
    if let Err(e) = handler.run().await {
        trace!(client = %addr, error = %e, "connection ended");
    }
}
