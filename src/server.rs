//! TCP Server
//!
//! Owns the listener and the accept loop. For each accepted socket it checks
//! the connection ceiling, then spawns a [`ConnectionHandler`] task.
//!
//! ## Ceiling Policy
//!
//! When `max_connections` connections are live, a newly accepted socket is
//! closed immediately and the loop keeps accepting. Slots free up as soon as
//! existing connections end.
//!
//! ## Shutdown
//!
//! ```text
//! shutdown.cancel()
//!       │
//!       ▼
//! accept loop exits ──> listener dropped (no new connections)
//!       │
//!       ▼
//! TaskTracker::wait() ──> every connection finishes its current
//!                         request and sees the token before its next read
//! ```
//!
//! In-flight connections are never aborted. A connection blocked in a read
//! unblocks when its idle timeout fires, so drain time is bounded by the
//! idle timeout.
//!
//! [`ConnectionHandler`]: crate::connection::ConnectionHandler

use crate::commands::Database;
use crate::connection::{handle_connection, ConnectionContext, ConnectionStats};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// First pause after a failed `accept`.
const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(10);

/// Longest pause between retries of a failing `accept`.
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause before retrying after `consecutive_failures` failed accepts in a row.
///
/// Doubles from [`ACCEPT_BACKOFF_BASE`] and saturates at [`ACCEPT_BACKOFF_MAX`].
fn accept_backoff(consecutive_failures: u32) -> Duration {
    let exponent = consecutive_failures.saturating_sub(1).min(16);
    ACCEPT_BACKOFF_BASE
        .saturating_mul(1 << exponent)
        .min(ACCEPT_BACKOFF_MAX)
}

/// Errors raised while constructing the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid server configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },
}

/// Validated settings for [`TcpServer::bind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on
    pub address: String,
    /// Ceiling on simultaneously live connections
    pub max_connections: usize,
    /// Read/write deadline per connection; `None` disables it
    pub idle_timeout: Option<Duration>,
    /// Per-connection buffer size, which is also the maximum request size
    pub buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            max_connections: 100,
            idle_timeout: Some(Duration::from_secs(300)),
            buffer_size: 4 << 10,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.address.trim().is_empty() {
            return Err(ServerError::InvalidConfig("address is empty".into()));
        }
        if self.max_connections == 0 {
            return Err(ServerError::InvalidConfig(
                "max_connections must be at least 1".into(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(ServerError::InvalidConfig(
                "buffer_size must be at least 1".into(),
            ));
        }
        if self.idle_timeout == Some(Duration::ZERO) {
            return Err(ServerError::InvalidConfig(
                "idle_timeout must be positive; use None to disable it".into(),
            ));
        }
        Ok(())
    }
}

/// The TCP front end of the database.
pub struct TcpServer {
    listener: TcpListener,
    config: ServerConfig,
    database: Database,
    stats: Arc<ConnectionStats>,
}

impl TcpServer {
    /// Validates `config` and binds the listener.
    pub async fn bind(config: ServerConfig, database: Database) -> Result<Self, ServerError> {
        config.validate()?;

        let listener =
            TcpListener::bind(&config.address)
                .await
                .map_err(|source| ServerError::Bind {
                    address: config.address.clone(),
                    source,
                })?;

        Ok(Self {
            listener,
            config,
            database,
            stats: Arc::new(ConnectionStats::new()),
        })
    }

    /// The address actually bound, useful with port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared connection statistics.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Serves connections until `shutdown` is cancelled, then drains.
    pub async fn run(self, shutdown: CancellationToken) {
        let TcpServer {
            listener,
            config,
            database,
            stats,
        } = self;

        let tracker = TaskTracker::new();
        let ctx = ConnectionContext {
            database,
            stats: Arc::clone(&stats),
            shutdown: shutdown.clone(),
            idle_timeout: config.idle_timeout,
            buffer_size: config.buffer_size,
        };

        info!(
            address = %config.address,
            max_connections = config.max_connections,
            idle_timeout = ?config.idle_timeout,
            buffer_size = config.buffer_size,
            "server listening"
        );

        let mut accept_failures: u32 = 0;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("shutdown signal received, stopping accept loop");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        accept_failures = 0;

                        let Some(guard) = stats.try_open(config.max_connections) else {
                            warn!(
                                client = %addr,
                                active_connections = stats.active(),
                                max_connections = config.max_connections,
                                "max connections reached, rejecting connection"
                            );
                            drop(stream);
                            continue;
                        };

                        tracker.spawn(handle_connection(stream, addr, ctx.clone(), guard));
                    }
                    Err(e) => {
                        accept_failures = accept_failures.saturating_add(1);
                        let backoff = accept_backoff(accept_failures);
                        error!(
                            error = %e,
                            backoff_ms = backoff.as_millis() as u64,
                            "failed to accept connection"
                        );

                        tokio::select! {
                            biased;

                            _ = shutdown.cancelled() => {
                                info!("shutdown signal received, stopping accept loop");
                                break;
                            }
                            _ = tokio::time::sleep(backoff) => {}
                        }
                    }
                },
            }
        }

        // Stop accepting before waiting on the connections already running
        drop(listener);
        tracker.close();

        info!(active_connections = tracker.len(), "waiting for connections to drain");
        tracker.wait().await;
        info!("server shutdown complete");
    }
}

/// Resolves on Ctrl+C, or on SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::task::JoinHandle;

    struct TestServer {
        addr: SocketAddr,
        stats: Arc<ConnectionStats>,
        shutdown: CancellationToken,
        handle: JoinHandle<()>,
    }

    async fn start_server(config: ServerConfig) -> TestServer {
        let server = TcpServer::bind(config, Database::default()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let stats = server.stats();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.run(shutdown.clone()));

        TestServer {
            addr,
            stats,
            shutdown,
            handle,
        }
    }

    fn test_config() -> ServerConfig {
        ServerConfig {
            address: "127.0.0.1:0".to_string(),
            max_connections: 100,
            idle_timeout: Some(Duration::from_secs(5)),
            buffer_size: 4096,
        }
    }

    async fn request(client: &mut TcpStream, req: &[u8]) -> String {
        client.write_all(req).await.unwrap();
        let mut buf = [0u8; 4096];
        let n = client.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    async fn wait_for_active(stats: &ConnectionStats, expected: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while stats.active() != expected {
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {} active connections, have {}",
                expected,
                stats.active()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[test]
    fn test_accept_backoff_doubles_and_saturates() {
        assert_eq!(accept_backoff(1), Duration::from_millis(10));
        assert_eq!(accept_backoff(2), Duration::from_millis(20));
        assert_eq!(accept_backoff(4), Duration::from_millis(80));
        assert_eq!(accept_backoff(7), Duration::from_millis(640));
        assert_eq!(accept_backoff(8), ACCEPT_BACKOFF_MAX);
        assert_eq!(accept_backoff(u32::MAX), ACCEPT_BACKOFF_MAX);
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.address, "localhost:8080");
        assert_eq!(config.max_connections, 100);
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.buffer_size, 4096);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = ServerConfig {
            max_connections: 0,
            ..test_config()
        };
        let result = TcpServer::bind(config, Database::default()).await;
        assert!(matches!(result, Err(ServerError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let config = ServerConfig {
            address: "not an address".to_string(),
            ..test_config()
        };
        let result = TcpServer::bind(config, Database::default()).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_end_to_end() {
        let server = start_server(test_config()).await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        assert_eq!(request(&mut client, b"SET a 1\n").await, "[OK]");
        assert_eq!(request(&mut client, b"GET a\n").await, "1");
        assert_eq!(request(&mut client, b"DEL a\n").await, "[OK]");
        assert_eq!(request(&mut client, b"GET a\n").await, "[error] not found");
    }

    #[tokio::test]
    async fn test_connections_share_storage() {
        let server = start_server(test_config()).await;
        let mut writer = TcpStream::connect(server.addr).await.unwrap();
        let mut reader = TcpStream::connect(server.addr).await.unwrap();

        assert_eq!(request(&mut writer, b"SET shared hello").await, "[OK]");
        assert_eq!(request(&mut reader, b"GET shared").await, "hello");
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let server = start_server(test_config()).await;
        assert_eq!(server.stats.active(), 0);

        let mut client = TcpStream::connect(server.addr).await.unwrap();
        assert_eq!(request(&mut client, b"SET k v").await, "[OK]");
        assert_eq!(server.stats.active(), 1);

        drop(client);
        wait_for_active(&server.stats, 0).await;
        assert_eq!(
            server
                .stats
                .requests_processed
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn test_ceiling_rejects_and_keeps_accepting() {
        let config = ServerConfig {
            max_connections: 2,
            ..test_config()
        };
        let server = start_server(config).await;

        let mut first = TcpStream::connect(server.addr).await.unwrap();
        let mut second = TcpStream::connect(server.addr).await.unwrap();
        assert_eq!(request(&mut first, b"SET a 1").await, "[OK]");
        assert_eq!(request(&mut second, b"GET a").await, "1");

        // The third connection is closed without being served
        let mut third = TcpStream::connect(server.addr).await.unwrap();
        let _ = third.write_all(b"GET a").await;
        let mut buf = [0u8; 64];
        match tokio::time::timeout(Duration::from_secs(5), third.read(&mut buf)).await {
            Ok(Ok(n)) => assert_eq!(n, 0, "rejected connection was served"),
            Ok(Err(_)) => {} // reset by peer
            Err(_) => panic!("rejected connection was left open"),
        }

        // Once a slot frees up new connections are served again
        drop(first);
        wait_for_active(&server.stats, 1).await;

        let mut fourth = TcpStream::connect(server.addr).await.unwrap();
        assert_eq!(request(&mut fourth, b"GET a").await, "1");
        assert_eq!(server.stats.active(), 2);
    }

    #[tokio::test]
    async fn test_idle_connection_is_closed() {
        let config = ServerConfig {
            idle_timeout: Some(Duration::from_millis(200)),
            ..test_config()
        };
        let server = start_server(config).await;

        let mut client = TcpStream::connect(server.addr).await.unwrap();
        let mut buf = [0u8; 64];
        let read = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
            .await
            .expect("server did not close the idle connection");

        assert!(matches!(read, Ok(0) | Err(_)));
        wait_for_active(&server.stats, 0).await;
    }

    #[tokio::test]
    async fn test_oversized_request_reports_error() {
        let config = ServerConfig {
            buffer_size: 16,
            ..test_config()
        };
        let server = start_server(config).await;

        let mut client = TcpStream::connect(server.addr).await.unwrap();
        let reply = request(&mut client, b"SET key a-value-that-is-too-long").await;
        assert_eq!(
            reply,
            "[error] request exceeds maximum message size of 16 bytes"
        );
    }

    #[tokio::test]
    async fn test_graceful_shutdown_drains_connections() {
        let config = ServerConfig {
            idle_timeout: Some(Duration::from_millis(300)),
            ..test_config()
        };
        let server = start_server(config).await;

        let mut client = TcpStream::connect(server.addr).await.unwrap();
        assert_eq!(request(&mut client, b"SET a 1").await, "[OK]");

        server.shutdown.cancel();

        // The live connection unblocks through its idle timeout, then the
        // server returns
        tokio::time::timeout(Duration::from_secs(5), server.handle)
            .await
            .expect("server did not drain")
            .unwrap();

        assert_eq!(server.stats.active(), 0);
        assert!(TcpStream::connect(server.addr).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_clients_disjoint_keys() {
        let server = start_server(test_config()).await;

        let clients: Vec<_> = (0..16)
            .map(|i| {
                let addr = server.addr;
                tokio::spawn(async move {
                    let mut client = TcpStream::connect(addr).await.unwrap();
                    for j in 0..20 {
                        let key = format!("key-{}-{}", i, j);
                        let set = format!("SET {} value-{}-{}", key, i, j);
                        assert_eq!(request(&mut client, set.as_bytes()).await, "[OK]");
                        let get = format!("GET {}", key);
                        assert_eq!(
                            request(&mut client, get.as_bytes()).await,
                            format!("value-{}-{}", i, j)
                        );
                    }
                })
            })
            .collect();

        for client in clients {
            client.await.unwrap();
        }
    }
}
