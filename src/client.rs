//! TCP Client
//!
//! A single-connection client for the text protocol: each [`TcpClient::send`]
//! performs exactly one write and one read. A reply that fills the whole read
//! buffer cannot be told apart from a truncated one, so it is reported as
//! [`ClientError::ResponseOverflow`].

use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    #[error("failed to {op}: {source}")]
    Io {
        op: &'static str,
        source: std::io::Error,
    },

    #[error("{op} deadline of {limit:?} exceeded")]
    Timeout { op: &'static str, limit: Duration },

    #[error("request of {size} bytes exceeds maximum message size of {max} bytes")]
    RequestTooLarge { size: usize, max: usize },

    #[error("response buffer overflow (max {max} bytes)")]
    ResponseOverflow { max: usize },

    #[error("connection closed by server")]
    Closed,
}

/// Client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Deadline for each write and each read; `None` waits forever
    pub idle_timeout: Option<Duration>,
    /// Read buffer size, which is also the maximum message size
    pub buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(300)),
            buffer_size: 4096,
        }
    }
}

/// A connected client.
pub struct TcpClient {
    stream: TcpStream,
    config: ClientConfig,
    buffer: Vec<u8>,
}

impl TcpClient {
    /// Connects to `address`.
    pub async fn connect(address: &str, config: ClientConfig) -> Result<Self, ClientError> {
        let connect = TcpStream::connect(address);
        let stream = match config.idle_timeout {
            Some(limit) => timeout(limit, connect).await.map_err(|_| ClientError::Timeout {
                op: "connect",
                limit,
            })?,
            None => connect.await,
        }
        .map_err(|source| ClientError::Connect {
            address: address.to_string(),
            source,
        })?;

        debug!(address, "connected");

        Ok(Self {
            stream,
            buffer: vec![0; config.buffer_size.max(1)],
            config,
        })
    }

    /// Sends one request and returns the single reply.
    pub async fn send(&mut self, request: &[u8]) -> Result<Bytes, ClientError> {
        let max = self.buffer.len();
        if request.len() >= max {
            return Err(ClientError::RequestTooLarge {
                size: request.len(),
                max,
            });
        }

        let idle_timeout = self.config.idle_timeout;

        let write = self.stream.write_all(request);
        let written = match idle_timeout {
            Some(limit) => timeout(limit, write).await.map_err(|_| ClientError::Timeout {
                op: "write",
                limit,
            })?,
            None => write.await,
        };
        written.map_err(|source| ClientError::Io { op: "write", source })?;

        let read = self.stream.read(&mut self.buffer);
        let n = match idle_timeout {
            Some(limit) => timeout(limit, read).await.map_err(|_| ClientError::Timeout {
                op: "read",
                limit,
            })?,
            None => read.await,
        }
        .map_err(|source| ClientError::Io { op: "read", source })?;

        trace!(sent = request.len(), received = n, "round trip");

        if n == 0 {
            return Err(ClientError::Closed);
        }
        if n == max {
            return Err(ClientError::ResponseOverflow { max });
        }

        Ok(Bytes::copy_from_slice(&self.buffer[..n]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Database;
    use crate::server::{ServerConfig, TcpServer};
    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;

    async fn start_server(buffer_size: usize) -> (String, CancellationToken) {
        let config = ServerConfig {
            address: "127.0.0.1:0".to_string(),
            buffer_size,
            ..ServerConfig::default()
        };
        let server = TcpServer::bind(config, Database::default()).await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let shutdown = CancellationToken::new();
        tokio::spawn(server.run(shutdown.clone()));
        (addr, shutdown)
    }

    #[tokio::test]
    async fn test_send_round_trips() {
        let (addr, shutdown) = start_server(4096).await;
        let mut client = TcpClient::connect(&addr, ClientConfig::default())
            .await
            .unwrap();

        assert_eq!(client.send(b"SET a 1").await.unwrap(), "[OK]");
        assert_eq!(client.send(b"GET a").await.unwrap(), "1");
        assert_eq!(client.send(b"DEL a").await.unwrap(), "[OK]");
        assert_eq!(client.send(b"GET a").await.unwrap(), "[error] not found");

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_request_too_large() {
        let (addr, shutdown) = start_server(4096).await;
        let config = ClientConfig {
            buffer_size: 8,
            ..ClientConfig::default()
        };
        let mut client = TcpClient::connect(&addr, config).await.unwrap();

        let err = client.send(b"SET key value").await.unwrap_err();
        assert!(matches!(err, ClientError::RequestTooLarge { size: 13, max: 8 }));

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_response_overflow() {
        let (addr, shutdown) = start_server(4096).await;

        let mut writer = TcpClient::connect(&addr, ClientConfig::default())
            .await
            .unwrap();
        let value = "v".repeat(32);
        writer
            .send(format!("SET big {}", value).as_bytes())
            .await
            .unwrap();

        let config = ClientConfig {
            buffer_size: 16,
            ..ClientConfig::default()
        };
        let mut reader = TcpClient::connect(&addr, config).await.unwrap();
        let err = reader.send(b"GET big").await.unwrap_err();
        assert!(matches!(err, ClientError::ResponseOverflow { max: 16 }));

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_closed_by_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            // Accept, read the request, hang up without replying
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf).await;
        });

        let mut client = TcpClient::connect(&addr, ClientConfig::default())
            .await
            .unwrap();
        let result = client.send(b"GET a").await;
        assert!(matches!(
            result,
            Err(ClientError::Closed) | Err(ClientError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = TcpClient::connect(&addr, ClientConfig::default()).await;
        assert!(matches!(result, Err(ClientError::Connect { .. })));
    }
}
