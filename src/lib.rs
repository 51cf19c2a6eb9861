//! # memkv - An In-Memory Key-Value Store over TCP
//!
//! memkv keeps string keys and values in memory and serves them over a
//! plain-text TCP protocol: one socket read is one request, one socket write
//! is one reply.
//!
//! ## Features
//!
//! - **Bounded Connections**: A ceiling on live connections; extra sockets are
//!   closed immediately while the server keeps accepting
//! - **Idle Timeouts**: Every read and write carries a deadline
//! - **Graceful Shutdown**: Stop accepting, then drain live connections
//! - **Concurrent Storage**: One `RwLock` around one map, readers in parallel
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               memkv                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TcpServer   │───>│ Connection  │───>│  Database   │                  │
//! │  │ (Listener)  │    │  Handler    │    │ (dispatch)  │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                          ┌────────────────────┼──────────────┐          │
//! │                          ▼                                   ▼          │
//! │                   ┌─────────────┐                    ┌─────────────┐    │
//! │                   │   Parser    │                    │   Storage   │    │
//! │                   │ (protocol)  │                    │  (RwLock)   │    │
//! │                   └─────────────┘                    └─────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use memkv::commands::Database;
//! use memkv::server::{ServerConfig, TcpServer};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = TcpServer::bind(ServerConfig::default(), Database::default()).await?;
//!     let shutdown = CancellationToken::new();
//!
//!     let token = shutdown.clone();
//!     tokio::spawn(async move {
//!         memkv::server::shutdown_signal().await;
//!         token.cancel();
//!     });
//!
//!     server.run(shutdown).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Protocol
//!
//! ```text
//! SET <key> <value>   -> [OK]
//! GET <key>           -> <value> | [error] not found
//! DEL <key>           -> [OK]
//! anything else       -> [error] <reason>
//! ```
//!
//! Commands are case-sensitive. Replies carry no trailing delimiter.
//!
//! ## Module Overview
//!
//! - [`protocol`]: command table and request parser
//! - [`storage`]: concurrent in-memory engine
//! - [`commands`]: the dispatcher that turns requests into replies
//! - [`connection`]: per-connection read-dispatch-write loop
//! - [`server`]: listener, ceiling, shutdown
//! - [`client`] and [`cli`]: the interactive client
//! - [`config`] and [`logging`]: startup plumbing

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use client::{ClientConfig, ClientError, TcpClient};
pub use commands::Database;
pub use config::{Config, ConfigError};
pub use connection::{ConnectionError, ConnectionStats};
pub use protocol::{CommandId, CommandTable, ParseError, Parser, Query};
pub use server::{ServerConfig, ServerError, TcpServer};
pub use storage::{Engine, InMemoryEngine, Storage, StorageError};

/// Version of memkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
