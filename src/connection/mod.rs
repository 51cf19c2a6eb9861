//! Connection Handler Module
//!
//! This module manages individual client connections to memkv.
//! Each client connection is handled by its own async task, so one slow or
//! idle client never holds up the others.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TcpServer                               │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept() + ceiling check
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read bytes  │───>│  Database   │───>│ Write reply │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Bounded**: The live connection count is capped by the server
//! - **Deadlines**: Every read and write is bounded by the idle timeout
//! - **Scoped Cleanup**: A guard releases the connection slot on every exit path
//! - **Statistics**: Tracks connection and request metrics

pub mod handler;

// Re-export commonly used types
pub use handler::{
    handle_connection, ConnectionContext, ConnectionError, ConnectionGuard, ConnectionHandler,
    ConnectionStats,
};
