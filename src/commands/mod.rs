//! Command Dispatch Module
//!
//! This module implements the command processing layer for memkv.
//! It receives raw requests, has them parsed, executes them against the
//! storage layer, and returns the textual reply.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │     Parser      │  (protocol module)
//! └────────┬────────┘
//!          │ Query
//!          ▼
//! ┌─────────────────┐
//! │    Database     │  (this module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Storage     │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value`
//! - `GET key`
//! - `DEL key`

pub mod handler;

// Re-export the dispatcher
pub use handler::{Database, ERROR_PREFIX, OK_RESPONSE};
