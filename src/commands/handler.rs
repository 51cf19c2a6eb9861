//! Database Dispatcher
//!
//! This module turns a raw request into a textual reply. It parses the
//! request into a typed [`Query`], routes on the query's [`CommandId`],
//! invokes the storage layer and renders the result.
//!
//! ## Responses
//!
//! | Request             | Reply                          |
//! |---------------------|--------------------------------|
//! | `SET <key> <value>` | `[OK]`                         |
//! | `GET <key>`         | `<value>` or `[error] not found` |
//! | `DEL <key>`         | `[OK]` (also for absent keys)  |
//! | anything else       | `[error] <reason>`             |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Database                             │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │   parse()   │───>│  dispatch() │───>│   render    │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                            │                                │
//! │                            ▼                                │
//! │                         Storage                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::protocol::{CommandId, ParseError, Parser, Query};
use crate::storage::{EngineStats, Storage};
use std::fmt::Display;
use tracing::{debug, trace};

/// Reply for successful writes.
pub const OK_RESPONSE: &str = "[OK]";

/// Prefix of every error reply.
pub const ERROR_PREFIX: &str = "[error] ";

/// Renders an error as a reply line.
fn error_response(err: impl Display) -> String {
    format!("{}{}", ERROR_PREFIX, err)
}

/// Dispatches requests to the storage layer.
///
/// Cheap to clone: the parser's table and the storage handle are shared.
#[derive(Debug, Clone)]
pub struct Database {
    parser: Parser,
    storage: Storage,
}

impl Database {
    /// Creates a dispatcher over the given parser and storage.
    pub fn new(parser: Parser, storage: Storage) -> Self {
        Self { parser, storage }
    }

    /// Handles one request and returns the reply.
    ///
    /// Never fails: every error is rendered into the reply text.
    pub fn handle_request(&self, request: &str) -> String {
        match self.parser.parse(request) {
            Ok(query) => self.dispatch(&query),
            Err(e) => {
                debug!(error = %e, "rejected request");
                error_response(e)
            }
        }
    }

    /// Handles one request received as raw bytes.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; such bytes can only
    /// ever form a key, a value or an unknown command name.
    pub fn handle_bytes(&self, request: &[u8]) -> String {
        self.handle_request(&String::from_utf8_lossy(request))
    }

    /// Counters of the underlying storage engine.
    pub fn stats(&self) -> EngineStats {
        self.storage.stats()
    }

    /// Routes a validated query to its handler.
    ///
    /// Each command matches on its own argument shape, so a table registered
    /// with a different arity yields an error reply rather than a panic.
    fn dispatch(&self, query: &Query) -> String {
        let args = query.arguments();
        trace!(command = %query.command_id(), args = args.len(), "dispatching");

        match (query.command_id(), args) {
            (CommandId::Set, [key, value]) => self.cmd_set(key, value),
            (CommandId::Get, [key]) => self.cmd_get(key),
            (CommandId::Del, [key]) => self.cmd_del(key),
            (CommandId::Unknown, _) => error_response(ParseError::InvalidCommand),
            (command, _) => {
                debug!(%command, args = args.len(), "argument shape does not match command");
                error_response(ParseError::InvalidArguments)
            }
        }
    }

    fn cmd_set(&self, key: &str, value: &str) -> String {
        self.storage.set(key, value);
        OK_RESPONSE.to_string()
    }

    fn cmd_get(&self, key: &str) -> String {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => error_response(e),
        }
    }

    fn cmd_del(&self, key: &str) -> String {
        self.storage.del(key);
        OK_RESPONSE.to_string()
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new(Parser::default(), Storage::default())
    }
}
