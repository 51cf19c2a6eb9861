//! Text Protocol Implementation
//!
//! This module implements the request side of memkv's wire protocol.
//!
//! ## Overview
//!
//! A request is the payload of exactly one socket read, interpreted as
//! whitespace-delimited tokens. The first token names the command:
//!
//! ```text
//! SET <key> <value>
//! GET <key>
//! DEL <key>
//! ```
//!
//! ## Modules
//!
//! - `types`: `CommandId`, the `CommandTable` and the typed `Query`
//! - `parser`: tokenizes and validates a request into a `Query`

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{ParseError, ParseResult, Parser};
pub use types::{CommandId, CommandTable, Query};
