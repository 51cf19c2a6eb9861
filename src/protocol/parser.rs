//! Request Parser
//!
//! This module turns one raw text request into a typed [`Query`].
//!
//! ## How the Parser Works
//!
//! 1. Split the request on runs of whitespace. No tokens → `EmptyRequest`.
//! 2. Look the first token up in the [`CommandTable`]. Miss → `InvalidCommand`.
//! 3. Compare the remaining token count with the registered arity.
//!    Mismatch → `InvalidArguments`.
//!
//! The arity check only runs after a successful lookup, so an unknown command
//! is always reported as such, whatever its arguments.
//!
//! Parsing has no side effects other than `debug!` diagnostics.

use crate::protocol::types::{CommandId, CommandTable, Query};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while parsing a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The request contained no tokens
    #[error("empty request")]
    EmptyRequest,

    /// The first token is not a registered command
    #[error("invalid command")]
    InvalidCommand,

    /// The argument count does not match the command's arity
    #[error("invalid arguments")]
    InvalidArguments,
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Parser for the whitespace-delimited command protocol.
///
/// # Example
///
/// ```
/// use memkv::protocol::{CommandId, CommandTable, ParseError, Parser};
///
/// let parser = Parser::new(CommandTable::default());
///
/// let query = parser.parse("GET key").unwrap();
/// assert_eq!(query.command_id(), CommandId::Get);
/// assert_eq!(query.arguments(), ["key"]);
///
/// assert_eq!(parser.parse("GET"), Err(ParseError::InvalidArguments));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Parser {
    table: CommandTable,
}

impl Parser {
    /// Creates a parser over the given command table.
    pub fn new(table: CommandTable) -> Self {
        Self { table }
    }

    /// Parses one request.
    pub fn parse(&self, request: &str) -> ParseResult<Query> {
        let mut tokens = request.split_whitespace();

        let Some(name) = tokens.next() else {
            debug!("empty request");
            return Err(ParseError::EmptyRequest);
        };

        let command = self.table.lookup(name);
        if command == CommandId::Unknown {
            debug!(query = request, "invalid command");
            return Err(ParseError::InvalidCommand);
        }

        let args: Vec<String> = tokens.map(str::to_string).collect();

        match self.table.arity(command) {
            Some(arity) if arity == args.len() => Ok(Query::new(command, args)),
            _ => {
                debug!(
                    query = request,
                    command = %command,
                    args = args.len(),
                    "invalid arguments for query"
                );
                Err(ParseError::InvalidArguments)
            }
        }
    }
}
