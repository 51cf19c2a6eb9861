//! Command Types
//!
//! This module defines the values the parser produces: the [`CommandId`]
//! enumeration, the immutable [`CommandTable`] mapping names to ids and ids
//! to arity, and the typed [`Query`].
//!
//! ## Command Table
//!
//! | Name  | Id    | Arity | Shape               |
//! |-------|-------|-------|---------------------|
//! | `SET` | Set   | 2     | `SET <key> <value>` |
//! | `GET` | Get   | 1     | `GET <key>`         |
//! | `DEL` | Del   | 1     | `DEL <key>`         |
//!
//! Names are matched exactly: `get` is not `GET`.

use std::collections::HashMap;
use std::fmt;

/// Identifier of a recognized command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    /// Sentinel for unrecognized names. Never carried by a parsed [`Query`].
    Unknown,
    Set,
    Get,
    Del,
}

impl CommandId {
    /// The wire name of this command.
    pub fn name(&self) -> &'static str {
        match self {
            CommandId::Unknown => "UNKNOWN",
            CommandId::Set => "SET",
            CommandId::Get => "GET",
            CommandId::Del => "DEL",
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable command registry, built once at startup and handed to the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTable {
    ids: HashMap<&'static str, CommandId>,
    arity: HashMap<CommandId, usize>,
}

impl CommandTable {
    /// Builds a table from `(id, arity)` pairs. Names come from [`CommandId::name`].
    ///
    /// `CommandId::Unknown` entries are ignored.
    pub fn new(commands: impl IntoIterator<Item = (CommandId, usize)>) -> Self {
        let mut ids = HashMap::new();
        let mut arity = HashMap::new();

        for (id, args) in commands {
            if id == CommandId::Unknown {
                continue;
            }
            ids.insert(id.name(), id);
            arity.insert(id, args);
        }

        Self { ids, arity }
    }

    /// Looks up a command by its exact name.
    pub fn lookup(&self, name: &str) -> CommandId {
        self.ids.get(name).copied().unwrap_or(CommandId::Unknown)
    }

    /// Registered arity, or `None` for unregistered ids.
    pub fn arity(&self, id: CommandId) -> Option<usize> {
        self.arity.get(&id).copied()
    }

}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new([
            (CommandId::Set, 2),
            (CommandId::Get, 1),
            (CommandId::Del, 1),
        ])
    }
}

/// A parsed request.
///
/// Only the parser constructs queries, and only after checking the argument
/// count against the command table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    command: CommandId,
    args: Vec<String>,
}

impl Query {
    pub(crate) fn new(command: CommandId, args: Vec<String>) -> Self {
        Self { command, args }
    }

    pub fn command_id(&self) -> CommandId {
        self.command
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}
