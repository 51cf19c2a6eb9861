//! Storage Module
//!
//! This module provides the storage layer for memkv: an [`Engine`] trait with
//! a single in-memory implementation, and a [`Storage`] facade that turns a
//! missing key into an explicit error.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │           Storage            │  get -> Result<String, StorageError>
//! └──────────────┬───────────────┘
//!                │ Arc<dyn Engine>
//!                ▼
//! ┌──────────────────────────────┐
//! │        InMemoryEngine        │  RwLock<HashMap<String, String>>
//! └──────────────────────────────┘
//! ```
//!
//! There is no eviction, expiry or persistence: all state is lost when the
//! process exits.
//!
//! ## Example
//!
//! ```
//! use memkv::storage::{InMemoryEngine, Storage, StorageError};
//! use std::sync::Arc;
//!
//! let storage = Storage::new(Arc::new(InMemoryEngine::new()));
//!
//! storage.set("name", "memkv");
//! assert_eq!(storage.get("name"), Ok("memkv".to_string()));
//!
//! storage.del("name");
//! assert_eq!(storage.get("name"), Err(StorageError::NotFound));
//! ```

pub mod engine;

use std::sync::Arc;
use thiserror::Error;

pub use engine::{Engine, EngineStats, InMemoryEngine};

/// Errors returned by [`Storage`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("not found")]
    NotFound,
}

/// Storage facade shared by every connection.
#[derive(Clone)]
pub struct Storage {
    engine: Arc<dyn Engine>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

impl Storage {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    /// Returns the value for `key`, or [`StorageError::NotFound`].
    pub fn get(&self, key: &str) -> Result<String, StorageError> {
        self.engine.get(key).ok_or(StorageError::NotFound)
    }

    /// Unconditional upsert.
    pub fn set(&self, key: &str, value: &str) {
        self.engine.set(key, value);
    }

    /// Delete-if-present.
    pub fn del(&self, key: &str) {
        self.engine.del(key);
    }

    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryEngine::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_is_an_error() {
        let storage = Storage::default();
        assert_eq!(storage.get("nope"), Err(StorageError::NotFound));
        assert_eq!(StorageError::NotFound.to_string(), "not found");
    }

    #[test]
    fn test_facade_shares_engine() {
        let engine = Arc::new(InMemoryEngine::new());
        let storage = Storage::new(engine.clone());
        let other = storage.clone();

        storage.set("k", "v");
        assert_eq!(other.get("k"), Ok("v".to_string()));
        assert_eq!(engine.len(), 1);

        other.del("k");
        assert!(engine.is_empty());
    }

    #[test]
    fn test_stats_reach_through_facade() {
        let storage = Storage::default();

        storage.set("a", "1");
        storage.get("a").unwrap();
        assert!(storage.get("b").is_err());
        storage.del("a");

        assert_eq!(
            storage.stats(),
            EngineStats {
                keys: 0,
                gets: 2,
                sets: 1,
                dels: 1,
            }
        );
    }
}
