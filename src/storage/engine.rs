//! Thread-Safe In-Memory Engine
//!
//! This module implements the storage engine that every connection task
//! shares. It is a single `HashMap` behind a single `RwLock`.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               InMemoryEngine                │
//! │  ┌───────────────────────────────────────┐  │
//! │  │ RwLock<HashMap<String, String>>       │  │
//! │  │   readers: GET (shared)               │  │
//! │  │   writers: SET / DEL (exclusive)      │  │
//! │  └───────────────────────────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Readers run concurrently with each other but never with a writer, so every
//! operation takes effect atomically in one total order. A value is inserted
//! as a whole `String`, which means a reader can never observe a torn value.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// The operations a storage backend must provide.
///
/// Implementations are shared by every connection task, so they must be
/// `Send + Sync` and take `&self`.
pub trait Engine: Send + Sync {
    /// Returns the value stored under `key`, or `None` when absent.
    fn get(&self, key: &str) -> Option<String>;

    /// Inserts or overwrites `key`.
    fn set(&self, key: &str, value: &str);

    /// Removes `key` if present. Removing an absent key is a no-op.
    fn del(&self, key: &str);

    /// Key count and operation counters since creation.
    fn stats(&self) -> EngineStats;
}

/// Operation counters for an engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub keys: usize,
    pub gets: u64,
    pub sets: u64,
    pub dels: u64,
}

/// The in-memory engine.
///
/// # Example
///
/// ```
/// use memkv::storage::{Engine, InMemoryEngine};
///
/// let engine = InMemoryEngine::new();
/// engine.set("name", "memkv");
/// assert_eq!(engine.get("name"), Some("memkv".to_string()));
///
/// engine.del("name");
/// assert_eq!(engine.get("name"), None);
/// ```
#[derive(Default)]
pub struct InMemoryEngine {
    data: RwLock<HashMap<String, String>>,

    get_count: AtomicU64,
    set_count: AtomicU64,
    del_count: AtomicU64,
}

impl std::fmt::Debug for InMemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEngine")
            .field("keys", &self.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .field("del_count", &self.del_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl InMemoryEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        // A writer that panicked mid-insert cannot leave a half-written
        // String behind, so the map is still consistent.
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Engine for InMemoryEngine {
    fn get(&self, key: &str) -> Option<String> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.insert(key.to_string(), value.to_string());
    }

    fn del(&self, key: &str) {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.remove(key);
    }

    fn stats(&self) -> EngineStats {
        EngineStats {
            keys: self.len(),
            gets: self.get_count.load(Ordering::Relaxed),
            sets: self.set_count.load(Ordering::Relaxed),
            dels: self.del_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_set_and_get() {
        let engine = InMemoryEngine::new();

        engine.set("key1", "value1");
        assert_eq!(engine.get("key1"), Some("value1".to_string()));
    }

    #[test]
    fn test_get_nonexistent() {
        let engine = InMemoryEngine::new();
        assert_eq!(engine.get("nonexistent"), None);
    }

    #[test]
    fn test_set_overwrites() {
        let engine = InMemoryEngine::new();

        engine.set("key", "old");
        engine.set("key", "new");
        assert_eq!(engine.get("key"), Some("new".to_string()));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_delete() {
        let engine = InMemoryEngine::new();

        engine.set("key1", "value1");
        engine.del("key1");
        assert_eq!(engine.get("key1"), None);

        // Deleting again is a no-op
        engine.del("key1");
        assert!(engine.is_empty());
    }

    #[test]
    fn test_stats() {
        let engine = InMemoryEngine::new();

        engine.set("a", "1");
        engine.set("b", "2");
        engine.get("a");
        engine.del("missing");

        assert_eq!(
            engine.stats(),
            EngineStats {
                keys: 2,
                gets: 1,
                sets: 2,
                dels: 1,
            }
        );
    }

    #[test]
    fn test_concurrent_access() {
        let engine = Arc::new(InMemoryEngine::new());
        let mut handles = vec![];

        // Writers on disjoint keys, each reading back its own writes
        for i in 0..10 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for j in 0..200 {
                    let key = format!("key-{}-{}", i, j);
                    let value = format!("value-{}-{}", i, j);
                    engine.set(&key, &value);
                    assert_eq!(engine.get(&key), Some(value));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len(), 2000);
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_values() {
        let engine = Arc::new(InMemoryEngine::new());
        let long_a = "a".repeat(4096);
        let long_b = "b".repeat(4096);
        engine.set("shared", &long_a);

        let writer = {
            let engine = Arc::clone(&engine);
            let (a, b) = (long_a.clone(), long_b.clone());
            thread::spawn(move || {
                for i in 0..500 {
                    engine.set("shared", if i % 2 == 0 { &b } else { &a });
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let (a, b) = (long_a.clone(), long_b.clone());
                thread::spawn(move || {
                    for _ in 0..500 {
                        let value = engine.get("shared").unwrap();
                        assert!(value == a || value == b);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn test_concurrent_set_del_disjoint_keys() {
        let engine = Arc::new(InMemoryEngine::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for j in 0..100 {
                        let key = format!("k-{}-{}", i, j);
                        engine.set(&key, "v");
                        engine.del(&key);
                        assert_eq!(engine.get(&key), None);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(engine.is_empty());
    }
}
