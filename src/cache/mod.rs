//! Cache port for memoized lookups (exchange rates, daily feed snapshots).
//!
//! Lookup components take a `CachePort` so tests can substitute the in-memory
//! implementation for the file-backed ones.

use std::collections::HashMap;
use std::hash::Hash;
use thiserror::Error;

pub mod file;

pub use file::{JsonFileCache, SnapshotDir, SnapshotKey};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cache encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Read-through / write-through key-value store.
pub trait CachePort<K, V>: Send {
    fn get(&self, key: &K) -> Option<V>;

    /// Store a value. File-backed implementations persist before returning.
    fn put(&mut self, key: K, value: V) -> Result<(), CacheError>;
}

/// Volatile cache for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache<K, V> {
    entries: HashMap<K, V>,
    puts: usize,
}

impl<K, V> MemoryCache<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            puts: 0,
        }
    }

    pub fn with_entry(mut self, key: K, value: V) -> Self {
        self.entries.insert(key, value);
        self
    }

    /// Number of `put` calls seen, to assert write-through in tests.
    pub fn put_count(&self) -> usize {
        self.puts
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> CachePort<K, V> for MemoryCache<K, V>
where
    K: Eq + Hash + Send,
    V: Clone + Send,
{
    fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: K, value: V) -> Result<(), CacheError> {
        self.entries.insert(key, value);
        self.puts += 1;
        Ok(())
    }
}
