//! Thread-Safe Sharded Key-Value Store
//!
//! This module implements the shared map behind GET/SET/DEL.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Instead of one big lock, we use multiple shards to reduce contention.
//! 2. **RwLock**: Allows multiple concurrent readers with exclusive writers.
//! 3. **Atomic key count**: `KEYS` in the STATS block must not scan every shard.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐            │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │            │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │            │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │            │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are distributed across shards using a hash function, so workers
//! touching different keys rarely block each other. A SET observed by a
//! later GET on any connection returns that value or a newer one.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Number of shards for the storage engine.
/// More shards = less lock contention, but more memory overhead.
const NUM_SHARDS: usize = 16;

/// The main key-value store for tcpkv.
///
/// Designed to be wrapped in an `Arc` and shared across all worker
/// threads. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use tcpkv::storage::StorageEngine;
///
/// let engine = StorageEngine::new();
/// engine.set("name".to_string(), "tcpkv".to_string());
/// assert_eq!(engine.get("name"), Some("tcpkv".to_string()));
/// assert!(engine.del("name"));
/// assert_eq!(engine.get("name"), None);
/// ```
pub struct StorageEngine {
    /// Sharded storage for reduced lock contention
    shards: Vec<RwLock<HashMap<String, String>>>,

    /// Total number of keys across all shards
    key_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates a new, empty storage engine.
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| RwLock::new(HashMap::new())).collect();

        Self {
            shards,
            key_count: AtomicU64::new(0),
        }
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard(&self, key: &str) -> &RwLock<HashMap<String, String>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    /// Sets a key-value pair, overwriting any existing value.
    ///
    /// Returns `true` if a new key was created, `false` if an existing key
    /// was updated.
    pub fn set(&self, key: String, value: String) -> bool {
        let mut data = self.shard(&key).write().unwrap();
        let is_new = data.insert(key, value).is_none();
        if is_new {
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }
        is_new
    }

    /// Gets the value for a key, or `None` if the key doesn't exist.
    pub fn get(&self, key: &str) -> Option<String> {
        let data = self.shard(key).read().unwrap();
        data.get(key).cloned()
    }

    /// Deletes a key. Returns `true` if the key existed.
    pub fn del(&self, key: &str) -> bool {
        let mut data = self.shard(key).write().unwrap();
        let removed = data.remove(key).is_some();
        if removed {
            self.key_count.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    /// Returns the number of keys currently stored.
    pub fn len(&self) -> usize {
        self.key_count.load(Ordering::Relaxed) as usize
    }

    /// Returns `true` if no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
