//! In-Memory Driver
//!
//! The built-in [`Driver`]: a thread-safe, sharded `HashMap` holding raw bytes per
//! `(namespace, key)`.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     MemoryDriver                            │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are distributed across shards by hashing the key, so tasks working on
//! different keys rarely contend. Every shard maps a namespace to its own map,
//! which keeps `clear` scoped to one namespace.

use crate::error::StorageResult;
use crate::storage::backend::Driver;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::trace;

/// Name the in-memory driver is registered under.
pub const MEMORY_DRIVER: &str = "memoryStorage";

/// Number of shards.
/// More shards = less lock contention, but more memory overhead.
const NUM_SHARDS: usize = 64;

type Namespaces = HashMap<String, HashMap<String, Bytes>>;

/// A single shard containing a portion of the key-value pairs.
#[derive(Debug, Default)]
struct Shard {
    data: RwLock<Namespaces>,
}

/// Sharded in-memory driver.
///
/// # Example
///
/// ```
/// use expirykv::storage::{Driver, MemoryDriver};
/// use bytes::Bytes;
///
/// # tokio_test::block_on(async {
/// let driver = MemoryDriver::new();
/// driver.set("app/cache", "name", Bytes::from("Ariz")).await.unwrap();
///
/// let value = driver.get("app/cache", "name").await.unwrap();
/// assert_eq!(value, Some(Bytes::from("Ariz")));
///
/// // Other namespaces don't see it
/// assert_eq!(driver.get("app/other", "name").await.unwrap(), None);
/// # });
/// ```
pub struct MemoryDriver {
    shards: Vec<Shard>,

    /// Statistics: total number of keys across namespaces
    key_count: AtomicU64,

    /// Statistics: total get operations
    get_count: AtomicU64,

    /// Statistics: total set operations
    set_count: AtomicU64,

    /// Statistics: total remove operations
    del_count: AtomicU64,
}

impl std::fmt::Debug for MemoryDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDriver")
            .field("shards", &self.shards.len())
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriver {
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Shard::default()).collect();

        Self {
            shards,
            key_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
        }
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard_index(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    #[inline]
    fn get_shard(&self, key: &str) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Returns the approximate number of keys across all namespaces.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns driver statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.key_count.load(Ordering::Relaxed),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        MEMORY_DRIVER
    }

    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Bytes>> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let data = self
            .get_shard(key)
            .data
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let value = data.get(namespace).and_then(|items| items.get(key)).cloned();

        trace!(namespace, key, hit = value.is_some(), "memory get");
        Ok(value)
    }

    async fn set(&self, namespace: &str, key: &str, value: Bytes) -> StorageResult<()> {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self
            .get_shard(key)
            .data
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let items = data.entry(namespace.to_string()).or_default();

        if items.insert(key.to_string(), value).is_none() {
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }

        trace!(namespace, key, "memory set");
        Ok(())
    }

    async fn remove(&self, namespace: &str, key: &str) -> StorageResult<()> {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self
            .get_shard(key)
            .data
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(items) = data.get_mut(namespace) {
            if items.remove(key).is_some() {
                self.key_count.fetch_sub(1, Ordering::Relaxed);
            }
            if items.is_empty() {
                data.remove(namespace);
            }
        }

        Ok(())
    }

    async fn clear(&self, namespace: &str) -> StorageResult<()> {
        let mut cleared = 0u64;

        for shard in &self.shards {
            let mut data = shard.data.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(items) = data.remove(namespace) {
                cleared += items.len() as u64;
            }
        }

        if cleared > 0 {
            self.key_count.fetch_sub(cleared, Ordering::Relaxed);
        }

        trace!(namespace, cleared, "memory clear");
        Ok(())
    }

    async fn keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        let mut result = Vec::new();

        for shard in &self.shards {
            let data = shard.data.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(items) = data.get(namespace) {
                result.extend(items.keys().cloned());
            }
        }

        result.sort();
        Ok(result)
    }
}

/// Driver statistics.
#[derive(Debug, Clone, Copy)]
pub struct StorageStats {
    /// Number of keys currently stored
    pub keys: u64,
    /// Total get operations
    pub get_ops: u64,
    /// Total set operations
    pub set_ops: u64,
    /// Total remove operations
    pub del_ops: u64,
}
