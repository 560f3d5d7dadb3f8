//! Storage Module
//!
//! This module provides the expiring key/value store and the backend it runs on.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ExpiringStore                           │
//! │        set_item / get_item / remove_item / config           │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │ StorageBackend
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │     namespaces · driver registry · JSON serializer          │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │ Driver
//!                            ▼
//!              ┌───────────────────────────┐
//!              │       MemoryDriver        │
//!              │   (64 RwLock shards)      │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Per-entry Expiration**: every entry may carry its own expiry instant
//! - **Default Expiration**: entries saved without one use the configured default
//! - **Lazy Expiry**: expired entries are purged when read
//! - **Pluggable Backends**: anything implementing [`StorageBackend`]
//!
//! ## Example
//!
//! ```
//! use expirykv::config::{ConfigRequest, DefaultExpiration, StoreOptions};
//! use expirykv::storage::{ExpiringStore, StorageEngine};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let store = ExpiringStore::new(StorageEngine::new());
//!
//! // Entries expire an hour after they are saved
//! store
//!     .config(ConfigRequest::Apply(
//!         StoreOptions::new().with_default_expiration(DefaultExpiration::from_millis(3_600_000)),
//!     ))
//!     .unwrap();
//!
//! store.set_item("session", json!({"user": "ariz"}), None).await.unwrap();
//! assert!(store.get_item("session").await.unwrap().is_some());
//! # });
//! ```

pub mod backend;
pub mod engine;
pub mod expiry;
pub mod memory;
pub mod store;

// Re-export commonly used types
pub use backend::{Driver, JsonSerializer, Serializer, StorageBackend};
pub use engine::StorageEngine;
pub use expiry::{shadow_key, Expiration};
pub use memory::{MemoryDriver, StorageStats, MEMORY_DRIVER};
pub use store::ExpiringStore;
