//! # expirykv - Expiring Key-Value Storage
//!
//! expirykv layers per-entry expiration ("time-to-live") over an asynchronous
//! key/value storage backend. The backend keeps doing what it does; expirykv adds
//! when entries stop being valid.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              expirykv                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────────────────────┐  │
//! │  │   Shell     │───>│  Command    │───>│       ExpiringStore         │  │
//! │  │  (stdin)    │    │  Handler    │    │  value + shadow expiration  │  │
//! │  └─────────────┘    └─────────────┘    └──────────────┬──────────────┘  │
//! │                                                       │                 │
//! │                                                       ▼                 │
//! │                     ┌──────────────────────────────────────────────┐    │
//! │                     │              StorageEngine                   │    │
//! │                     │  ┌────────────┐  ┌────────────┐  ┌────────┐  │    │
//! │                     │  │MemoryDriver│  │user drivers│  │  ...   │  │    │
//! │                     │  └────────────┘  └────────────┘  └────────┘  │    │
//! │                     └──────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use expirykv::storage::{Expiration, ExpiringStore, StorageEngine};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let store = ExpiringStore::new(StorageEngine::new());
//!
//! // Kept until removed
//! store.set_item("name", json!("Ariz"), None).await.unwrap();
//!
//! // Gone in a minute
//! store
//!     .set_item("token", json!("abc123"), Some(Expiration::after(Duration::from_secs(60))))
//!     .await
//!     .unwrap();
//!
//! assert_eq!(store.get_item("name").await.unwrap(), Some(json!("Ariz")));
//! # });
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: the expiring store, the backend contract and the reference engine
//! - [`config`]: store options and default expiration
//! - [`commands`]: command handler behind the interactive shell
//! - [`error`]: error types
//!
//! ## Design Highlights
//!
//! ### Shadow Entries
//!
//! An entry's expiration is stored next to it, under
//! `"<key>_expires_<first 8 hex chars of sha256(key)>"`. Tools sharing the backend
//! must leave those keys alone.
//!
//! ### Lazy Expiry Only
//!
//! Expired entries are removed when read. There is no background sweep, so an
//! expired entry that is never read again stays in the backend.
//!
//! ### Fail-Open Metadata
//!
//! A missing or malformed expiration means "never expires". Availability of the
//! value wins over strict expiry.

pub mod commands;
pub mod config;
pub mod error;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{CommandHandler, Reply};
pub use config::{ConfigRequest, ConfigResponse, DefaultExpiration, StoreOptions};
pub use error::{StorageError, StoreError};
pub use storage::{Expiration, ExpiringStore, StorageBackend, StorageEngine};

/// Version of expirykv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
