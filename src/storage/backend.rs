//! Backend Contract
//!
//! The expiring store works on top of any [`StorageBackend`]. A backend is an
//! asynchronous key/value store that also manages its configuration, a set of
//! [`Driver`]s (where bytes actually live) and a [`Serializer`] (how values become
//! bytes).
//!
//! ```text
//! ┌──────────────────────┐
//! │    ExpiringStore     │   expiration policy
//! └──────────┬───────────┘
//!            │ StorageBackend
//!            ▼
//! ┌──────────────────────┐
//! │   backend (engine)   │   config, namespaces, driver selection
//! └──────────┬───────────┘
//!            │ Serializer + Driver
//!            ▼
//! ┌──────────────────────┐
//! │        driver        │   raw bytes per (namespace, key)
//! └──────────────────────┘
//! ```

use crate::config::{ConfigRequest, ConfigResponse, StoreOptions};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;

/// Asynchronous key/value storage the expiring store is layered on.
///
/// All operations may fail with a [`StorageError`]; a missing key is `Ok(None)`,
/// never an error.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Reads the value stored under `key`.
    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: Value) -> StorageResult<()>;

    /// Removes `key`. Removing a missing key succeeds.
    async fn remove_item(&self, key: &str) -> StorageResult<()>;

    /// Removes every key of this backend's namespace.
    async fn clear(&self) -> StorageResult<()>;

    /// Lists the keys of this backend's namespace.
    async fn keys(&self) -> StorageResult<Vec<String>>;

    /// Configuration entry point.
    fn config(&self, request: ConfigRequest) -> StorageResult<ConfigResponse>;

    /// Waits until a driver has been selected.
    async fn ready(&self) -> StorageResult<()>;

    /// Checks whether `driver_name` is defined and usable.
    fn supports(&self, driver_name: &str) -> bool;

    /// Name of the active driver, `None` before [`ready`](Self::ready).
    fn driver(&self) -> Option<String>;

    /// Looks up a defined driver.
    async fn get_driver(&self, name: &str) -> StorageResult<Arc<dyn Driver>>;

    /// Changes the driver preference order and selects a driver from it.
    async fn set_driver(&self, names: &[String]) -> StorageResult<()>;

    /// The serializer values go through on their way to the driver.
    fn get_serializer(&self) -> Arc<dyn Serializer>;

    /// Makes a driver available to this backend and its sibling instances.
    async fn define_driver(&self, driver: Arc<dyn Driver>) -> StorageResult<()>;

    /// Creates an independent backend handle configured with `options`.
    fn create_instance(&self, options: StoreOptions) -> StorageResult<Self>
    where
        Self: Sized;
}

/// Where bytes actually live.
///
/// Drivers are shared between backend instances, so every operation is scoped to
/// a namespace.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Unique name the driver is selected by.
    fn name(&self) -> &str;

    /// Whether the driver can run in the current environment.
    fn is_supported(&self) -> bool {
        true
    }

    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Bytes>>;

    async fn set(&self, namespace: &str, key: &str, value: Bytes) -> StorageResult<()>;

    async fn remove(&self, namespace: &str, key: &str) -> StorageResult<()>;

    async fn clear(&self, namespace: &str) -> StorageResult<()>;

    async fn keys(&self, namespace: &str) -> StorageResult<Vec<String>>;
}

/// Converts values to and from the bytes a driver stores.
pub trait Serializer: Send + Sync {
    fn serialize(&self, value: &Value) -> StorageResult<Bytes>;

    fn deserialize(&self, bytes: &[u8]) -> StorageResult<Value>;
}

/// Stores values as JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &Value) -> StorageResult<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn deserialize(&self, bytes: &[u8]) -> StorageResult<Value> {
        serde_json::from_slice(bytes).map_err(StorageError::from)
    }
}
