//! Expiring Store
//!
//! [`ExpiringStore`] decorates a [`StorageBackend`] with per-entry expiration.
//!
//! ## Entry Layout
//!
//! ```text
//!   set_item("session", v, At(1700000000000))
//!
//!   backend:
//!     "session"                   -> v
//!     "session_expires_<hash8>"   -> 1700000000000
//! ```
//!
//! ## Expiry
//!
//! There is no background sweep. An entry whose expiration has passed stays in the
//! backend until the next `get_item` notices it and removes both halves, or until
//! it is removed explicitly.
//!
//! Expiration metadata is fail-open: a missing shadow entry, or one that doesn't
//! hold a usable timestamp, means the entry never expires.
//!
//! ## Concurrency
//!
//! `set_item` writes the value, then the expiration. `remove_item` removes both
//! concurrently. Nothing serializes callers working on the same key.

use crate::config::{ConfigRequest, ConfigResponse, DefaultExpiration, StoreOptions};
use crate::error::{StorageError, StorageResult, StoreError, StoreResult};
use crate::storage::backend::{Driver, Serializer, StorageBackend};
use crate::storage::expiry::{now_millis, shadow_key, Expiration};
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, trace, warn};

/// Key/value store whose entries expire.
///
/// # Example
///
/// ```
/// use expirykv::storage::{Expiration, ExpiringStore, StorageEngine};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let store = ExpiringStore::new(StorageEngine::new());
///
/// store.set_item("name", json!("Ariz"), None).await.unwrap();
/// assert_eq!(store.get_item("name").await.unwrap(), Some(json!("Ariz")));
///
/// // Already expired: the read purges it
/// store.set_item("stale", json!(1), Some(Expiration::At(0))).await.unwrap();
/// assert_eq!(store.get_item("stale").await.unwrap(), None);
/// # });
/// ```
pub struct ExpiringStore<B> {
    backend: B,
    default_expiration: RwLock<DefaultExpiration>,
}

impl<B: std::fmt::Debug> std::fmt::Debug for ExpiringStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringStore")
            .field("backend", &self.backend)
            .field(
                "default_expiration",
                &*self
                    .default_expiration
                    .read()
                    .unwrap_or_else(PoisonError::into_inner),
            )
            .finish()
    }
}

impl<B: StorageBackend> ExpiringStore<B> {
    /// Wraps `backend`. Entries never expire by default.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            default_expiration: RwLock::new(DefaultExpiration::Never),
        }
    }

    /// Creates a store over a new backend instance, configured with `options`.
    pub fn create_instance(&self, options: StoreOptions) -> StorageResult<Self> {
        let store = Self::new(self.backend.create_instance(options.clone())?);
        store.config(ConfigRequest::Apply(options))?;
        Ok(store)
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Expiration applied to entries saved without an explicit one.
    pub fn default_expiration(&self) -> DefaultExpiration {
        *self
            .default_expiration
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures the backend.
    ///
    /// Queries go to the backend untouched. Applied options without a
    /// `default_expiration` get [`DefaultExpiration::Never`]; the caller's options
    /// are left as they were.
    pub fn config(&self, request: ConfigRequest) -> StorageResult<ConfigResponse> {
        let mut merged = match request {
            ConfigRequest::Apply(options) => options,
            query => return self.backend.config(query),
        };

        let default_expiration = *merged
            .default_expiration
            .get_or_insert(DefaultExpiration::Never);

        let response = self.backend.config(ConfigRequest::Apply(merged))?;

        *self
            .default_expiration
            .write()
            .unwrap_or_else(PoisonError::into_inner) = default_expiration;
        debug!(%default_expiration, "Default expiration configured");

        Ok(response)
    }

    /// Stores `value` under `key`.
    ///
    /// Without `expires` the entry expires according to the default expiration in
    /// effect right now. The value is written before its expiration; if the second
    /// write fails the value stays behind without one, and so never expires.
    pub async fn set_item(
        &self,
        key: &str,
        value: Value,
        expires: Option<Expiration>,
    ) -> StoreResult<()> {
        ensure_key(key)?;

        let expires = expires.unwrap_or_else(|| self.default_expiration().expiration());
        let shadow = shadow_key(key);

        self.backend
            .set_item(key, value)
            .await
            .map_err(|e| StoreError::write(key, e))?;

        if let Err(e) = self.backend.set_item(&shadow, expires.to_value()).await {
            warn!(key, error = %e, "Value stored without its expiration");
            return Err(StoreError::write(&shadow, e));
        }

        trace!(key, %expires, "Item stored");
        Ok(())
    }

    /// Reads the value under `key`.
    ///
    /// Returns `Ok(None)` for a missing key, and for an expired one after removing
    /// it.
    pub async fn get_item(&self, key: &str) -> StoreResult<Option<Value>> {
        ensure_key(key)?;

        let shadow = shadow_key(key);
        let expires = match self.backend.get_item(&shadow).await {
            Ok(Some(stored)) => Expiration::from_value(&stored).or_else(|| {
                warn!(key, stored = %stored, "Ignoring malformed expiration");
                None
            }),
            Ok(None) => None,
            Err(StorageError::Serialization(e)) => {
                warn!(key, error = %e, "Ignoring unreadable expiration");
                None
            }
            Err(e) => return Err(StoreError::read(&shadow, e)),
        };

        if let Some(expires) = expires {
            if expires.is_expired_at(now_millis()) {
                debug!(key, %expires, "Lazily removing expired item");
                self.remove_item(key).await?;
                return Ok(None);
            }
        }

        self.backend
            .get_item(key)
            .await
            .map_err(|e| StoreError::read(key, e))
    }

    /// Removes `key` and its expiration.
    ///
    /// Both removals run concurrently and always run to completion. If either
    /// fails, the value's failure is reported first.
    pub async fn remove_item(&self, key: &str) -> StoreResult<()> {
        ensure_key(key)?;

        let shadow = shadow_key(key);
        let (value_removed, shadow_removed) = tokio::join!(
            self.backend.remove_item(key),
            self.backend.remove_item(&shadow)
        );

        value_removed.map_err(|e| StoreError::write(key, e))?;
        shadow_removed.map_err(|e| StoreError::write(&shadow, e))?;

        trace!(key, "Item removed");
        Ok(())
    }

    // ========================================================================
    // Passthroughs
    // ========================================================================

    /// Name of the backend's active driver.
    pub fn driver(&self) -> Option<String> {
        self.backend.driver()
    }

    pub async fn get_driver(&self, name: &str) -> StorageResult<Arc<dyn Driver>> {
        self.backend.get_driver(name).await
    }

    pub async fn set_driver(&self, names: &[String]) -> StorageResult<()> {
        self.backend.set_driver(names).await
    }

    pub fn get_serializer(&self) -> Arc<dyn Serializer> {
        self.backend.get_serializer()
    }

    pub async fn ready(&self) -> StorageResult<()> {
        self.backend.ready().await
    }

    pub fn supports(&self, driver_name: &str) -> bool {
        self.backend.supports(driver_name)
    }

    /// Removes every entry of the backend's namespace, expirations included.
    pub async fn clear(&self) -> StorageResult<()> {
        self.backend.clear().await
    }

    pub async fn define_driver(&self, driver: Arc<dyn Driver>) -> StorageResult<()> {
        self.backend.define_driver(driver).await
    }
}

fn ensure_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::EmptyKey);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::engine::StorageEngine;
    use crate::storage::memory::{MemoryDriver, MEMORY_DRIVER};
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, SystemTime};

    fn create_store() -> ExpiringStore<StorageEngine> {
        ExpiringStore::new(StorageEngine::new())
    }

    /// Memory driver whose writes and removals can be made to fail.
    struct FlakyDriver {
        inner: MemoryDriver,
        fail_shadow_writes: AtomicBool,
        fail_value_writes: AtomicBool,
        fail_removals: AtomicBool,
        fail_reads: AtomicBool,
    }

    impl FlakyDriver {
        fn new() -> Self {
            Self {
                inner: MemoryDriver::new(),
                fail_shadow_writes: AtomicBool::new(false),
                fail_value_writes: AtomicBool::new(false),
                fail_removals: AtomicBool::new(false),
                fail_reads: AtomicBool::new(false),
            }
        }

        fn failure() -> StorageError {
            StorageError::driver("flaky", "injected failure")
        }
    }

    #[async_trait]
    impl Driver for FlakyDriver {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Bytes>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(Self::failure());
            }
            self.inner.get(namespace, key).await
        }

        async fn set(&self, namespace: &str, key: &str, value: Bytes) -> StorageResult<()> {
            let is_shadow = key.contains("_expires_");
            if is_shadow && self.fail_shadow_writes.load(Ordering::SeqCst) {
                return Err(Self::failure());
            }
            if !is_shadow && self.fail_value_writes.load(Ordering::SeqCst) {
                return Err(Self::failure());
            }
            self.inner.set(namespace, key, value).await
        }

        async fn remove(&self, namespace: &str, key: &str) -> StorageResult<()> {
            // The removal still happens; only the outcome is reported as failed
            self.inner.remove(namespace, key).await?;
            if self.fail_removals.load(Ordering::SeqCst) && !key.contains("_expires_") {
                return Err(Self::failure());
            }
            Ok(())
        }

        async fn clear(&self, namespace: &str) -> StorageResult<()> {
            self.inner.clear(namespace).await
        }

        async fn keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
            self.inner.keys(namespace).await
        }
    }

    async fn create_flaky_store() -> (ExpiringStore<StorageEngine>, Arc<FlakyDriver>) {
        let flaky = Arc::new(FlakyDriver::new());
        let store = create_store();

        store.define_driver(flaky.clone()).await.unwrap();
        store.set_driver(&["flaky".to_string()]).await.unwrap();

        (store, flaky)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let store = create_store();

        store.set_item("key", json!({"n": 1}), None).await.unwrap();
        assert_eq!(store.get_item("key").await.unwrap(), Some(json!({"n": 1})));

        // The default writes a never-expiring marker
        let shadow = store.backend().get_item(&shadow_key("key")).await.unwrap();
        assert_eq!(shadow, Some(json!("Infinity")));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let store = create_store();
        assert_eq!(store.get_item("nonexistent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_past_expiration_is_purged() {
        let store = create_store();
        let past = SystemTime::now() - Duration::from_secs(60);

        store
            .set_item("key", json!("value"), Some(Expiration::at(past)))
            .await
            .unwrap();

        assert_eq!(store.get_item("key").await.unwrap(), None);

        // Lazy eviction removed both halves
        let backend = store.backend();
        assert_eq!(backend.get_item("key").await.unwrap(), None);
        assert_eq!(backend.get_item(&shadow_key("key")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_future_expiration() {
        let store = create_store();

        store
            .set_item(
                "key",
                json!("value"),
                Some(Expiration::after(Duration::from_millis(100))),
            )
            .await
            .unwrap();

        // Key should exist immediately
        assert_eq!(store.get_item("key").await.unwrap(), Some(json!("value")));

        // Wait for expiry
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Key should be gone
        assert_eq!(store.get_item("key").await.unwrap(), None);
        assert!(store.backend().keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_untracked_key_never_expires() {
        let store = create_store();

        store.backend().set_item("legacy", json!([1, 2])).await.unwrap();
        assert_eq!(store.get_item("legacy").await.unwrap(), Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn test_malformed_expiration_fails_open() {
        let store = create_store();

        store.backend().set_item("key", json!("value")).await.unwrap();
        store
            .backend()
            .set_item(&shadow_key("key"), json!("tomorrow-ish"))
            .await
            .unwrap();

        assert_eq!(store.get_item("key").await.unwrap(), Some(json!("value")));
    }

    #[tokio::test]
    async fn test_unreadable_expiration_fails_open() {
        let store = create_store();
        let engine = store.backend();

        engine.set_item("key", json!("value")).await.unwrap();
        engine
            .memory()
            .set(&engine.namespace(), &shadow_key("key"), Bytes::from_static(b"\x00garbage"))
            .await
            .unwrap();

        assert_eq!(store.get_item("key").await.unwrap(), Some(json!("value")));
    }

    #[tokio::test]
    async fn test_negative_infinity_expiration_is_purged() {
        let store = create_store();

        store.backend().set_item("key", json!(1)).await.unwrap();
        store
            .backend()
            .set_item(&shadow_key("key"), json!("-Infinity"))
            .await
            .unwrap();

        assert_eq!(store.get_item("key").await.unwrap(), None);
        assert!(store.backend().keys().await.unwrap().is_empty());
    }

    #[test]
    fn test_debug_shows_default_expiration() {
        let store = create_store();
        store
            .config(ConfigRequest::Apply(
                StoreOptions::new().with_default_expiration(DefaultExpiration::from_millis(1500)),
            ))
            .unwrap();

        let debug = format!("{:?}", store);
        assert!(debug.starts_with("ExpiringStore"));
        assert!(debug.contains("After(1.5s)"));
    }

    #[tokio::test]
    async fn test_default_expiration_is_applied() {
        let store = create_store();
        store
            .config(ConfigRequest::Apply(
                StoreOptions::new().with_default_expiration(DefaultExpiration::from_millis(60_000)),
            ))
            .unwrap();

        let before = now_millis();
        store.set_item("key", json!("value"), None).await.unwrap();
        let after = now_millis();

        let stored = store
            .backend()
            .get_item(&shadow_key("key"))
            .await
            .unwrap()
            .and_then(|v| v.as_i64())
            .unwrap();
        assert!(stored >= before + 60_000 && stored <= after + 60_000);
    }

    #[tokio::test]
    async fn test_default_expiration_read_at_call_time() {
        let store = create_store();
        store
            .config(ConfigRequest::Apply(
                StoreOptions::new().with_default_expiration(DefaultExpiration::from_millis(50)),
            ))
            .unwrap();
        store.set_item("short", json!(1), None).await.unwrap();

        // Changing the default doesn't touch stored expirations
        store
            .config(ConfigRequest::Apply(StoreOptions::new()))
            .unwrap();
        store.set_item("forever", json!(2), None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store.get_item("short").await.unwrap(), None);
        assert_eq!(store.get_item("forever").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_explicit_expiration_overrides_default() {
        let store = create_store();
        store
            .config(ConfigRequest::Apply(
                StoreOptions::new().with_default_expiration(DefaultExpiration::from_millis(10)),
            ))
            .unwrap();

        store
            .set_item("key", json!("value"), Some(Expiration::Never))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.get_item("key").await.unwrap(), Some(json!("value")));
    }

    #[tokio::test]
    async fn test_remove_item() {
        let store = create_store();

        store.set_item("key", json!("value"), None).await.unwrap();
        store.remove_item("key").await.unwrap();

        let backend = store.backend();
        assert_eq!(backend.get_item("key").await.unwrap(), None);
        assert_eq!(backend.get_item(&shadow_key("key")).await.unwrap(), None);

        // Already removed
        store.remove_item("key").await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let store = create_store();

        assert!(matches!(
            store.set_item("", json!(1), None).await,
            Err(StoreError::EmptyKey)
        ));
        assert!(matches!(store.get_item("").await, Err(StoreError::EmptyKey)));
        assert!(matches!(store.remove_item("").await, Err(StoreError::EmptyKey)));
        assert!(store.backend().keys().await.unwrap().is_empty());
    }

    #[test]
    fn test_config_injects_never() {
        let store = create_store();
        let options = StoreOptions::new().with_description("sessions");

        store.config(ConfigRequest::Apply(options.clone())).unwrap();

        // The caller's options are untouched
        assert_eq!(options.default_expiration, None);
        assert_eq!(store.default_expiration(), DefaultExpiration::Never);
        assert_eq!(
            store.config(ConfigRequest::Get("defaultExpiration".into())).unwrap(),
            ConfigResponse::Value(Some(json!("Infinity")))
        );
    }

    #[test]
    fn test_config_queries_pass_through() {
        let store = create_store();

        assert_eq!(
            store.config(ConfigRequest::Get("name".into())).unwrap(),
            ConfigResponse::Value(Some(json!("expirykv")))
        );
        assert!(matches!(
            store.config(ConfigRequest::Current).unwrap(),
            ConfigResponse::Current(_)
        ));
        // Queries don't reset the default expiration
        assert_eq!(store.default_expiration(), DefaultExpiration::Never);
    }

    #[tokio::test]
    async fn test_rejected_config_keeps_default() {
        let store = create_store();
        store
            .config(ConfigRequest::Apply(
                StoreOptions::new().with_default_expiration(DefaultExpiration::from_millis(500)),
            ))
            .unwrap();
        store.ready().await.unwrap();

        let result = store.config(ConfigRequest::Apply(
            StoreOptions::new()
                .with_name("elsewhere")
                .with_default_expiration(DefaultExpiration::from_millis(1)),
        ));

        assert!(matches!(result, Err(StorageError::ConfigLocked("name"))));
        assert_eq!(store.default_expiration(), DefaultExpiration::from_millis(500));
    }

    #[tokio::test]
    async fn test_create_instance() {
        let store = create_store();
        let sessions = store
            .create_instance(
                StoreOptions::new()
                    .with_store_name("sessions")
                    .with_default_expiration(DefaultExpiration::from_millis(1_000)),
            )
            .unwrap();

        assert_eq!(
            sessions.default_expiration(),
            DefaultExpiration::from_millis(1_000)
        );
        assert_eq!(store.default_expiration(), DefaultExpiration::Never);

        sessions.set_item("key", json!("session"), None).await.unwrap();
        assert_eq!(store.get_item("key").await.unwrap(), None);
        assert_eq!(
            sessions.get_item("key").await.unwrap(),
            Some(json!("session"))
        );
    }

    #[tokio::test]
    async fn test_shadow_key_agrees_across_instances() {
        let store = create_store();
        let twin = store.create_instance(StoreOptions::new()).unwrap();

        // Same namespace: one instance reads what the other wrote
        store
            .set_item("key", json!("value"), Some(Expiration::At(0)))
            .await
            .unwrap();
        assert_eq!(twin.get_item("key").await.unwrap(), None);
        assert_eq!(store.backend().get_item("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_passthroughs() {
        let store = create_store();

        assert_eq!(store.driver(), None);
        store.ready().await.unwrap();
        assert_eq!(store.driver().as_deref(), Some(MEMORY_DRIVER));
        assert!(store.supports(MEMORY_DRIVER));
        assert!(store.get_driver(MEMORY_DRIVER).await.is_ok());

        let bytes = store.get_serializer().serialize(&json!(7)).unwrap();
        assert_eq!(&bytes[..], b"7");

        store.set_item("a", json!(1), None).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.backend().keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_value_write_failure() {
        let (store, flaky) = create_flaky_store().await;
        flaky.fail_value_writes.store(true, Ordering::SeqCst);

        let err = store.set_item("key", json!(1), None).await.unwrap_err();
        assert!(matches!(err, StoreError::Write { ref key, .. } if key == "key"));

        // The expiration is never written after a failed value write
        assert!(flaky.inner.is_empty());
    }

    #[tokio::test]
    async fn test_shadow_write_failure_leaves_value() {
        let (store, flaky) = create_flaky_store().await;
        flaky.fail_shadow_writes.store(true, Ordering::SeqCst);

        let err = store
            .set_item("key", json!("value"), Some(Expiration::At(0)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }));

        // Degraded: the value survives without an expiration
        assert_eq!(store.get_item("key").await.unwrap(), Some(json!("value")));
    }

    #[tokio::test]
    async fn test_read_failure() {
        let (store, flaky) = create_flaky_store().await;
        store.set_item("key", json!(1), None).await.unwrap();
        flaky.fail_reads.store(true, Ordering::SeqCst);

        let err = store.get_item("key").await.unwrap_err();
        assert!(matches!(err, StoreError::Read { .. }));
    }

    #[tokio::test]
    async fn test_removal_failure_waits_for_both() {
        let (store, flaky) = create_flaky_store().await;
        store.set_item("key", json!(1), None).await.unwrap();
        flaky.fail_removals.store(true, Ordering::SeqCst);

        let err = store.remove_item("key").await.unwrap_err();
        assert!(matches!(err, StoreError::Write { ref key, .. } if key == "key"));

        // The expiration was still removed
        assert!(flaky.inner.is_empty());
    }

    #[tokio::test]
    async fn test_failed_lazy_removal_is_a_write_error() {
        let (store, flaky) = create_flaky_store().await;
        store
            .set_item("key", json!(1), Some(Expiration::At(0)))
            .await
            .unwrap();
        flaky.fail_removals.store(true, Ordering::SeqCst);

        let err = store.get_item("key").await.unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }));
    }
}
