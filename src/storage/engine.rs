//! Reference Storage Backend
//!
//! [`StorageEngine`] implements [`StorageBackend`] on top of pluggable drivers.
//!
//! ## Design Decisions
//!
//! 1. **Namespaces**: data lives under `"<name>/<store_name>"`. Two engines with the
//!    same namespace and driver see the same data.
//! 2. **Shared Registry**: drivers defined on an engine are visible to every
//!    instance created from it, and to the engine it was created from.
//! 3. **Lazy Selection**: the driver is picked on first use (or on [`ready`]),
//!    from the configured preference order.
//! 4. **Config Lock**: once a driver is selected the namespace and driver order are
//!    fixed; everything else stays mutable.
//!
//! [`ready`]: StorageBackend::ready

use crate::config::{ConfigRequest, ConfigResponse, StoreOptions};
use crate::error::{StorageError, StorageResult};
use crate::storage::backend::{Driver, JsonSerializer, Serializer, StorageBackend};
use crate::storage::memory::{MemoryDriver, MEMORY_DRIVER};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, trace};

/// Database name used when none is configured.
pub const DEFAULT_NAME: &str = "expirykv";

/// Store name used when none is configured.
pub const DEFAULT_STORE_NAME: &str = "keyvaluepairs";

type DriverRegistry = RwLock<HashMap<String, Arc<dyn Driver>>>;

/// Multi-driver key/value engine.
///
/// # Example
///
/// ```
/// use expirykv::storage::{StorageBackend, StorageEngine};
/// use expirykv::config::StoreOptions;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let engine = StorageEngine::with_options(StoreOptions::new().with_name("app"));
///
/// engine.set_item("greeting", json!("hello")).await.unwrap();
/// assert_eq!(engine.get_item("greeting").await.unwrap(), Some(json!("hello")));
/// assert_eq!(engine.driver().as_deref(), Some("memoryStorage"));
/// # });
/// ```
pub struct StorageEngine {
    options: RwLock<StoreOptions>,
    drivers: Arc<DriverRegistry>,
    active: RwLock<Option<Arc<dyn Driver>>>,
    serializer: Arc<dyn Serializer>,
    memory: Arc<MemoryDriver>,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("namespace", &self.namespace())
            .field("driver", &self.driver())
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an engine with default options and the built-in memory driver.
    pub fn new() -> Self {
        Self::with_options(StoreOptions::default())
    }

    /// Creates an engine with the given options and the built-in memory driver.
    pub fn with_options(options: StoreOptions) -> Self {
        let memory = Arc::new(MemoryDriver::new());

        let mut drivers: HashMap<String, Arc<dyn Driver>> = HashMap::new();
        drivers.insert(MEMORY_DRIVER.to_string(), memory.clone() as Arc<dyn Driver>);

        Self {
            options: RwLock::new(sanitize(options)),
            drivers: Arc::new(RwLock::new(drivers)),
            active: RwLock::new(None),
            serializer: Arc::new(JsonSerializer),
            memory,
        }
    }

    /// Replaces the serializer values go through.
    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// The built-in memory driver, shared with every instance created from this
    /// engine.
    pub fn memory(&self) -> &Arc<MemoryDriver> {
        &self.memory
    }

    /// Namespace this engine reads and writes: `"<name>/<store_name>"`.
    pub fn namespace(&self) -> String {
        let options = self.resolved_options();
        format!(
            "{}/{}",
            options.name.as_deref().unwrap_or(DEFAULT_NAME),
            options.store_name.as_deref().unwrap_or(DEFAULT_STORE_NAME)
        )
    }

    /// Current options with defaults filled in.
    pub fn resolved_options(&self) -> StoreOptions {
        let mut options = self
            .options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        options.name.get_or_insert_with(|| DEFAULT_NAME.to_string());
        options
            .store_name
            .get_or_insert_with(|| DEFAULT_STORE_NAME.to_string());
        options
            .driver
            .get_or_insert_with(|| vec![MEMORY_DRIVER.to_string()]);
        options
    }

    fn is_ready(&self) -> bool {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn lookup(&self, name: &str) -> Option<Arc<dyn Driver>> {
        self.drivers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Returns the active driver, selecting one first if needed.
    fn active_driver(&self) -> StorageResult<Arc<dyn Driver>> {
        if let Some(driver) = self
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(Arc::clone(driver));
        }

        self.select_driver()
    }

    /// Picks the first defined and supported driver in preference order.
    fn select_driver(&self) -> StorageResult<Arc<dyn Driver>> {
        let preferred = self.resolved_options().driver.unwrap_or_default();

        let selected = preferred
            .iter()
            .filter_map(|name| self.lookup(name))
            .find(|driver| driver.is_supported())
            .ok_or_else(|| StorageError::NoSupportedDriver(preferred.clone()))?;

        debug!(
            driver = selected.name(),
            namespace = %self.namespace(),
            "Storage driver selected"
        );

        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&selected));
        Ok(selected)
    }

    fn apply(&self, options: StoreOptions) -> StorageResult<ConfigResponse> {
        let options = sanitize(options);

        if self.is_ready() {
            let resolved = self.resolved_options();
            if options.name.is_some() && options.name != resolved.name {
                return Err(StorageError::ConfigLocked("name"));
            }
            if options.store_name.is_some() && options.store_name != resolved.store_name {
                return Err(StorageError::ConfigLocked("storeName"));
            }
            if options.driver.is_some() && options.driver != resolved.driver {
                return Err(StorageError::ConfigLocked("driver"));
            }
        }

        let mut current = self.options.write().unwrap_or_else(PoisonError::into_inner);
        current.merge(&options);
        trace!(options = ?*current, "Storage options applied");

        Ok(ConfigResponse::Applied)
    }
}

/// Replaces every character of the store name that is not a word character.
fn sanitize(mut options: StoreOptions) -> StoreOptions {
    if let Some(store_name) = options.store_name.as_mut() {
        *store_name = store_name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
    }
    options
}

#[async_trait]
impl StorageBackend for StorageEngine {
    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>> {
        let driver = self.active_driver()?;

        match driver.get(&self.namespace(), key).await? {
            Some(bytes) => self.serializer.deserialize(&bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn set_item(&self, key: &str, value: Value) -> StorageResult<()> {
        let driver = self.active_driver()?;
        let bytes = self.serializer.serialize(&value)?;

        driver.set(&self.namespace(), key, bytes).await
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        let driver = self.active_driver()?;
        driver.remove(&self.namespace(), key).await
    }

    async fn clear(&self) -> StorageResult<()> {
        let driver = self.active_driver()?;
        driver.clear(&self.namespace()).await
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        let driver = self.active_driver()?;
        driver.keys(&self.namespace()).await
    }

    fn config(&self, request: ConfigRequest) -> StorageResult<ConfigResponse> {
        match request {
            ConfigRequest::Current => Ok(ConfigResponse::Current(self.resolved_options())),
            ConfigRequest::Get(field) => {
                Ok(ConfigResponse::Value(self.resolved_options().field(&field)))
            }
            ConfigRequest::Apply(options) => self.apply(options),
        }
    }

    async fn ready(&self) -> StorageResult<()> {
        self.active_driver().map(|_| ())
    }

    fn supports(&self, driver_name: &str) -> bool {
        self.lookup(driver_name)
            .map(|driver| driver.is_supported())
            .unwrap_or(false)
    }

    fn driver(&self) -> Option<String> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|driver| driver.name().to_string())
    }

    async fn get_driver(&self, name: &str) -> StorageResult<Arc<dyn Driver>> {
        self.lookup(name)
            .ok_or_else(|| StorageError::DriverNotFound(name.to_string()))
    }

    async fn set_driver(&self, names: &[String]) -> StorageResult<()> {
        self.options
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .driver = Some(names.to_vec());
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = None;

        self.select_driver().map(|_| ())
    }

    fn get_serializer(&self) -> Arc<dyn Serializer> {
        Arc::clone(&self.serializer)
    }

    async fn define_driver(&self, driver: Arc<dyn Driver>) -> StorageResult<()> {
        let name = driver.name().to_string();
        if name.is_empty() {
            return Err(StorageError::InvalidDriver(
                "driver name must not be empty".to_string(),
            ));
        }

        let replaced = self
            .drivers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), driver)
            .is_some();

        debug!(driver = %name, replaced, "Storage driver defined");
        Ok(())
    }

    fn create_instance(&self, options: StoreOptions) -> StorageResult<Self> {
        Ok(Self {
            options: RwLock::new(sanitize(options)),
            drivers: Arc::clone(&self.drivers),
            active: RwLock::new(None),
            serializer: Arc::clone(&self.serializer),
            memory: Arc::clone(&self.memory),
        })
    }
}
