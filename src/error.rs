//! Error Types
//!
//! Two layers of errors exist in expirykv:
//!
//! - [`StorageError`] is raised by a [`StorageBackend`](crate::storage::StorageBackend)
//!   or one of its drivers. Passthrough operations on the expiring store return it
//!   untouched.
//! - [`StoreError`] is raised by the expiring store's own operations and wraps the
//!   backend cause together with the key that was being read or written.
//!
//! Missing or expired keys are never errors. Only infrastructure failures are.

use thiserror::Error;

/// Errors raised by a storage backend or one of its drivers.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A driver rejected an operation (I/O, quota, corruption...)
    #[error("driver '{driver}' failed: {message}")]
    Driver { driver: String, message: String },

    /// None of the configured drivers is defined and supported
    #[error("no supported driver available (tried {0:?})")]
    NoSupportedDriver(Vec<String>),

    /// The requested driver was never defined
    #[error("driver '{0}' is not defined")]
    DriverNotFound(String),

    /// A driver definition was rejected
    #[error("invalid driver definition: {0}")]
    InvalidDriver(String),

    /// The option can no longer change because the backend is in use
    #[error("can't change '{0}' after the storage has been used")]
    ConfigLocked(&'static str),

    /// A value could not be serialized or deserialized
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Creates a driver failure.
    pub fn driver(driver: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::Driver {
            driver: driver.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by [`ExpiringStore`](crate::storage::ExpiringStore) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Keys must be non-empty strings
    #[error("key must not be empty")]
    EmptyKey,

    /// The backend failed to read the value or its expiration
    #[error("storage read failed for '{key}': {source}")]
    Read {
        key: String,
        #[source]
        source: StorageError,
    },

    /// The backend failed to write or remove the value or its expiration
    #[error("storage write failed for '{key}': {source}")]
    Write {
        key: String,
        #[source]
        source: StorageError,
    },
}

impl StoreError {
    pub(crate) fn read(key: &str, source: StorageError) -> Self {
        StoreError::Read {
            key: key.to_string(),
            source,
        }
    }

    pub(crate) fn write(key: &str, source: StorageError) -> Self {
        StoreError::Write {
            key: key.to_string(),
            source,
        }
    }
}

/// Result type for backend operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for expiring store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_driver_error_display() {
        let err = StorageError::driver("memoryStorage", "quota exceeded");
        assert_eq!(
            err.to_string(),
            "driver 'memoryStorage' failed: quota exceeded"
        );
    }

    #[test]
    fn test_store_error_keeps_source() {
        let err = StoreError::write("session", StorageError::driver("disk", "full"));
        assert!(err.to_string().contains("session"));

        let source = err.source().expect("write errors carry their cause");
        assert_eq!(source.to_string(), "driver 'disk' failed: full");
    }

    #[test]
    fn test_config_locked_display() {
        let err = StorageError::ConfigLocked("storeName");
        assert_eq!(
            err.to_string(),
            "can't change 'storeName' after the storage has been used"
        );
    }
}
