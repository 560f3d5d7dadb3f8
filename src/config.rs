//! Store Configuration
//!
//! [`StoreOptions`] carries the backend's own options (namespace, driver order,
//! description...) together with the expiring layer's `default_expiration`. The
//! whole object travels to the backend; the expiring store only reads
//! `default_expiration` back out of it.
//!
//! Options serialize in camelCase:
//!
//! ```text
//! { "name": "app", "storeName": "cache", "driver": ["memoryStorage"],
//!   "defaultExpiration": 60000 }
//! ```
//!
//! `defaultExpiration` is a number of milliseconds or the string `"Infinity"`.

use crate::storage::expiry::{now_millis, Expiration, NEVER_MARKER};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Expiration applied to entries saved without an explicit one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefaultExpiration {
    /// Entries never expire
    #[default]
    Never,
    /// Entries expire this long after they are saved
    After(Duration),
}

impl DefaultExpiration {
    /// Default expiration of `ms` milliseconds.
    pub fn from_millis(ms: u64) -> Self {
        DefaultExpiration::After(Duration::from_millis(ms))
    }

    /// The expiration of an entry saved at `now_ms`.
    pub fn expiration_from(&self, now_ms: i64) -> Expiration {
        match self {
            DefaultExpiration::Never => Expiration::Never,
            DefaultExpiration::After(ttl) => {
                let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
                Expiration::At(now_ms.saturating_add(ttl_ms))
            }
        }
    }

    /// The expiration of an entry saved right now.
    pub fn expiration(&self) -> Expiration {
        self.expiration_from(now_millis())
    }
}

impl fmt::Display for DefaultExpiration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultExpiration::Never => write!(f, "never"),
            DefaultExpiration::After(ttl) => write!(f, "{}ms", ttl.as_millis()),
        }
    }
}

impl FromStr for DefaultExpiration {
    type Err = String;

    /// Parses `"never"`, `"Infinity"` or a number of milliseconds.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("never") || s == NEVER_MARKER {
            return Ok(DefaultExpiration::Never);
        }
        s.parse::<u64>()
            .map(DefaultExpiration::from_millis)
            .map_err(|_| format!("invalid expiration '{}': expected milliseconds or 'never'", s))
    }
}

impl Serialize for DefaultExpiration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DefaultExpiration::Never => serializer.serialize_str(NEVER_MARKER),
            DefaultExpiration::After(ttl) => {
                serializer.serialize_u64(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX))
            }
        }
    }
}

impl<'de> Deserialize<'de> for DefaultExpiration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Millis(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(DefaultExpiration::from_millis(ms)),
            Raw::Text(text) => text.parse().map_err(de::Error::custom),
        }
    }
}

/// Options understood by a storage backend and the expiring store.
///
/// Every field is optional; a backend fills the gaps with its own defaults.
///
/// # Example
///
/// ```
/// use expirykv::config::{DefaultExpiration, StoreOptions};
///
/// let options = StoreOptions::new()
///     .with_name("app")
///     .with_store_name("sessions")
///     .with_default_expiration(DefaultExpiration::from_millis(60_000));
///
/// assert_eq!(options.store_name.as_deref(), Some("sessions"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreOptions {
    /// Database name, first half of the namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Store name, second half of the namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,

    /// Drivers to try, in order of preference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<f64>,

    /// Size hint in bytes, for drivers that reserve space up front
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Expiration of entries saved without an explicit one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_expiration: Option<DefaultExpiration>,
}

impl StoreOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_store_name(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = Some(store_name.into());
        self
    }

    /// Sets the driver preference order.
    pub fn with_driver<I, S>(mut self, drivers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.driver = Some(drivers.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default_expiration(mut self, expiration: DefaultExpiration) -> Self {
        self.default_expiration = Some(expiration);
        self
    }

    /// Overwrites every field that `other` sets.
    pub fn merge(&mut self, other: &StoreOptions) {
        if other.name.is_some() {
            self.name = other.name.clone();
        }
        if other.store_name.is_some() {
            self.store_name = other.store_name.clone();
        }
        if other.driver.is_some() {
            self.driver = other.driver.clone();
        }
        if other.description.is_some() {
            self.description = other.description.clone();
        }
        if other.version.is_some() {
            self.version = other.version;
        }
        if other.size.is_some() {
            self.size = other.size;
        }
        if other.default_expiration.is_some() {
            self.default_expiration = other.default_expiration;
        }
    }

    /// Looks up a single option by its camelCase name.
    pub fn field(&self, name: &str) -> Option<Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut fields)) => fields.remove(name),
            _ => None,
        }
    }
}

/// A call to a backend's configuration entry point.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigRequest {
    /// Return the whole current configuration
    Current,
    /// Return a single option by its camelCase name
    Get(String),
    /// Merge options into the current configuration
    Apply(StoreOptions),
}

/// What a backend's configuration entry point answered.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigResponse {
    /// Options were applied
    Applied,
    /// The whole current configuration
    Current(StoreOptions),
    /// A single option, `None` if unset or unknown
    Value(Option<Value>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_expiration_parse() {
        assert_eq!("never".parse::<DefaultExpiration>(), Ok(DefaultExpiration::Never));
        assert_eq!("Infinity".parse::<DefaultExpiration>(), Ok(DefaultExpiration::Never));
        assert_eq!("1500".parse::<DefaultExpiration>(), Ok(DefaultExpiration::from_millis(1500)));
        assert!("soon".parse::<DefaultExpiration>().is_err());
        assert!("-5".parse::<DefaultExpiration>().is_err());
    }

    #[test]
    fn test_default_expiration_from_now() {
        assert_eq!(
            DefaultExpiration::Never.expiration_from(1000),
            Expiration::Never
        );
        assert_eq!(
            DefaultExpiration::from_millis(500).expiration_from(1000),
            Expiration::At(1500)
        );
    }

    #[test]
    fn test_options_serialize_camel_case() {
        let options = StoreOptions::new()
            .with_store_name("cache")
            .with_default_expiration(DefaultExpiration::from_millis(60_000));

        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(
            value,
            json!({ "storeName": "cache", "defaultExpiration": 60000 })
        );
    }

    #[test]
    fn test_options_deserialize_infinity() {
        let options: StoreOptions =
            serde_json::from_value(json!({ "name": "app", "defaultExpiration": "Infinity" }))
                .unwrap();

        assert_eq!(options.name.as_deref(), Some("app"));
        assert_eq!(options.default_expiration, Some(DefaultExpiration::Never));
    }

    #[test]
    fn test_merge_only_overwrites_set_fields() {
        let mut base = StoreOptions::new()
            .with_name("app")
            .with_description("first");
        base.merge(&StoreOptions::new().with_description("second"));

        assert_eq!(base.name.as_deref(), Some("app"));
        assert_eq!(base.description.as_deref(), Some("second"));
        assert_eq!(base.default_expiration, None);
    }

    #[test]
    fn test_field_lookup() {
        let options = StoreOptions::new()
            .with_name("app")
            .with_driver(["memoryStorage"]);

        assert_eq!(options.field("name"), Some(json!("app")));
        assert_eq!(options.field("driver"), Some(json!(["memoryStorage"])));
        assert_eq!(options.field("storeName"), None);
        assert_eq!(options.field("bogus"), None);
    }
}
