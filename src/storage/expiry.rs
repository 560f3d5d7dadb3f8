//! Expiration Metadata
//!
//! Every entry written through the [`ExpiringStore`](super::ExpiringStore) gets a
//! companion "shadow" entry holding the instant at which it expires. This module
//! defines that instant, how it is encoded in the backend, and how the shadow key
//! is derived from the entry's key.
//!
//! ## Shadow Keys
//!
//! ```text
//!   key:         "session"
//!   sha256:      "3f1c7c4e..."   (hex of the key's UTF-8 bytes)
//!   shadow key:  "session_expires_3f1c7c4e"
//! ```
//!
//! The hash fragment keeps a key's shadow entry apart from shadows of shadows when
//! keys are chained. It is a namespacing device, not a security measure.
//!
//! ## Encoding
//!
//! | Expiration      | Stored value        |
//! |-----------------|---------------------|
//! | `At(ms)`        | JSON number `ms`    |
//! | `Never`         | JSON string `"Infinity"` |
//!
//! Anything else found under a shadow key is malformed and decodes to `None`.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Separator between a key and its hash fragment in a shadow key.
pub const SHADOW_KEY_INFIX: &str = "_expires_";

/// Number of hex characters of the key digest kept in a shadow key.
pub const SHADOW_HASH_LEN: usize = 8;

/// Marker stored for entries that never expire.
pub const NEVER_MARKER: &str = "Infinity";

/// The instant at which an entry expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expiration {
    /// The entry is kept until removed
    Never,
    /// Milliseconds since the Unix epoch
    At(i64),
}

impl Expiration {
    /// Expiration at a wall-clock instant.
    pub fn at(when: SystemTime) -> Self {
        Expiration::At(system_time_millis(when))
    }

    /// Expiration `ttl` from now.
    pub fn after(ttl: Duration) -> Self {
        Expiration::At(now_millis().saturating_add(duration_millis(ttl)))
    }

    /// Checks whether this expiration has passed at `now_ms`.
    ///
    /// An entry is expired only when its timestamp is strictly before `now_ms`.
    #[inline]
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        match self {
            Expiration::Never => false,
            Expiration::At(ts) => *ts < now_ms,
        }
    }

    /// Checks whether this expiration has passed.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    /// Time left before expiry, or `None` if the entry never expires.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Expiration::Never => None,
            Expiration::At(ts) => {
                let left = ts.saturating_sub(now_millis()).max(0);
                Some(Duration::from_millis(left as u64))
            }
        }
    }

    /// Encodes the expiration the way it is stored under a shadow key.
    pub fn to_value(&self) -> Value {
        match self {
            Expiration::Never => Value::String(NEVER_MARKER.to_string()),
            Expiration::At(ts) => Value::from(*ts),
        }
    }

    /// Decodes a stored expiration.
    ///
    /// Returns `None` when the value is not a usable timestamp.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(ts) = n.as_i64() {
                    Some(Expiration::At(ts))
                } else {
                    n.as_f64()
                        .filter(|f| f.is_finite())
                        .map(|f| Expiration::At(f as i64))
                }
            }
            Value::String(s) if s == NEVER_MARKER => Some(Expiration::Never),
            // Earlier than any timestamp, so already expired
            Value::String(s) if s == "-Infinity" => Some(Expiration::At(i64::MIN)),
            Value::String(s) => s.trim().parse::<i64>().ok().map(Expiration::At),
            _ => None,
        }
    }
}

impl From<SystemTime> for Expiration {
    fn from(when: SystemTime) -> Self {
        Expiration::at(when)
    }
}

impl fmt::Display for Expiration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expiration::Never => write!(f, "never"),
            Expiration::At(ts) => write!(f, "{}", ts),
        }
    }
}

/// Derives the shadow key holding the expiration of `key`.
///
/// The result depends on `key` only, so every store instance agrees on it.
pub fn shadow_key(key: &str) -> String {
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    format!("{}{}{}", key, SHADOW_KEY_INFIX, &digest[..SHADOW_HASH_LEN])
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    system_time_millis(SystemTime::now())
}

fn system_time_millis(when: SystemTime) -> i64 {
    match when.duration_since(UNIX_EPOCH) {
        Ok(since) => duration_millis(since),
        Err(before) => duration_millis(before.duration()).saturating_neg(),
    }
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
