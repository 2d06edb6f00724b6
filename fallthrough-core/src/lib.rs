//! Fallthrough Core - Shared Types
//!
//! Error taxonomy, physical key layout and cache configuration shared by the
//! storage crate and its test utilities. Contains no I/O.

pub mod config;
pub mod error;
pub mod key;

pub use config::{BackfillPolicy, CacheConfig, KeyListing};
pub use error::{ConfigError, FallthroughError, FallthroughResult, StoreError};
pub use key::{KeyLayout, DEFAULT_LIVE_PREFIX, DEFAULT_TOMBSTONE_PAYLOAD, DEFAULT_TOMBSTONE_PREFIX};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Free-form blob attributes accepted by `write`.
///
/// None of the stores in this workspace persist metadata; the parameter
/// exists so callers can target the same signature across backends.
pub type Metadata = BTreeMap<String, String>;

/// Compute the hex-encoded SHA-256 digest of blob content.
pub fn compute_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
