//! Physical key layout for the main store.
//!
//! Every logical key owns two slots in the main store: a live slot holding
//! the current value and a tombstone slot recording an explicit delete. The
//! fallback store is always addressed with the logical key verbatim.
//!
//! With the default prefixes the tombstone namespace is nested inside the
//! live namespace (`/%deleted%/k` starts with `/`), so a prefix scan of live
//! slots also returns tombstones. [`KeyLayout::logical_from_live`] is the
//! single place that tells the two apart.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StoreError};

/// Prefix of the live slot.
pub const DEFAULT_LIVE_PREFIX: &str = "/";

/// Prefix of the tombstone slot.
pub const DEFAULT_TOMBSTONE_PREFIX: &str = "/%deleted%/";

/// Content written into a tombstone slot. Only its presence is consulted.
pub const DEFAULT_TOMBSTONE_PAYLOAD: &[u8] = b"deleted";

/// Mapping from logical keys to physical slots in the main store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyLayout {
    live_prefix: String,
    tombstone_prefix: String,
    tombstone_payload: Vec<u8>,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self {
            live_prefix: DEFAULT_LIVE_PREFIX.to_string(),
            tombstone_prefix: DEFAULT_TOMBSTONE_PREFIX.to_string(),
            tombstone_payload: DEFAULT_TOMBSTONE_PAYLOAD.to_vec(),
        }
    }
}

impl KeyLayout {
    /// Create a layout with custom prefixes and the default tombstone payload.
    pub fn new(live_prefix: impl Into<String>, tombstone_prefix: impl Into<String>) -> Self {
        Self {
            live_prefix: live_prefix.into(),
            tombstone_prefix: tombstone_prefix.into(),
            tombstone_payload: DEFAULT_TOMBSTONE_PAYLOAD.to_vec(),
        }
    }

    /// Set the tombstone payload.
    pub fn with_tombstone_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.tombstone_payload = payload.into();
        self
    }

    pub fn live_prefix(&self) -> &str {
        &self.live_prefix
    }

    pub fn tombstone_prefix(&self) -> &str {
        &self.tombstone_prefix
    }

    pub fn tombstone_payload(&self) -> &[u8] {
        &self.tombstone_payload
    }

    /// Physical key of the live slot for `key`.
    pub fn live(&self, key: &str) -> String {
        let mut physical = String::with_capacity(self.live_prefix.len() + key.len());
        physical.push_str(&self.live_prefix);
        physical.push_str(key);
        physical
    }

    /// Physical key of the tombstone slot for `key`.
    pub fn tombstone(&self, key: &str) -> String {
        let mut physical = String::with_capacity(self.tombstone_prefix.len() + key.len());
        physical.push_str(&self.tombstone_prefix);
        physical.push_str(key);
        physical
    }

    /// Recover the logical key from a physical live-slot key.
    ///
    /// Returns `None` for tombstone slots and for keys outside the live
    /// namespace.
    pub fn logical_from_live<'a>(&self, physical: &'a str) -> Option<&'a str> {
        if physical.starts_with(&self.tombstone_prefix) {
            return None;
        }
        physical.strip_prefix(&self.live_prefix)
    }

    /// Check that `key` can be stored without colliding with the tombstone
    /// namespace.
    pub fn validate_logical(&self, key: &str) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: "key must not be empty".to_string(),
            });
        }
        if self.live(key).starts_with(&self.tombstone_prefix) {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: format!(
                    "live slot would fall inside the tombstone namespace {:?}",
                    self.tombstone_prefix
                ),
            });
        }
        Ok(())
    }

    /// Validate the layout itself.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.live_prefix.is_empty() {
            return Err(invalid("layout.live_prefix", &self.live_prefix, "must not be empty"));
        }
        if self.tombstone_prefix.is_empty() {
            return Err(invalid(
                "layout.tombstone_prefix",
                &self.tombstone_prefix,
                "must not be empty",
            ));
        }
        if self.live_prefix.starts_with(&self.tombstone_prefix) {
            return Err(invalid(
                "layout.tombstone_prefix",
                &self.tombstone_prefix,
                "must not be a prefix of the live prefix",
            ));
        }
        if self.tombstone_payload.is_empty() {
            return Err(invalid("layout.tombstone_payload", "", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
