//! Configuration types

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, FallthroughError, FallthroughResult};
use crate::key::KeyLayout;

/// What to do when writing a fallback value back into the main store fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillPolicy {
    /// Log the failure and return the fetched content anyway.
    #[default]
    BestEffort,
    /// Fail the read with the backfill error.
    Strict,
}

/// How `keys()` combines local and fallback listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyListing {
    /// Drop fallback keys already listed from the main store.
    #[default]
    Deduplicated,
    /// Local keys followed by every non-tombstoned fallback key, duplicates kept.
    Concatenated,
}

impl std::str::FromStr for BackfillPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best_effort" | "best-effort" => Ok(BackfillPolicy::BestEffort),
            "strict" => Ok(BackfillPolicy::Strict),
            other => Err(ConfigError::InvalidValue {
                field: "backfill".to_string(),
                value: other.to_string(),
                reason: "expected best_effort or strict".to_string(),
            }),
        }
    }
}

impl std::str::FromStr for KeyListing {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deduplicated" | "dedup" => Ok(KeyListing::Deduplicated),
            "concatenated" | "concat" => Ok(KeyListing::Concatenated),
            other => Err(ConfigError::InvalidValue {
                field: "listing".to_string(),
                value: other.to_string(),
                reason: "expected deduplicated or concatenated".to_string(),
            }),
        }
    }
}

/// Configuration for the read-through cache.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Physical slot layout in the main store.
    pub layout: KeyLayout,
    /// Handling of failed backfill writes.
    pub backfill: BackfillPolicy,
    /// Merge behaviour of `keys()`.
    pub listing: KeyListing,
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key layout.
    pub fn with_layout(mut self, layout: KeyLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the backfill policy.
    pub fn with_backfill(mut self, policy: BackfillPolicy) -> Self {
        self.backfill = policy;
        self
    }

    /// Set the key listing mode.
    pub fn with_listing(mut self, listing: KeyListing) -> Self {
        self.listing = listing;
        self
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `FALLTHROUGH_LIVE_PREFIX`: live slot prefix (default: `/`)
    /// - `FALLTHROUGH_TOMBSTONE_PREFIX`: tombstone slot prefix (default: `/%deleted%/`)
    /// - `FALLTHROUGH_BACKFILL`: `best_effort` or `strict` (default: `best_effort`)
    /// - `FALLTHROUGH_KEY_LISTING`: `deduplicated` or `concatenated` (default: `deduplicated`)
    ///
    /// Unparseable policy values are reported rather than silently replaced.
    pub fn from_env() -> FallthroughResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`CacheConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> FallthroughResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = KeyLayout::default();
        let layout = KeyLayout::new(
            lookup("FALLTHROUGH_LIVE_PREFIX").unwrap_or_else(|| defaults.live_prefix().to_string()),
            lookup("FALLTHROUGH_TOMBSTONE_PREFIX")
                .unwrap_or_else(|| defaults.tombstone_prefix().to_string()),
        );

        let backfill = match lookup("FALLTHROUGH_BACKFILL") {
            Some(value) => value.parse::<BackfillPolicy>()?,
            None => BackfillPolicy::default(),
        };
        let listing = match lookup("FALLTHROUGH_KEY_LISTING") {
            Some(value) => value.parse::<KeyListing>()?,
            None => KeyListing::default(),
        };

        let config = Self {
            layout,
            backfill,
            listing,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(FallthroughError::Config) if invalid.
    pub fn validate(&self) -> FallthroughResult<()> {
        self.layout.validate().map_err(FallthroughError::Config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.layout, KeyLayout::default());
        assert_eq!(config.backfill, BackfillPolicy::BestEffort);
        assert_eq!(config.listing, KeyListing::Deduplicated);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = CacheConfig::new()
            .with_layout(KeyLayout::new("live/", "dead/"))
            .with_backfill(BackfillPolicy::Strict)
            .with_listing(KeyListing::Concatenated);

        assert_eq!(config.layout.live_prefix(), "live/");
        assert_eq!(config.layout.tombstone_prefix(), "dead/");
        assert_eq!(config.backfill, BackfillPolicy::Strict);
        assert_eq!(config.listing, KeyListing::Concatenated);
    }

    #[test]
    fn test_from_lookup_empty_uses_defaults() {
        let config = CacheConfig::from_lookup(lookup_from(&[])).expect("defaults are valid");
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = CacheConfig::from_lookup(lookup_from(&[
            ("FALLTHROUGH_LIVE_PREFIX", "live:"),
            ("FALLTHROUGH_TOMBSTONE_PREFIX", "gone:"),
            ("FALLTHROUGH_BACKFILL", "strict"),
            ("FALLTHROUGH_KEY_LISTING", "concatenated"),
        ]))
        .expect("config should be valid");

        assert_eq!(config.layout.live("k"), "live:k");
        assert_eq!(config.layout.tombstone("k"), "gone:k");
        assert_eq!(config.backfill, BackfillPolicy::Strict);
        assert_eq!(config.listing, KeyListing::Concatenated);
    }

    #[test]
    fn test_from_lookup_rejects_unknown_policy() {
        let err = CacheConfig::from_lookup(lookup_from(&[("FALLTHROUGH_BACKFILL", "sometimes")]))
            .expect_err("unknown policy should fail");
        assert!(matches!(err, FallthroughError::Config(_)));
    }

    #[test]
    fn test_from_lookup_rejects_invalid_layout() {
        let err = CacheConfig::from_lookup(lookup_from(&[("FALLTHROUGH_LIVE_PREFIX", "")]))
            .expect_err("empty prefix should fail");
        assert!(matches!(err, FallthroughError::Config(_)));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("best-effort".parse::<BackfillPolicy>(), Ok(BackfillPolicy::BestEffort));
        assert_eq!(" STRICT ".parse::<BackfillPolicy>(), Ok(BackfillPolicy::Strict));
        assert_eq!("dedup".parse::<KeyListing>(), Ok(KeyListing::Deduplicated));
        assert!("maybe".parse::<KeyListing>().is_err());
    }
}
