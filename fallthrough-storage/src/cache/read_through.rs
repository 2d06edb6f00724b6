//! Tombstone-aware read-through cache.
//!
//! This module implements the core caching logic: reads prefer the main
//! store and backfill it from the fallback store on a miss, writes and
//! deletes only ever touch the main store, and explicit deletes are recorded
//! as tombstones that mask the fallback.
//!
//! # Slot Layout
//!
//! For a logical key `k` the main store holds at most two entries, addressed
//! through [`KeyLayout`]:
//!
//! - live slot (`/k` by default): the current value
//! - tombstone slot (`/%deleted%/k` by default): marker of an explicit delete
//!
//! The fallback store is addressed with `k` verbatim and is never written.
//!
//! # Atomicity
//!
//! Every operation is a short sequence of awaited store calls with no locking.
//! Write-then-clear-tombstone, tombstone-then-remove-live and
//! fetch-then-backfill are not atomic; a concurrent caller working on the same
//! key may observe both slots present or neither. Delete writes the tombstone
//! before removing the live slot so that an interrupted delete still reads as
//! deleted.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use fallthrough_core::{
    BackfillPolicy, CacheConfig, FallthroughResult, KeyLayout, KeyListing, Metadata, StoreError,
    Timestamp,
};
use tracing::{debug, warn};

use super::traits::{unsupported, BlobInfo, BlobStore, DirectoryListing};

/// Read-through cache over a main and a fallback [`BlobStore`].
///
/// # Type Parameters
///
/// - `M`: the fast local store that receives writes, backfills and tombstones
/// - `F`: the authoritative store consulted on a local miss (read-only here)
///
/// # Example
///
/// ```ignore
/// let cache = ReadThroughCache::with_defaults(Arc::new(local), Arc::new(remote));
///
/// cache.write("a", b"v0", None).await?;
/// cache.delete("a").await?;
/// assert!(cache.read("a").await.unwrap_err().is_not_found()); // even if `remote` has "a"
/// ```
pub struct ReadThroughCache<M, F>
where
    M: BlobStore,
    F: BlobStore,
{
    /// The fast local store.
    main: Arc<M>,
    /// The authoritative store.
    fallback: Arc<F>,
    /// Cache configuration.
    config: CacheConfig,
}

impl<M, F> ReadThroughCache<M, F>
where
    M: BlobStore,
    F: BlobStore,
{
    /// Create a new read-through cache.
    ///
    /// Fails if the configuration does not validate.
    pub fn new(main: Arc<M>, fallback: Arc<F>, config: CacheConfig) -> FallthroughResult<Self> {
        config.validate()?;
        Ok(Self {
            main,
            fallback,
            config,
        })
    }

    /// Create a new read-through cache with default configuration.
    pub fn with_defaults(main: Arc<M>, fallback: Arc<F>) -> Self {
        Self {
            main,
            fallback,
            config: CacheConfig::default(),
        }
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a reference to the main store.
    pub fn main(&self) -> &M {
        &self.main
    }

    /// Get a reference to the fallback store.
    pub fn fallback(&self) -> &F {
        &self.fallback
    }

    fn layout(&self) -> &KeyLayout {
        &self.config.layout
    }

    /// Whether the main store holds a tombstone for `key`.
    async fn is_tombstoned(&self, key: &str) -> FallthroughResult<bool> {
        self.main.exists(&self.layout().tombstone(key)).await
    }

    /// Write fetched fallback content into the live slot.
    async fn backfill(&self, key: &str, live: &str, content: &[u8]) -> FallthroughResult<()> {
        match self.main.write(live, content, None).await {
            Ok(()) => {
                debug!(key = %key, bytes = content.len(), "backfilled main store");
                Ok(())
            }
            Err(e) => match self.config.backfill {
                BackfillPolicy::BestEffort => {
                    warn!(key = %key, error = %e, "backfill failed, serving fallback content");
                    Ok(())
                }
                BackfillPolicy::Strict => Err(e),
            },
        }
    }
}

/// Treat `NotFound` from an auxiliary delete as success.
fn ignore_not_found(result: FallthroughResult<()>) -> FallthroughResult<()> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

#[async_trait]
impl<M, F> BlobStore for ReadThroughCache<M, F>
where
    M: BlobStore,
    F: BlobStore,
{
    /// Read `key`, preferring the main store.
    ///
    /// 1. Live slot present: serve it.
    /// 2. Tombstone present: `NotFound`, the fallback is not consulted.
    /// 3. Otherwise read the fallback, backfill the live slot, return the content.
    ///
    /// Fallback failures propagate unchanged. Backfill failures follow
    /// [`BackfillPolicy`].
    async fn read(&self, key: &str) -> FallthroughResult<Vec<u8>> {
        self.layout().validate_logical(key)?;
        let live = self.layout().live(key);

        if self.main.exists(&live).await? {
            debug!(key = %key, "read served from main store");
            return self.main.read(&live).await;
        }

        if self.is_tombstoned(key).await? {
            debug!(key = %key, "read hit tombstone");
            return Err(StoreError::not_found(key).into());
        }

        debug!(key = %key, "main store miss, reading fallback");
        let content = self.fallback.read(key).await?;
        self.backfill(key, &live, &content).await?;
        Ok(content)
    }

    /// Write `key` to the main store and clear any tombstone.
    ///
    /// `metadata` is accepted and ignored.
    async fn write(
        &self,
        key: &str,
        content: &[u8],
        _metadata: Option<&Metadata>,
    ) -> FallthroughResult<()> {
        self.layout().validate_logical(key)?;

        self.main.write(&self.layout().live(key), content, None).await?;
        ignore_not_found(self.main.delete(&self.layout().tombstone(key)).await)
    }

    /// Tombstone `key` and remove its live slot.
    ///
    /// Deleting a key that exists nowhere still records the tombstone and
    /// succeeds.
    async fn delete(&self, key: &str) -> FallthroughResult<()> {
        self.layout().validate_logical(key)?;
        let layout = self.layout();

        self.main
            .write(&layout.tombstone(key), layout.tombstone_payload(), None)
            .await?;
        debug!(key = %key, "tombstone written");

        ignore_not_found(self.main.delete(&layout.live(key)).await)
    }

    /// Check whether `key` is visible through the cache.
    ///
    /// A tombstone masks the fallback. Backend failures from either store
    /// propagate.
    async fn exists(&self, key: &str) -> FallthroughResult<bool> {
        self.layout().validate_logical(key)?;

        if self.main.exists(&self.layout().live(key)).await? {
            return Ok(true);
        }
        if self.is_tombstoned(key).await? {
            return Ok(false);
        }
        self.fallback.exists(key).await
    }

    /// List logical keys under `prefix`.
    ///
    /// Local live keys come first, followed by fallback keys that have no
    /// local tombstone. With [`KeyListing::Deduplicated`] fallback keys that
    /// were already listed locally are skipped. Keys that could not be
    /// addressed through the cache (see [`KeyLayout::validate_logical`]) are
    /// left out.
    async fn keys(&self, prefix: &str) -> FallthroughResult<Vec<String>> {
        let layout = self.layout();
        let dedup = self.config.listing == KeyListing::Deduplicated;

        let mut result: Vec<String> = self
            .main
            .keys(&layout.live(prefix))
            .await?
            .iter()
            .filter_map(|physical| layout.logical_from_live(physical))
            .filter(|key| layout.validate_logical(key).is_ok())
            .map(str::to_string)
            .collect();

        let mut seen: HashSet<String> = if dedup {
            result.iter().cloned().collect()
        } else {
            HashSet::new()
        };

        for key in self.fallback.keys(prefix).await? {
            if dedup && seen.contains(&key) {
                continue;
            }
            if let Err(e) = layout.validate_logical(&key) {
                debug!(key = %key, error = %e, "skipping unaddressable fallback key");
                continue;
            }
            if self.is_tombstoned(&key).await? {
                continue;
            }
            if dedup {
                seen.insert(key.clone());
            }
            result.push(key);
        }

        Ok(result)
    }

    async fn rename(&self, _from: &str, _to: &str) -> FallthroughResult<()> {
        Err(unsupported("rename"))
    }

    async fn copy(&self, _from: &str, _to: &str) -> FallthroughResult<()> {
        Err(unsupported("copy"))
    }

    async fn mtime(&self, _key: &str) -> FallthroughResult<Timestamp> {
        Err(unsupported("mtime"))
    }

    async fn checksum(&self, _key: &str) -> FallthroughResult<String> {
        Err(unsupported("checksum"))
    }

    async fn list_directory(&self, _directory: &str) -> FallthroughResult<DirectoryListing> {
        Err(unsupported("list_directory"))
    }

    async fn file(&self, _key: &str) -> FallthroughResult<BlobInfo> {
        Err(unsupported("file"))
    }

    fn supports_metadata(&self) -> bool {
        false
    }
}

impl<M, F> Clone for ReadThroughCache<M, F>
where
    M: BlobStore,
    F: BlobStore,
{
    fn clone(&self) -> Self {
        Self {
            main: Arc::clone(&self.main),
            fallback: Arc::clone(&self.fallback),
            config: self.config.clone(),
        }
    }
}
