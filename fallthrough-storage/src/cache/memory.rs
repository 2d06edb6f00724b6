//! In-memory blob store.
//!
//! A `HashMap` behind an `RwLock`. Suitable as a fallback stand-in in tests,
//! as a throwaway main store, or for development without LMDB on disk.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use fallthrough_core::{compute_checksum, FallthroughResult, Metadata, StoreError, Timestamp};

use super::traits::{BlobInfo, BlobStore, DirectoryListing};

#[derive(Debug, Clone)]
struct StoredBlob {
    content: Vec<u8>,
    modified_at: Timestamp,
}

impl StoredBlob {
    fn new(content: Vec<u8>) -> Self {
        Self {
            content,
            modified_at: Utc::now(),
        }
    }
}

/// In-memory [`BlobStore`].
///
/// Clones share the same underlying map.
///
/// # Example
///
/// ```rust,ignore
/// use fallthrough_storage::{BlobStore, InMemoryBlobStore};
///
/// let store = InMemoryBlobStore::new();
/// store.write("greeting", b"hello", None).await?;
/// assert_eq!(store.read("greeting").await?, b"hello");
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, StoredBlob>>>,
}

impl InMemoryBlobStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `entries`.
    pub fn with_entries<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Vec<u8>>,
        I: IntoIterator<Item = (K, V)>,
    {
        let blobs = entries
            .into_iter()
            .map(|(k, v)| (k.into(), StoredBlob::new(v.into())))
            .collect();
        Self {
            blobs: Arc::new(RwLock::new(blobs)),
        }
    }

    /// Insert a blob synchronously.
    pub fn insert(&self, key: impl Into<String>, content: impl Into<Vec<u8>>) -> FallthroughResult<()> {
        self.write_lock()?
            .insert(key.into(), StoredBlob::new(content.into()));
        Ok(())
    }

    /// Number of stored blobs.
    pub fn len(&self) -> FallthroughResult<usize> {
        Ok(self.read_lock()?.len())
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> FallthroughResult<bool> {
        Ok(self.read_lock()?.is_empty())
    }

    /// Remove every blob.
    pub fn clear(&self) -> FallthroughResult<()> {
        self.write_lock()?.clear();
        Ok(())
    }

    /// Sorted snapshot of every stored key.
    pub fn snapshot_keys(&self) -> FallthroughResult<Vec<String>> {
        let mut keys: Vec<String> = self.read_lock()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn read_lock(&self) -> FallthroughResult<RwLockReadGuard<'_, HashMap<String, StoredBlob>>> {
        self.blobs
            .read()
            .map_err(|_| StoreError::LockPoisoned.into())
    }

    fn write_lock(&self) -> FallthroughResult<RwLockWriteGuard<'_, HashMap<String, StoredBlob>>> {
        self.blobs
            .write()
            .map_err(|_| StoreError::LockPoisoned.into())
    }

    fn get(&self, key: &str) -> FallthroughResult<StoredBlob> {
        self.read_lock()?
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(key).into())
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn read(&self, key: &str) -> FallthroughResult<Vec<u8>> {
        Ok(self.get(key)?.content)
    }

    async fn write(
        &self,
        key: &str,
        content: &[u8],
        _metadata: Option<&Metadata>,
    ) -> FallthroughResult<()> {
        self.insert(key, content)
    }

    async fn delete(&self, key: &str) -> FallthroughResult<()> {
        match self.write_lock()?.remove(key) {
            Some(_) => Ok(()),
            None => Err(StoreError::not_found(key).into()),
        }
    }

    async fn exists(&self, key: &str) -> FallthroughResult<bool> {
        Ok(self.read_lock()?.contains_key(key))
    }

    async fn keys(&self, prefix: &str) -> FallthroughResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .read_lock()?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn rename(&self, from: &str, to: &str) -> FallthroughResult<()> {
        let mut blobs = self.write_lock()?;
        let blob = blobs
            .remove(from)
            .ok_or_else(|| StoreError::not_found(from))?;
        blobs.insert(to.to_string(), StoredBlob::new(blob.content));
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> FallthroughResult<()> {
        let blob = self.get(from)?;
        self.insert(to, blob.content)
    }

    async fn mtime(&self, key: &str) -> FallthroughResult<Timestamp> {
        Ok(self.get(key)?.modified_at)
    }

    async fn checksum(&self, key: &str) -> FallthroughResult<String> {
        Ok(compute_checksum(&self.get(key)?.content))
    }

    async fn list_directory(&self, directory: &str) -> FallthroughResult<DirectoryListing> {
        let base = directory.trim_end_matches('/');
        let prefix = if base.is_empty() {
            String::new()
        } else {
            format!("{}/", base)
        };

        let mut keys = BTreeSet::new();
        let mut dirs = BTreeSet::new();
        for key in self.read_lock()?.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    dirs.insert(format!("{}{}", prefix, dir));
                }
                None => {
                    keys.insert(key.clone());
                }
            }
        }

        Ok(DirectoryListing {
            keys: keys.into_iter().collect(),
            dirs: dirs.into_iter().collect(),
        })
    }

    async fn file(&self, key: &str) -> FallthroughResult<BlobInfo> {
        let blob = self.get(key)?;
        Ok(BlobInfo {
            key: key.to_string(),
            size: blob.content.len() as u64,
            modified_at: blob.modified_at,
            checksum: compute_checksum(&blob.content),
        })
    }
}
