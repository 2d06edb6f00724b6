//! Blob store capability contract.
//!
//! This module defines the trait every store plugged into the read-through
//! cache must implement, plus the small value types returned by the optional
//! parts of the contract.

use async_trait::async_trait;
use fallthrough_core::{FallthroughResult, Metadata, StoreError, Timestamp};

/// Descriptor of a stored blob, returned by [`BlobStore::file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    /// Key the blob is stored under.
    pub key: String,
    /// Content length in bytes.
    pub size: u64,
    /// Last write time.
    pub modified_at: Timestamp,
    /// Hex SHA-256 of the content.
    pub checksum: String,
}

/// Immediate children of a directory-like key prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryListing {
    /// Full keys of blobs directly under the directory.
    pub keys: Vec<String>,
    /// Full paths of sub-directories (without trailing separator).
    pub dirs: Vec<String>,
}

/// Key/value blob store contract.
///
/// Implementations must be thread-safe; the cache shares them behind `Arc`
/// and calls them from concurrent tasks.
///
/// # Required operations
///
/// `read`, `write`, `delete`, `exists` and `keys` form the contract the
/// read-through cache relies on. `read` and `delete` report
/// [`StoreError::NotFound`] for absent keys; `exists` reports absence as
/// `Ok(false)` and only fails on backend trouble.
///
/// # Optional operations
///
/// The remaining methods default to [`StoreError::Unimplemented`]. Callers
/// must treat that error as a permanent capability absence.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read the content stored under `key`.
    async fn read(&self, key: &str) -> FallthroughResult<Vec<u8>>;

    /// Create or overwrite `key`.
    async fn write(
        &self,
        key: &str,
        content: &[u8],
        metadata: Option<&Metadata>,
    ) -> FallthroughResult<()>;

    /// Remove `key`.
    async fn delete(&self, key: &str) -> FallthroughResult<()>;

    /// Check whether `key` is present.
    async fn exists(&self, key: &str) -> FallthroughResult<bool>;

    /// List keys starting with `prefix`. Order is implementation-defined.
    async fn keys(&self, prefix: &str) -> FallthroughResult<Vec<String>>;

    async fn rename(&self, _from: &str, _to: &str) -> FallthroughResult<()> {
        Err(unsupported("rename"))
    }

    async fn copy(&self, _from: &str, _to: &str) -> FallthroughResult<()> {
        Err(unsupported("copy"))
    }

    /// Last modification time of `key`.
    async fn mtime(&self, _key: &str) -> FallthroughResult<Timestamp> {
        Err(unsupported("mtime"))
    }

    /// Hex-encoded content checksum of `key`.
    async fn checksum(&self, _key: &str) -> FallthroughResult<String> {
        Err(unsupported("checksum"))
    }

    async fn list_directory(&self, _directory: &str) -> FallthroughResult<DirectoryListing> {
        Err(unsupported("list_directory"))
    }

    /// File-object accessor.
    async fn file(&self, _key: &str) -> FallthroughResult<BlobInfo> {
        Err(unsupported("file"))
    }

    /// Whether `write` persists its metadata argument.
    fn supports_metadata(&self) -> bool {
        false
    }
}

/// Build the error returned by an unsupported operation.
pub(crate) fn unsupported(operation: &'static str) -> fallthrough_core::FallthroughError {
    StoreError::Unimplemented { operation }.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Store that implements only the required operations.
    struct MinimalStore;

    #[async_trait]
    impl BlobStore for MinimalStore {
        async fn read(&self, key: &str) -> FallthroughResult<Vec<u8>> {
            Err(StoreError::not_found(key).into())
        }

        async fn write(
            &self,
            _key: &str,
            _content: &[u8],
            _metadata: Option<&Metadata>,
        ) -> FallthroughResult<()> {
            Ok(())
        }

        async fn delete(&self, key: &str) -> FallthroughResult<()> {
            Err(StoreError::not_found(key).into())
        }

        async fn exists(&self, _key: &str) -> FallthroughResult<bool> {
            Ok(false)
        }

        async fn keys(&self, _prefix: &str) -> FallthroughResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_optional_operations_default_to_unimplemented() {
        let store = MinimalStore;

        let rename = store.rename("a", "b").await.expect_err("rename");
        assert_eq!(
            rename.as_store_error(),
            Some(&StoreError::Unimplemented { operation: "rename" })
        );
        assert!(store.copy("a", "b").await.expect_err("copy").is_unimplemented());
        assert!(store.mtime("a").await.expect_err("mtime").is_unimplemented());
        assert!(store.checksum("a").await.expect_err("checksum").is_unimplemented());
        assert!(store
            .list_directory("")
            .await
            .expect_err("list_directory")
            .is_unimplemented());
        assert!(store.file("a").await.expect_err("file").is_unimplemented());
        assert!(!store.supports_metadata());
    }
}
