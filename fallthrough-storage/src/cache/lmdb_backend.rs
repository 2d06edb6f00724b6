//! LMDB-backed blob store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store, intended as the fast local ("main") side of the
//! read-through cache.
//!
//! # Value Format
//!
//! `[modified_at: 8 bytes, little-endian unix millis][content]`
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The store uses:
//! - Read transactions for `read`, `exists`, `keys`, `mtime` and `checksum`
//! - Write transactions for `write`, `delete`, `copy` and `rename`

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fallthrough_core::{
    compute_checksum, FallthroughError, FallthroughResult, Metadata, StoreError, Timestamp,
};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use super::traits::{BlobInfo, BlobStore};

/// Length of the timestamp header in front of every value.
const HEADER_LEN: usize = 8;

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored value does not match the expected layout.
    #[error("Corrupt entry for key {key:?}: {reason}")]
    Corrupt { key: String, reason: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbStoreError to FallthroughError.
impl From<LmdbStoreError> for FallthroughError {
    fn from(e: LmdbStoreError) -> Self {
        FallthroughError::Store(StoreError::Backend {
            reason: e.to_string(),
        })
    }
}

fn txn_error(e: heed::Error) -> LmdbStoreError {
    LmdbStoreError::Transaction(e.to_string())
}

/// LMDB-backed [`BlobStore`].
///
/// # Example
///
/// ```ignore
/// use fallthrough_storage::{BlobStore, LmdbBlobStore};
///
/// let store = LmdbBlobStore::open("/tmp/blobs", 100)?;
/// store.write("/reports/q1.pdf", &pdf_bytes, None).await?;
/// let stamp = store.mtime("/reports/q1.pdf").await?;
/// ```
pub struct LmdbBlobStore {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
}

impl LmdbBlobStore {
    /// Open or create an LMDB blob store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `max_size_mb` does not fit in a byte count
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        let map_size = max_size_mb.checked_mul(1024 * 1024).ok_or_else(|| {
            LmdbStoreError::EnvOpen(format!("map size of {} MB overflows", max_size_mb))
        })?;

        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per store and the directory is
        // not opened a second time by this process while the store is alive.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

        wtxn.commit().map_err(txn_error)?;

        tracing::debug!(path = %path.as_ref().display(), max_size_mb, "opened LMDB blob store");

        Ok(Self { env, db })
    }

    /// Number of entries in the database.
    pub fn entry_count(&self) -> FallthroughResult<u64> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        Ok(self.db.len(&rtxn).map_err(txn_error)?)
    }

    /// Fetch and decode the stored value for `key`.
    fn load(&self, key: &str) -> FallthroughResult<(Vec<u8>, Timestamp)> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        match self.db.get(&rtxn, key.as_bytes()).map_err(txn_error)? {
            Some(bytes) => Ok(decode_value(key, bytes)?),
            None => Err(StoreError::not_found(key).into()),
        }
    }

    /// Copy `from` to `to`, optionally removing `from`, in one transaction.
    fn transfer(&self, from: &str, to: &str, remove_source: bool) -> FallthroughResult<()> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;

        let content = match self.db.get(&wtxn, from.as_bytes()).map_err(txn_error)? {
            Some(bytes) => decode_value(from, bytes)?.0,
            None => return Err(StoreError::not_found(from).into()),
        };

        self.db
            .put(&mut wtxn, to.as_bytes(), &encode_value(&content, Utc::now()))
            .map_err(txn_error)?;
        if remove_source && from != to {
            self.db.delete(&mut wtxn, from.as_bytes()).map_err(txn_error)?;
        }

        wtxn.commit().map_err(txn_error)?;
        Ok(())
    }
}

fn encode_value(content: &[u8], modified_at: Timestamp) -> Vec<u8> {
    let mut full_bytes = Vec::with_capacity(HEADER_LEN + content.len());
    full_bytes.extend_from_slice(&modified_at.timestamp_millis().to_le_bytes());
    full_bytes.extend_from_slice(content);
    full_bytes
}

fn decode_value(key: &str, bytes: &[u8]) -> Result<(Vec<u8>, Timestamp), LmdbStoreError> {
    if bytes.len() < HEADER_LEN {
        return Err(LmdbStoreError::Corrupt {
            key: key.to_string(),
            reason: format!("value shorter than {} byte header", HEADER_LEN),
        });
    }

    let mut stamp = [0u8; HEADER_LEN];
    stamp.copy_from_slice(&bytes[..HEADER_LEN]);
    let millis = i64::from_le_bytes(stamp);
    let modified_at = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        LmdbStoreError::Corrupt {
            key: key.to_string(),
            reason: format!("timestamp {} out of range", millis),
        }
    })?;

    Ok((bytes[HEADER_LEN..].to_vec(), modified_at))
}

#[async_trait]
impl BlobStore for LmdbBlobStore {
    async fn read(&self, key: &str) -> FallthroughResult<Vec<u8>> {
        Ok(self.load(key)?.0)
    }

    async fn write(
        &self,
        key: &str,
        content: &[u8],
        _metadata: Option<&Metadata>,
    ) -> FallthroughResult<()> {
        let full_bytes = encode_value(content, Utc::now());

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), &full_bytes)
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> FallthroughResult<()> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let deleted = self
            .db
            .delete(&mut wtxn, key.as_bytes())
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;

        if deleted {
            Ok(())
        } else {
            Err(StoreError::not_found(key).into())
        }
    }

    async fn exists(&self, key: &str) -> FallthroughResult<bool> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        Ok(self
            .db
            .get(&rtxn, key.as_bytes())
            .map_err(txn_error)?
            .is_some())
    }

    async fn keys(&self, prefix: &str) -> FallthroughResult<Vec<String>> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        // LMDB rejects zero-length keys as a range start.
        let iter: Box<dyn Iterator<Item = heed::Result<(&[u8], &[u8])>>> = if prefix.is_empty() {
            Box::new(self.db.iter(&rtxn).map_err(txn_error)?)
        } else {
            Box::new(
                self.db
                    .prefix_iter(&rtxn, prefix.as_bytes())
                    .map_err(txn_error)?,
            )
        };

        let mut keys = Vec::new();
        for result in iter {
            let (key, _) = result.map_err(txn_error)?;
            let key = std::str::from_utf8(key).map_err(|e| LmdbStoreError::Corrupt {
                key: String::from_utf8_lossy(key).into_owned(),
                reason: e.to_string(),
            })?;
            keys.push(key.to_string());
        }

        Ok(keys)
    }

    async fn rename(&self, from: &str, to: &str) -> FallthroughResult<()> {
        self.transfer(from, to, true)
    }

    async fn copy(&self, from: &str, to: &str) -> FallthroughResult<()> {
        self.transfer(from, to, false)
    }

    async fn mtime(&self, key: &str) -> FallthroughResult<Timestamp> {
        Ok(self.load(key)?.1)
    }

    async fn checksum(&self, key: &str) -> FallthroughResult<String> {
        Ok(compute_checksum(&self.load(key)?.0))
    }

    async fn file(&self, key: &str) -> FallthroughResult<BlobInfo> {
        let (content, modified_at) = self.load(key)?;
        Ok(BlobInfo {
            key: key.to_string(),
            size: content.len() as u64,
            modified_at,
            checksum: compute_checksum(&content),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (LmdbBlobStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbBlobStore::open(temp_dir.path(), 10).expect("store creation should succeed");
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_open_creates_empty_store() {
        let (store, _temp_dir) = create_test_store();
        assert_eq!(store.entry_count().expect("entry_count should succeed"), 0);
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (store, _temp_dir) = create_test_store();

        store
            .write("/a", b"alpha", None)
            .await
            .expect("write should succeed");

        let content = store.read("/a").await.expect("read should succeed");
        assert_eq!(content, b"alpha");
        assert!(store.exists("/a").await.expect("exists should succeed"));
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let (store, _temp_dir) = create_test_store();

        let err = store.read("/missing").await.expect_err("read should fail");
        assert!(err.is_not_found());
        assert!(!store.exists("/missing").await.expect("exists should succeed"));
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _temp_dir) = create_test_store();

        store
            .write("/a", b"alpha", None)
            .await
            .expect("write should succeed");
        store.delete("/a").await.expect("delete should succeed");
        assert!(!store.exists("/a").await.expect("exists should succeed"));

        let err = store.delete("/a").await.expect_err("second delete should fail");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let (store, _temp_dir) = create_test_store();

        store.write("/k", b"one", None).await.expect("write should succeed");
        store.write("/k", b"two", None).await.expect("write should succeed");

        assert_eq!(store.read("/k").await.expect("read should succeed"), b"two");
        assert_eq!(store.entry_count().expect("entry_count should succeed"), 1);
    }

    #[tokio::test]
    async fn test_empty_content() {
        let (store, _temp_dir) = create_test_store();

        store.write("/empty", b"", None).await.expect("write should succeed");
        assert!(store
            .read("/empty")
            .await
            .expect("read should succeed")
            .is_empty());
    }

    #[tokio::test]
    async fn test_keys_by_prefix() {
        let (store, _temp_dir) = create_test_store();

        for key in ["/a", "/b/c", "/%deleted%/d", "other"] {
            store.write(key, b"x", None).await.expect("write should succeed");
        }

        let mut all_slash = store.keys("/").await.expect("keys should succeed");
        all_slash.sort();
        assert_eq!(all_slash, vec!["/%deleted%/d", "/a", "/b/c"]);

        let nested = store.keys("/b").await.expect("keys should succeed");
        assert_eq!(nested, vec!["/b/c"]);

        let everything = store.keys("").await.expect("keys should succeed");
        assert_eq!(everything.len(), 4);
    }

    #[tokio::test]
    async fn test_mtime_checksum_and_file() {
        let (store, _temp_dir) = create_test_store();
        let before = Utc::now().timestamp_millis();

        store.write("/k", b"abc", None).await.expect("write should succeed");

        let mtime = store.mtime("/k").await.expect("mtime should succeed");
        assert!(mtime.timestamp_millis() >= before);

        let checksum = store.checksum("/k").await.expect("checksum should succeed");
        assert_eq!(checksum, compute_checksum(b"abc"));

        let info = store.file("/k").await.expect("file should succeed");
        assert_eq!(info.size, 3);
        assert_eq!(info.modified_at, mtime);
    }

    #[tokio::test]
    async fn test_copy_and_rename() {
        let (store, _temp_dir) = create_test_store();
        store.write("/src", b"payload", None).await.expect("write should succeed");

        store.copy("/src", "/dup").await.expect("copy should succeed");
        assert_eq!(store.read("/dup").await.expect("read should succeed"), b"payload");
        assert!(store.exists("/src").await.expect("exists should succeed"));

        store.rename("/src", "/dst").await.expect("rename should succeed");
        assert!(!store.exists("/src").await.expect("exists should succeed"));
        assert_eq!(store.read("/dst").await.expect("read should succeed"), b"payload");

        let err = store.rename("/src", "/x").await.expect_err("rename should fail");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_directory_unimplemented() {
        let (store, _temp_dir) = create_test_store();
        let err = store.list_directory("/").await.expect_err("should be unsupported");
        assert!(err.is_unimplemented());
    }

    #[test]
    fn test_open_rejects_overflowing_map_size() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store_dir = temp_dir.path().join("store");

        let err = LmdbBlobStore::open(&store_dir, usize::MAX).err().expect("open should fail");
        assert!(matches!(err, LmdbStoreError::EnvOpen(_)));
        assert!(!store_dir.exists());
    }

    #[tokio::test]
    async fn test_reopen_persists() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let store = LmdbBlobStore::open(temp_dir.path(), 10).expect("open should succeed");
            store.write("/k", b"durable", None).await.expect("write should succeed");
        }

        let store = LmdbBlobStore::open(temp_dir.path(), 10).expect("reopen should succeed");
        assert_eq!(store.read("/k").await.expect("read should succeed"), b"durable");
    }

    #[test]
    fn test_decode_rejects_short_value() {
        let err = decode_value("k", &[1, 2, 3]).expect_err("short value should fail");
        assert!(matches!(err, LmdbStoreError::Corrupt { .. }));
    }

    #[test]
    fn test_encode_decode_header() {
        let stamp = DateTime::from_timestamp_millis(1_700_000_000_123).expect("valid timestamp");
        let encoded = encode_value(b"body", stamp);
        assert_eq!(encoded.len(), HEADER_LEN + 4);

        let (content, decoded_stamp) = decode_value("k", &encoded).expect("decode should succeed");
        assert_eq!(content, b"body");
        assert_eq!(decoded_stamp, stamp);
    }
}
