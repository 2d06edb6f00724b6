//! Blob stores and the tombstone-aware read-through cache.
//!
//! The cache sits between a fast local ("main") store and a slower,
//! authoritative ("fallback") store. Reads prefer the main store and backfill
//! it from the fallback on a miss. Deletes are recorded as tombstones in the
//! main store so that a stale fallback copy cannot resurrect a deleted key.
//!
//! # Example
//!
//! ```ignore
//! let main = Arc::new(LmdbBlobStore::open("/var/cache/blobs", 256)?);
//! let fallback = Arc::new(InMemoryBlobStore::with_entries([("images/logo.png", "png")]));
//! let cache = ReadThroughCache::with_defaults(main, fallback);
//!
//! let logo = cache.read("images/logo.png").await?;   // backfills main on first access
//! cache.delete("images/old.png").await?;             // tombstoned, never refetched
//! ```

pub mod lmdb_backend;
pub mod memory;
pub mod read_through;
pub mod traits;

pub use lmdb_backend::{LmdbBlobStore, LmdbStoreError};
pub use memory::InMemoryBlobStore;
pub use read_through::ReadThroughCache;
pub use traits::{BlobInfo, BlobStore, DirectoryListing};
