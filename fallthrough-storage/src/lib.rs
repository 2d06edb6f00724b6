//! Fallthrough Storage - Blob Stores and the Read-Through Cache
//!
//! Defines the [`BlobStore`] capability contract, two concrete stores
//! (in-memory and LMDB) and the tombstone-aware [`ReadThroughCache`] that
//! composes a fast main store with an authoritative fallback store.

pub mod cache;

pub use cache::{
    BlobInfo, BlobStore, DirectoryListing, InMemoryBlobStore, LmdbBlobStore, LmdbStoreError,
    ReadThroughCache,
};

// Re-export core types so most callers need a single dependency
pub use fallthrough_core::{
    BackfillPolicy, CacheConfig, FallthroughError, FallthroughResult, KeyLayout, KeyListing,
    Metadata, StoreError,
};
