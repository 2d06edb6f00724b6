//! Fallthrough Test Utilities
//!
//! Shared test infrastructure for the fallthrough workspace:
//! - Instrumented store wrappers (call counting, fault injection)
//! - Proptest generators for keys, contents, configs and operation sequences
//! - A reference model of the cache's logical view
//! - Fixtures for common scenarios
//! - Assertions for fallthrough error variants

// Re-export stores from their source crate
pub use fallthrough_storage::{
    BlobInfo, BlobStore, DirectoryListing, InMemoryBlobStore, ReadThroughCache,
};

// Re-export core types for convenience
pub use fallthrough_core::{
    BackfillPolicy, CacheConfig, ConfigError, FallthroughError, FallthroughResult, KeyLayout,
    KeyListing, Metadata, StoreError, Timestamp,
};

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

/// Install a `tracing` subscriber for tests.
///
/// Honors `RUST_LOG`; defaults to debug output for the fallthrough crates.
/// Safe to call from every test: only the first call installs anything.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fallthrough_storage=debug,warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// INSTRUMENTED STORES
// ============================================================================

/// The required store operations, used to address counters and faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Read,
    Write,
    Delete,
    Exists,
    Keys,
}

impl StoreOp {
    pub const ALL: [StoreOp; 5] = [
        StoreOp::Read,
        StoreOp::Write,
        StoreOp::Delete,
        StoreOp::Exists,
        StoreOp::Keys,
    ];

    fn index(self) -> usize {
        match self {
            StoreOp::Read => 0,
            StoreOp::Write => 1,
            StoreOp::Delete => 2,
            StoreOp::Exists => 3,
            StoreOp::Keys => 4,
        }
    }
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOp::Read => "read",
            StoreOp::Write => "write",
            StoreOp::Delete => "delete",
            StoreOp::Exists => "exists",
            StoreOp::Keys => "keys",
        };
        f.write_str(name)
    }
}

/// Snapshot of per-operation call counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub read: usize,
    pub write: usize,
    pub delete: usize,
    pub exists: usize,
    pub keys: usize,
}

impl CallCounts {
    /// Sum of all counted calls.
    pub fn total(&self) -> usize {
        self.read + self.write + self.delete + self.exists + self.keys
    }
}

/// Store wrapper that counts calls to each required operation.
///
/// Optional operations are forwarded uncounted.
#[derive(Debug, Default)]
pub struct CountingStore<S> {
    inner: S,
    calls: [AtomicUsize; 5],
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Default::default(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Calls recorded for `op`.
    pub fn count(&self, op: StoreOp) -> usize {
        self.calls[op.index()].load(Ordering::SeqCst)
    }

    pub fn counts(&self) -> CallCounts {
        CallCounts {
            read: self.count(StoreOp::Read),
            write: self.count(StoreOp::Write),
            delete: self.count(StoreOp::Delete),
            exists: self.count(StoreOp::Exists),
            keys: self.count(StoreOp::Keys),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in &self.calls {
            counter.store(0, Ordering::SeqCst);
        }
    }

    fn record(&self, op: StoreOp) {
        self.calls[op.index()].fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S: BlobStore> BlobStore for CountingStore<S> {
    async fn read(&self, key: &str) -> FallthroughResult<Vec<u8>> {
        self.record(StoreOp::Read);
        self.inner.read(key).await
    }

    async fn write(
        &self,
        key: &str,
        content: &[u8],
        metadata: Option<&Metadata>,
    ) -> FallthroughResult<()> {
        self.record(StoreOp::Write);
        self.inner.write(key, content, metadata).await
    }

    async fn delete(&self, key: &str) -> FallthroughResult<()> {
        self.record(StoreOp::Delete);
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> FallthroughResult<bool> {
        self.record(StoreOp::Exists);
        self.inner.exists(key).await
    }

    async fn keys(&self, prefix: &str) -> FallthroughResult<Vec<String>> {
        self.record(StoreOp::Keys);
        self.inner.keys(prefix).await
    }

    async fn rename(&self, from: &str, to: &str) -> FallthroughResult<()> {
        self.inner.rename(from, to).await
    }

    async fn copy(&self, from: &str, to: &str) -> FallthroughResult<()> {
        self.inner.copy(from, to).await
    }

    async fn mtime(&self, key: &str) -> FallthroughResult<Timestamp> {
        self.inner.mtime(key).await
    }

    async fn checksum(&self, key: &str) -> FallthroughResult<String> {
        self.inner.checksum(key).await
    }

    async fn list_directory(&self, directory: &str) -> FallthroughResult<DirectoryListing> {
        self.inner.list_directory(directory).await
    }

    async fn file(&self, key: &str) -> FallthroughResult<BlobInfo> {
        self.inner.file(key).await
    }

    fn supports_metadata(&self) -> bool {
        self.inner.supports_metadata()
    }
}

/// Store wrapper that fails selected operations with `StoreError::Backend`.
///
/// Faults can be toggled while the store is shared. A read budget makes
/// reads succeed a fixed number of times and fail afterwards.
#[derive(Debug, Default)]
pub struct FaultyStore<S> {
    inner: S,
    faults: [AtomicBool; 5],
    read_budget: Option<usize>,
    reads_served: AtomicUsize,
}

impl<S> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            faults: Default::default(),
            read_budget: None,
            reads_served: AtomicUsize::new(0),
        }
    }

    /// Fail every read after the first `budget` successful attempts.
    pub fn with_read_budget(mut self, budget: usize) -> Self {
        self.read_budget = Some(budget);
        self
    }

    /// Start failing `op`.
    pub fn with_fault(self, op: StoreOp) -> Self {
        self.fail(op);
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn fail(&self, op: StoreOp) {
        self.faults[op.index()].store(true, Ordering::SeqCst);
    }

    pub fn heal(&self, op: StoreOp) {
        self.faults[op.index()].store(false, Ordering::SeqCst);
    }

    /// Clear every fault and the read budget counter.
    pub fn heal_all(&self) {
        for op in StoreOp::ALL {
            self.heal(op);
        }
        self.reads_served.store(0, Ordering::SeqCst);
    }

    fn check(&self, op: StoreOp) -> FallthroughResult<()> {
        if self.faults[op.index()].load(Ordering::SeqCst) {
            return Err(injected(op));
        }
        if op == StoreOp::Read {
            if let Some(budget) = self.read_budget {
                let served = self.reads_served.fetch_add(1, Ordering::SeqCst);
                if served >= budget {
                    return Err(injected(op));
                }
            }
        }
        Ok(())
    }
}

/// Error produced by an injected fault.
pub fn injected(op: StoreOp) -> FallthroughError {
    StoreError::backend(format!("injected {} failure", op)).into()
}

#[async_trait]
impl<S: BlobStore> BlobStore for FaultyStore<S> {
    async fn read(&self, key: &str) -> FallthroughResult<Vec<u8>> {
        self.check(StoreOp::Read)?;
        self.inner.read(key).await
    }

    async fn write(
        &self,
        key: &str,
        content: &[u8],
        metadata: Option<&Metadata>,
    ) -> FallthroughResult<()> {
        self.check(StoreOp::Write)?;
        self.inner.write(key, content, metadata).await
    }

    async fn delete(&self, key: &str) -> FallthroughResult<()> {
        self.check(StoreOp::Delete)?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> FallthroughResult<bool> {
        self.check(StoreOp::Exists)?;
        self.inner.exists(key).await
    }

    async fn keys(&self, prefix: &str) -> FallthroughResult<Vec<String>> {
        self.check(StoreOp::Keys)?;
        self.inner.keys(prefix).await
    }
}

// ============================================================================
// REFERENCE MODEL
// ============================================================================

/// One logical operation against the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOp {
    Write { key: String, content: Vec<u8> },
    Delete { key: String },
    Read { key: String },
    Exists { key: String },
    Keys { prefix: String },
}

/// Expected outcome of a [`CacheOp`] under the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelOutcome {
    Done,
    Content(Option<Vec<u8>>),
    Present(bool),
    Keys(BTreeSet<String>),
}

/// Logical view of a cache over a fixed fallback.
///
/// Local entries shadow the fallback; `None` records a tombstone. Backfill
/// is invisible at this level, so reads never change the model.
#[derive(Debug, Clone, Default)]
pub struct CacheModel {
    fallback: HashMap<String, Vec<u8>>,
    local: HashMap<String, Option<Vec<u8>>>,
}

impl CacheModel {
    pub fn new(fallback: HashMap<String, Vec<u8>>) -> Self {
        Self {
            fallback,
            local: HashMap::new(),
        }
    }

    pub fn read(&self, key: &str) -> Option<&[u8]> {
        match self.local.get(key) {
            Some(Some(content)) => Some(content.as_slice()),
            Some(None) => None,
            None => self.fallback.get(key).map(Vec::as_slice),
        }
    }

    /// Distinct visible keys under `prefix`.
    pub fn keys(&self, prefix: &str) -> BTreeSet<String> {
        let local = self
            .local
            .iter()
            .filter(|(_, content)| content.is_some())
            .map(|(key, _)| key);
        let fallback = self
            .fallback
            .keys()
            .filter(|key| !matches!(self.local.get(*key), Some(None)));
        local
            .chain(fallback)
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn apply(&mut self, op: &CacheOp) -> ModelOutcome {
        match op {
            CacheOp::Write { key, content } => {
                self.local.insert(key.clone(), Some(content.clone()));
                ModelOutcome::Done
            }
            CacheOp::Delete { key } => {
                self.local.insert(key.clone(), None);
                ModelOutcome::Done
            }
            CacheOp::Read { key } => ModelOutcome::Content(self.read(key).map(<[u8]>::to_vec)),
            CacheOp::Exists { key } => ModelOutcome::Present(self.read(key).is_some()),
            CacheOp::Keys { prefix } => ModelOutcome::Keys(self.keys(prefix)),
        }
    }
}

/// Run `op` against a store and report the outcome in model terms.
///
/// `NotFound` on read maps to `Content(None)`; any other error is returned.
pub async fn observe<S: BlobStore + ?Sized>(
    store: &S,
    op: &CacheOp,
) -> FallthroughResult<ModelOutcome> {
    match op {
        CacheOp::Write { key, content } => {
            store.write(key, content, None).await?;
            Ok(ModelOutcome::Done)
        }
        CacheOp::Delete { key } => {
            store.delete(key).await?;
            Ok(ModelOutcome::Done)
        }
        CacheOp::Read { key } => match store.read(key).await {
            Ok(content) => Ok(ModelOutcome::Content(Some(content))),
            Err(e) if e.is_not_found() => Ok(ModelOutcome::Content(None)),
            Err(e) => Err(e),
        },
        CacheOp::Exists { key } => Ok(ModelOutcome::Present(store.exists(key).await?)),
        CacheOp::Keys { prefix } => Ok(ModelOutcome::Keys(
            store.keys(prefix).await?.into_iter().collect(),
        )),
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for fallthrough types.

    use super::*;
    use proptest::prelude::*;

    /// Short logical keys over a small alphabet, so sequences revisit keys.
    pub fn arb_logical_key() -> impl Strategy<Value = String> {
        "[a-e]{1,2}(/[a-c])?"
    }

    /// Key prefixes, including the empty prefix.
    pub fn arb_prefix() -> impl Strategy<Value = String> {
        prop_oneof![Just(String::new()), "[a-e]", "[a-e]{2}"]
    }

    pub fn arb_content() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(any::<u8>(), 0..32)
    }

    /// Initial fallback contents, keyed by logical key.
    pub fn arb_fallback_entries() -> impl Strategy<Value = HashMap<String, Vec<u8>>> {
        prop::collection::hash_map(arb_logical_key(), arb_content(), 0..8)
    }

    pub fn arb_key_layout() -> impl Strategy<Value = KeyLayout> {
        prop_oneof![
            Just(KeyLayout::default()),
            Just(KeyLayout::new("live:", "dead:")),
            Just(KeyLayout::new("data/", "data/.trash/").with_tombstone_payload(b"x".to_vec())),
        ]
    }

    pub fn arb_backfill_policy() -> impl Strategy<Value = BackfillPolicy> {
        prop_oneof![Just(BackfillPolicy::BestEffort), Just(BackfillPolicy::Strict)]
    }

    pub fn arb_key_listing() -> impl Strategy<Value = KeyListing> {
        prop_oneof![Just(KeyListing::Deduplicated), Just(KeyListing::Concatenated)]
    }

    /// Valid cache configurations.
    pub fn arb_cache_config() -> impl Strategy<Value = CacheConfig> {
        (arb_key_layout(), arb_backfill_policy(), arb_key_listing()).prop_map(
            |(layout, backfill, listing)| {
                CacheConfig::new()
                    .with_layout(layout)
                    .with_backfill(backfill)
                    .with_listing(listing)
            },
        )
    }

    pub fn arb_cache_op() -> impl Strategy<Value = CacheOp> {
        prop_oneof![
            3 => (arb_logical_key(), arb_content())
                .prop_map(|(key, content)| CacheOp::Write { key, content }),
            2 => arb_logical_key().prop_map(|key| CacheOp::Delete { key }),
            3 => arb_logical_key().prop_map(|key| CacheOp::Read { key }),
            1 => arb_logical_key().prop_map(|key| CacheOp::Exists { key }),
            1 => arb_prefix().prop_map(|prefix| CacheOp::Keys { prefix }),
        ]
    }

    pub fn arb_cache_ops(max_len: usize) -> impl Strategy<Value = Vec<CacheOp>> {
        prop::collection::vec(arb_cache_op(), 1..max_len)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built stores and caches for common scenarios.

    use super::*;
    use std::sync::Arc;

    /// Main and fallback stores for the listing merge scenario.
    ///
    /// Main holds live `a`, `b` and a tombstone for `c` under `layout`;
    /// fallback holds `b`, `c`, `d`. The merged listing is `a`, `b`, `d`.
    pub fn listing_scenario(layout: &KeyLayout) -> (InMemoryBlobStore, InMemoryBlobStore) {
        let main = InMemoryBlobStore::with_entries([
            (layout.live("a"), b"local-a".to_vec()),
            (layout.live("b"), b"local-b".to_vec()),
            (layout.tombstone("c"), layout.tombstone_payload().to_vec()),
        ]);
        let fallback = InMemoryBlobStore::with_entries([
            ("b", "remote-b"),
            ("c", "remote-c"),
            ("d", "remote-d"),
        ]);
        (main, fallback)
    }

    /// A cache over in-memory stores with handles for inspection.
    pub struct CacheHarness {
        pub cache: ReadThroughCache<InMemoryBlobStore, CountingStore<InMemoryBlobStore>>,
        pub main: Arc<InMemoryBlobStore>,
        pub fallback: Arc<CountingStore<InMemoryBlobStore>>,
    }

    impl CacheHarness {
        /// Fallback call counts so far.
        pub fn fallback_counts(&self) -> CallCounts {
            self.fallback.counts()
        }
    }

    /// Build a harness whose fallback is seeded with `entries`.
    pub fn harness<K, V, I>(entries: I, config: CacheConfig) -> FallthroughResult<CacheHarness>
    where
        K: Into<String>,
        V: Into<Vec<u8>>,
        I: IntoIterator<Item = (K, V)>,
    {
        let main = Arc::new(InMemoryBlobStore::new());
        let fallback = Arc::new(CountingStore::new(InMemoryBlobStore::with_entries(entries)));
        let cache = ReadThroughCache::new(Arc::clone(&main), Arc::clone(&fallback), config)?;
        Ok(CacheHarness {
            cache,
            main,
            fallback,
        })
    }

    /// Harness with the default configuration.
    pub fn default_harness<K, V, I>(entries: I) -> FallthroughResult<CacheHarness>
    where
        K: Into<String>,
        V: Into<Vec<u8>>,
        I: IntoIterator<Item = (K, V)>,
    {
        harness(entries, CacheConfig::default())
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for fallthrough error variants.

    use super::*;

    /// Assert that a FallthroughResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: fmt::Debug>(result: &FallthroughResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a FallthroughResult is a NotFound error.
    #[track_caller]
    pub fn assert_not_found<T: fmt::Debug>(result: &FallthroughResult<T>) {
        match result {
            Err(FallthroughError::Store(StoreError::NotFound { .. })) => {}
            other => panic!("Expected NotFound error, got: {:?}", other),
        }
    }

    /// Assert that a FallthroughResult reports `operation` as unimplemented.
    #[track_caller]
    pub fn assert_unimplemented<T: fmt::Debug>(result: &FallthroughResult<T>, operation: &str) {
        match result {
            Err(FallthroughError::Store(StoreError::Unimplemented { operation: op })) => {
                assert_eq!(*op, operation, "Wrong operation in Unimplemented error");
            }
            other => panic!("Expected Unimplemented({}) error, got: {:?}", operation, other),
        }
    }

    /// Assert that a FallthroughResult is a Backend error.
    #[track_caller]
    pub fn assert_backend_error<T: fmt::Debug>(result: &FallthroughResult<T>) {
        match result {
            Err(FallthroughError::Store(StoreError::Backend { .. })) => {}
            other => panic!("Expected Backend error, got: {:?}", other),
        }
    }

    /// Assert that a FallthroughResult is an InvalidKey error.
    #[track_caller]
    pub fn assert_invalid_key<T: fmt::Debug>(result: &FallthroughResult<T>) {
        match result {
            Err(FallthroughError::Store(StoreError::InvalidKey { .. })) => {}
            other => panic!("Expected InvalidKey error, got: {:?}", other),
        }
    }

    /// Assert that a FallthroughResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: fmt::Debug>(result: &FallthroughResult<T>) {
        match result {
            Err(FallthroughError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
