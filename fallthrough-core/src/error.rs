//! Error types for fallthrough operations

use thiserror::Error;

/// Blob store errors.
///
/// Every store in the workspace, and the read-through cache itself, reports
/// failures through this enum. The cache passes store errors through
/// unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Key not found: {key}")]
    NotFound { key: String },

    #[error("Operation not implemented: {operation}")]
    Unimplemented { operation: &'static str },

    #[error("Backend failure: {reason}")]
    Backend { reason: String },

    #[error("Invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Shorthand for a `NotFound` error on `key`.
    pub fn not_found(key: impl Into<String>) -> Self {
        StoreError::NotFound { key: key.into() }
    }

    /// Shorthand for a `Backend` error.
    pub fn backend(reason: impl ToString) -> Self {
        StoreError::Backend {
            reason: reason.to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all fallthrough errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FallthroughError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl FallthroughError {
    /// True when the error reports an absent key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FallthroughError::Store(StoreError::NotFound { .. }))
    }

    /// True when the error reports a permanently unsupported operation.
    pub fn is_unimplemented(&self) -> bool {
        matches!(
            self,
            FallthroughError::Store(StoreError::Unimplemented { .. })
        )
    }

    /// The store error, if this is one.
    pub fn as_store_error(&self) -> Option<&StoreError> {
        match self {
            FallthroughError::Store(e) => Some(e),
            FallthroughError::Config(_) => None,
        }
    }
}

/// Result type alias for fallthrough operations.
pub type FallthroughResult<T> = Result<T, FallthroughError>;

// =============================================================================
// TESTS
// =============================================================================
