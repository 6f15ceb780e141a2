//! Error types for superstore operations

use thiserror::Error;

/// Persistent store errors.
///
/// Stores classify their failures into these variants so the cache can react
/// to a specific class (quota, benign removal) without inspecting messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Quota exceeded writing {key}: {requested} units requested, limit {limit}")]
    QuotaExceeded {
        key: String,
        requested: usize,
        limit: usize,
    },

    /// Raised by some stores when removing a key that is not present.
    #[error("Removal of absent key {key} rejected by store")]
    AbsentKeyRemoval { key: String },

    #[error("Invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Backend error in {store}: {reason}")]
    Backend { store: String, reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// True for the one failure class the cache is allowed to swallow.
    pub fn is_benign_removal(&self) -> bool {
        matches!(self, StoreError::AbsentKeyRemoval { .. })
    }

    /// True when the store rejected a write for lack of space.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded { .. })
    }

    pub fn backend(store: impl Into<String>, reason: impl ToString) -> Self {
        StoreError::Backend {
            store: store.into(),
            reason: reason.to_string(),
        }
    }
}

/// Malformed JSON encountered on read or in a change notification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Failed to decode value for {key}: {reason}")]
pub struct DecodeError {
    pub key: String,
    pub reason: String,
}

/// Value that cannot be represented as JSON.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Failed to encode value for {key}: {reason}")]
pub struct EncodeError {
    pub key: String,
    pub reason: String,
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

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Master error type for all superstore errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SuperstoreError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl SuperstoreError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, SuperstoreError::Store(e) if e.is_quota_exceeded())
    }
}

/// Result type alias for store-level operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for superstore operations.
pub type SuperstoreResult<T> = Result<T, SuperstoreError>;
