//! Superstore Core - Shared Types
//!
//! Value model, JSON codec, change events, configuration and the error
//! taxonomy shared by the storage and sync crates. No I/O lives here.

pub mod codec;
pub mod config;
pub mod error;
pub mod event;

pub use codec::{decode, decode_as, encode_value, to_value};
pub use config::SyncConfig;
pub use error::{
    ConfigError, DecodeError, EncodeError, StoreError, StoreResult, SuperstoreError,
    SuperstoreResult,
};
pub use event::{ChangeEvent, ChangeKind, ContextId};

/// Decoded value held by the cache.
///
/// `serde_json::Value` is already an exhaustive tagged union over the JSON
/// data model (null, bool, number, string, array, object). Absence of a key
/// is expressed as `Option::None` at the API, never as a stored variant.
pub type Value = serde_json::Value;
