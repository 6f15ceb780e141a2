//! JSON encode/decode at the persistent store boundary.
//!
//! Every persistent entry is the compact JSON text of its logical value.
//! Decoding never falls back to the raw string: malformed text is a
//! [`DecodeError`].

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{DecodeError, EncodeError};
use crate::Value;

/// Convert any serializable value into the cache's value model.
pub fn to_value<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Value, EncodeError> {
    serde_json::to_value(value).map_err(|e| EncodeError {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Encode a value as the JSON text stored under `key`.
pub fn encode_value(key: &str, value: &Value) -> Result<String, EncodeError> {
    serde_json::to_string(value).map_err(|e| EncodeError {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Decode the raw JSON text stored under `key`.
pub fn decode(key: &str, raw: &str) -> Result<Value, DecodeError> {
    serde_json::from_str(raw).map_err(|e| DecodeError {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Interpret a decoded value as a concrete type.
pub fn decode_as<T: DeserializeOwned>(key: &str, value: &Value) -> Result<T, DecodeError> {
    T::deserialize(value).map_err(|e| DecodeError {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
