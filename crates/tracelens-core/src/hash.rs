//! Canonical JSON hashing.
//!
//! Object keys are sorted recursively before encoding, so two values that
//! compare equal always hash to the same digest regardless of how their maps
//! were built.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::CoreError;

/// Number of hex characters kept by [`short_hash`].
pub const SHORT_HASH_LEN: usize = 16;

/// Returns a copy of `value` with every object's keys in sorted order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key.clone(), canonicalize(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Encodes any serializable value as canonical JSON bytes.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&canonicalize(&value))?)
}

/// Hex-encoded SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hex-encoded SHA-256 of the canonical encoding of `value`.
pub fn content_hash<T: Serialize>(value: &T) -> Result<String, CoreError> {
    Ok(sha256_hex(&canonical_bytes(value)?))
}

/// First [`SHORT_HASH_LEN`] hex characters of [`content_hash`].
pub fn short_hash<T: Serialize>(value: &T) -> Result<String, CoreError> {
    let mut full = content_hash(value)?;
    full.truncate(SHORT_HASH_LEN);
    Ok(full)
}
