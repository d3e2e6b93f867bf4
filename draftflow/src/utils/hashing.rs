//! Deterministic hashing over canonical JSON.
//!
//! `serde_json::Value` objects keep their keys in sorted order, so
//! serializing a value yields the same bytes for equal inputs regardless of
//! insertion order.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Serializes a value to compact JSON with sorted object keys.
#[must_use]
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_value(value)
        .map(|v| v.to_string())
        .unwrap_or_default()
}

/// Full SHA-256 hex digest of `input`.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// First 16 hex chars of the SHA-256 digest.
#[must_use]
pub fn short_hash(input: &str) -> String {
    let mut digest = sha256_hex(input);
    digest.truncate(16);
    digest
}

/// Content hash of an artifact payload, used for equality checks.
#[must_use]
pub fn content_hash<T: Serialize + ?Sized>(payload: &T) -> String {
    short_hash(&canonical_json(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_keys() {
        let a = json!({"b": 1, "a": {"y": 2, "x": 3}});
        let b = json!({"a": {"x": 3, "y": 2}, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&a), r#"{"a":{"x":3,"y":2},"b":1}"#);
    }

    #[test]
    fn test_short_hash_length() {
        assert_eq!(short_hash("hello").len(), 16);
        assert_eq!(sha256_hex("hello").len(), 64);
    }

    #[test]
    fn test_content_hash_stable() {
        let payload = json!({"title": "Doc", "sections": []});
        assert_eq!(content_hash(&payload), content_hash(&payload.clone()));
        assert_ne!(content_hash(&payload), content_hash(&json!({"title": "Other"})));
    }
}
