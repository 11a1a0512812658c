//! Hashing utilities for deterministic rule keys and artifact digests.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::UtilError;

/// Compute the SHA-256 hex digest of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Combine multiple string parts into a single composite SHA-256 hash.
///
/// Each part is hashed in order with a length prefix to prevent ambiguity.
pub fn sha256_multi(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        // Length-prefix each part to avoid collisions like ["ab","c"] vs ["a","bc"].
        let len_bytes = part.len().to_le_bytes();
        hasher.update(len_bytes);
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Hash the canonical JSON serialization of `value`.
///
/// Map-typed fields should be `BTreeMap`s so the serialization, and therefore
/// the digest, does not depend on insertion order.
///
/// # Errors
/// Returns an error if `value` cannot be serialized.
pub fn sha256_json<T: Serialize>(value: &T) -> Result<String, UtilError> {
    let bytes = serde_json::to_vec(value).map_err(|e| UtilError::Serialize {
        message: e.to_string(),
    })?;
    Ok(sha256_bytes(&bytes))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn sha256_bytes_deterministic() {
        let a = sha256_bytes(b"hello");
        let b = sha256_bytes(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // 256 bits = 64 hex chars
    }

    #[test]
    fn sha256_bytes_different_input() {
        let a = sha256_bytes(b"hello");
        let b = sha256_bytes(b"world");
        assert_ne!(a, b);
    }

    #[test]
    fn sha256_bytes_empty() {
        let hash = sha256_bytes(b"");
        // Known SHA-256 of empty input
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_multi_deterministic() {
        let a = sha256_multi(&["hello", "world"]);
        let b = sha256_multi(&["hello", "world"]);
        assert_eq!(a, b);
    }

    #[test]
    fn sha256_multi_order_matters() {
        let a = sha256_multi(&["hello", "world"]);
        let b = sha256_multi(&["world", "hello"]);
        assert_ne!(a, b);
    }

    #[test]
    fn sha256_multi_no_boundary_collision() {
        // ["ab", "c"] and ["a", "bc"] must produce different hashes
        let a = sha256_multi(&["ab", "c"]);
        let b = sha256_multi(&["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn sha256_multi_empty_parts() {
        let hash = sha256_multi(&[]);
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn sha256_json_ignores_insertion_order() {
        let mut first = BTreeMap::new();
        first.insert("b", 2);
        first.insert("a", 1);

        let mut second = BTreeMap::new();
        second.insert("a", 1);
        second.insert("b", 2);

        assert_eq!(sha256_json(&first).unwrap(), sha256_json(&second).unwrap());
    }

    #[test]
    fn sha256_json_detects_value_change() {
        let a = sha256_json(&vec!["x", "y"]).unwrap();
        let b = sha256_json(&vec!["x", "z"]).unwrap();
        assert_ne!(a, b);
    }
}
