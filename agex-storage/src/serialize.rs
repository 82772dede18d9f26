//! Canonical byte serialization for `Value`, and the two hash functions
//! the store uses: a fast non-cryptographic hash for mutation detection
//! (spec.md §4.3) and a cryptographic hash for content-addressed commit
//! identifiers (spec.md §3 "Invariants").

use agex_core::Value;
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, thiserror::Error)]
#[error("failed to serialize value: {0}")]
pub struct SerializeError(String);

/// The one canonical binary format every stored value round-trips
/// through. Picking a single format is what makes mutation-detection
/// byte-hash comparison meaningful (spec.md §9 "Mutation detection by
/// re-serialization").
pub fn serialize_value(value: &Value) -> Result<Vec<u8>, SerializeError> {
    bincode::serialize(value).map_err(|e| SerializeError(e.to_string()))
}

pub fn deserialize_value(bytes: &[u8]) -> Result<Value, SerializeError> {
    bincode::deserialize(bytes).map_err(|e| SerializeError(e.to_string()))
}

/// Fast, non-cryptographic hash used only to detect whether a
/// re-serialized value's bytes changed since it was first read — not a
/// security boundary.
pub fn mutation_hash(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}

/// Stable content hash used to derive commit identifiers: a commit's
/// identity is a function of its parent and its keyset, so identical
/// history replays produce identical hashes.
pub fn content_hash(parts: &[&[u8]]) -> String {
    let mut hasher = sha2::Sha256::new();
    use sha2::Digest;
    for p in parts {
        hasher.update(p);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_value() {
        let v = Value::Str("hello".into());
        let bytes = serialize_value(&v).unwrap();
        let back = deserialize_value(&bytes).unwrap();
        assert!(agex_core::values_equal(&v, &back));
    }

    #[test]
    fn mutation_hash_changes_with_content() {
        let a = serialize_value(&Value::Int(1)).unwrap();
        let b = serialize_value(&Value::Int(2)).unwrap();
        assert_ne!(mutation_hash(&a), mutation_hash(&b));
    }

    #[test]
    fn content_hash_is_deterministic() {
        let a = content_hash(&[b"parent", b"keys"]);
        let b = content_hash(&[b"parent", b"keys"]);
        assert_eq!(a, b);
    }
}
