//! Content hashing for row identity.
//!
//! Dimension members and fact rows are keyed by a digest of their logical
//! content rather than an auto-increment id, so re-loading identical data
//! yields identical keys. The algorithm is pinned: values are re-encoded
//! as canonical JSON (object keys lexicographically sorted, compact
//! separators) and digested with SHA-256, rendered as 64 lowercase hex
//! characters. Changing any part of this is a schema-breaking change and
//! must bump [`CONTENT_HASH_VERSION`].

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Version of the canonical-encoding + digest algorithm.
pub const CONTENT_HASH_VERSION: u32 = 1;

/// Compute the content hash of a JSON value.
///
/// Object keys are sorted before encoding, so two values with identical
/// logical content but different key order hash identically.
pub fn content_hash(value: &Value) -> String {
    let canonical = canonicalize(value);
    // serde_json objects are BTreeMap-backed: encoding is key-sorted and
    // compact, which is exactly the canonical form we pin.
    let encoded = serde_json::to_string(&canonical).expect("canonical JSON value always encodes");
    let mut hasher = Sha256::new();
    hasher.update(encoded.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compute the content hash of an ordered attribute/value sequence.
///
/// Used for compound dimension members, where the declared attribute set
/// fixes which parts of the input participate in identity.
pub fn member_hash<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a Value)>) -> String {
    let object: serde_json::Map<String, Value> = pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    content_hash(&Value::Object(object))
}

/// Rebuild a value with every nested object in sorted-key form.
///
/// Keys are sorted explicitly rather than relying on the map backing, so
/// the encoding stays canonical even if serde_json's `preserve_order`
/// feature is enabled somewhere in the dependency graph.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut rebuilt = serde_json::Map::new();
            for (key, value) in entries {
                rebuilt.insert(key.clone(), canonicalize(value));
            }
            Value::Object(rebuilt)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
