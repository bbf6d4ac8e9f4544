//! Cache key derivation
//!
//! Keys are produced by canonicalizing a parameter object (stable field
//! ordering, recursively) and hashing the result, so semantically identical
//! parameter sets collide to the same key regardless of declaration order.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Derive a short, stable cache key from a parameter object.
pub fn cache_key(params: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(params, &mut canonical);
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(&digest[..8])
}

// Explicit canonical form rather than relying on serde_json's map ordering,
// which flips to insertion order when the preserve_order feature is enabled
// anywhere in the dependency graph.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                if let Some(child) = map.get(*key) {
                    write_canonical(child, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
