//! Canonical JSON serialization and param hashing.
//!
//! The node cache compares a hash of each node's *resolved* params against
//! the hash recorded in the checkpoint. For that comparison to be stable the
//! serialization must be canonical: object keys are emitted in sorted order
//! at every depth, with no insignificant whitespace. The hash is the MD5 hex
//! digest of that canonical form.

use serde_json::Value;

use crate::types::JsonMap;

/// Serialize a JSON value with recursively sorted object keys.
///
/// Arrays keep their order; only object key order is normalized.
///
/// # Examples
///
/// ```rust
/// use pflow::utils::canonical::canonical_json;
/// use serde_json::json;
///
/// let a = canonical_json(&json!({"b": 1, "a": {"y": 2, "x": 3}}));
/// let b = canonical_json(&json!({"a": {"x": 3, "y": 2}, "b": 1}));
/// assert_eq!(a, b);
/// ```
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

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
                // String keys always serialize.
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
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
        scalar => {
            out.push_str(&serde_json::to_string(scalar).unwrap_or_default());
        }
    }
}

/// MD5 hex digest of a param map's canonical JSON form.
///
/// This is the hash stored in `__execution__.node_hashes` and compared on
/// every cache check.
#[must_use]
pub fn param_hash(params: &JsonMap) -> String {
    let canonical = canonical_json(&Value::Object(params.clone()));
    format!("{:x}", md5::compute(canonical.as_bytes()))
}
