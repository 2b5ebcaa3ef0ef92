//! JSON manipulation helpers.
//!
//! Provides the deep-merge used for workflow metadata patches: objects merge
//! recursively, everything else is replaced by the right operand.

use serde_json::{Map, Value};

/// Deep-merge `patch` into `base`, preferring `patch` on conflict.
///
/// Objects merge key-by-key; arrays and scalars from `patch` replace the
/// corresponding `base` value wholesale. A `null` in `patch` overwrites.
///
/// # Examples
///
/// ```rust
/// use pflow::utils::json_ext::deep_merge;
/// use serde_json::json;
///
/// let merged = deep_merge(
///     &json!({"count": 1, "last": {"at": "t0", "ok": true}}),
///     &json!({"count": 2, "last": {"at": "t1"}}),
/// );
/// assert_eq!(merged, json!({"count": 2, "last": {"at": "t1", "ok": true}}));
/// ```
#[must_use]
pub fn deep_merge(base: &Value, patch: &Value) -> Value {
    match (base, patch) {
        (Value::Object(base_obj), Value::Object(patch_obj)) => {
            let mut result: Map<String, Value> = base_obj.clone();
            for (key, patch_value) in patch_obj {
                let merged = match base_obj.get(key) {
                    Some(base_value) => deep_merge(base_value, patch_value),
                    None => patch_value.clone(),
                };
                result.insert(key.clone(), merged);
            }
            Value::Object(result)
        }
        (_, replacement) => replacement.clone(),
    }
}
