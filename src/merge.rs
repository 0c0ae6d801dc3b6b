//! Tree merging for configuration documents.
//!
//! Two flavours live here:
//! - [`deep_merge`] layers whole documents (defaults under file content).
//!   Arrays are replaced entirely, not concatenated.
//! - [`structural_merge`] applies an overlay patch in place. It is
//!   schema-aware for lists of mappings keyed by `name` and refuses to merge
//!   values of incompatible shapes.

use crate::error::{ConfigError, Result};
use serde_json::Value;

/// Key identifying elements of a list of mappings during a structural merge.
pub const MERGE_KEY: &str = "name";

/// Lay `top` over `base`. Mappings merge recursively, nulls in `top` keep
/// the base value and everything else replaces it. Never fails.
pub fn deep_merge(mut base: Value, top: Value) -> Value {
    layer(&mut base, top);
    base
}

fn layer(target: &mut Value, top: Value) {
    if keeps_target(&top) {
        return;
    }
    match (target, top) {
        (Value::Object(base), Value::Object(top)) => {
            for (key, value) in top {
                match base.get_mut(&key) {
                    Some(existing) => layer(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (target, top) => *target = top,
    }
}

/// Merge `patch` into `target` in place.
///
/// - Mappings merge key-wise and recursively.
/// - A null patch value keeps whatever the target holds.
/// - A null target takes the patch as is.
/// - Lists whose patch elements are all mappings carrying [`MERGE_KEY`] are
///   merged element-wise: the target element with the same key is merged
///   recursively, unmatched patch elements are appended.
/// - Other lists replace the target list.
/// - Scalars replace scalars.
/// - Anything else (list into scalar, mapping into list, ...) is a
///   [`ConfigError::Merge`] naming the dotted path of the conflict.
///
/// On error `target` may be partially merged; callers that need atomicity
/// merge into a copy.
pub fn structural_merge(target: &mut Value, patch: Value) -> Result<()> {
    merge_at(target, patch, "")
}

fn merge_at(target: &mut Value, patch: Value, path: &str) -> Result<()> {
    if keeps_target(&patch) {
        return Ok(());
    }
    if target.is_null() {
        *target = patch;
        return Ok(());
    }

    match (target, patch) {
        (Value::Object(base), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                let child_path = join(path, &key);
                match base.get_mut(&key) {
                    Some(existing) => merge_at(existing, value, &child_path)?,
                    None if value.is_null() => {}
                    None => {
                        base.insert(key, value);
                    }
                }
            }
            Ok(())
        }
        (Value::Array(base), Value::Array(items)) => {
            if is_keyed_list(&items) && base.iter().all(Value::is_object) {
                merge_keyed(base, items, path)
            } else {
                *base = items;
                Ok(())
            }
        }
        (target, patch) => {
            if is_scalar(target) && is_scalar(&patch) {
                *target = patch;
                Ok(())
            } else {
                Err(ConfigError::Merge {
                    path: path.to_string(),
                    target: kind_name(target),
                    patch: kind_name(&patch),
                })
            }
        }
    }
}

fn merge_keyed(base: &mut Vec<Value>, items: Vec<Value>, path: &str) -> Result<()> {
    for item in items {
        let key = item.get(MERGE_KEY).cloned().unwrap_or(Value::Null);
        let position = base.iter().position(|e| e.get(MERGE_KEY) == Some(&key));
        match position {
            Some(index) => {
                let element_path = join(path, &format!("[{MERGE_KEY}={}]", display_key(&key)));
                merge_at(&mut base[index], item, &element_path)?;
            }
            None => base.push(item),
        }
    }
    Ok(())
}

// null means "not specified" in both merge flavours
fn keeps_target(patch: &Value) -> bool {
    patch.is_null()
}

fn is_keyed_list(items: &[Value]) -> bool {
    !items.is_empty()
        && items
            .iter()
            .all(|item| item.as_object().is_some_and(|m| m.contains_key(MERGE_KEY)))
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

fn display_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Human readable kind of a value, used in error messages.
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}
