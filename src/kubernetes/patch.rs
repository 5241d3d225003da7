// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! JSON merge patch (RFC 7386) computation.

use serde_json::{Map, Value};

/// Compute the merge patch that turns `old` into `new`.
///
/// Objects are diffed key by key, removed keys become `null`, and every other value
/// (arrays included) is replaced as a whole when it differs.
pub fn merge_patch_diff(old: &Value, new: &Value) -> Value {
    match (old, new) {
        (Value::Object(old), Value::Object(new)) => {
            let mut patch = Map::new();

            for (key, old_value) in old {
                match new.get(key) {
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                    Some(new_value) if new_value != old_value => {
                        patch.insert(key.clone(), merge_patch_diff(old_value, new_value));
                    }
                    Some(_) => {}
                }
            }

            for (key, new_value) in new {
                if !old.contains_key(key) {
                    patch.insert(key.clone(), new_value.clone());
                }
            }

            Value::Object(patch)
        }
        _ => new.clone(),
    }
}

/// True if the patch would not change anything
pub fn is_empty_patch(patch: &Value) -> bool {
    matches!(patch, Value::Object(m) if m.is_empty())
}
