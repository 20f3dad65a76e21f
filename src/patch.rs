// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Patch document application.
//!
//! Three formats are supported, selected by [`PatchType`]:
//!
//! - **JSON Patch** (RFC 6902): an array of operations, applied with the
//!   `json-patch` crate.
//! - **JSON Merge Patch** (RFC 7386): objects merge recursively, `null`
//!   removes a key, everything else (including arrays) replaces.
//! - **Strategic merge patch**: merge patch plus keyed list merging for the
//!   list fields a kind declares in [`RegistryKind::MERGE_KEYS`](crate::crd::RegistryKind),
//!   and the `$patch: replace` / `$patch: delete` directives.
//!
//! # Example
//!
//! ```rust
//! use cluster_registry::options::PatchType;
//! use cluster_registry::patch::apply_patch;
//! use serde_json::json;
//!
//! let doc = json!({"metadata": {"labels": {"env": "dev", "tier": "web"}}});
//! let patch = json!({"metadata": {"labels": {"env": "prod", "tier": null}}});
//! let out = apply_patch(&doc, PatchType::Merge, &patch, &[]).unwrap();
//! assert_eq!(out, json!({"metadata": {"labels": {"env": "prod"}}}));
//! ```

use crate::errors::RegistryError;
use crate::options::PatchType;
use serde_json::{Map, Value};

/// Directive key recognised inside strategic merge patches.
const PATCH_DIRECTIVE: &str = "$patch";

/// Apply `patch` of the given type to `doc`, returning the patched document.
///
/// # Errors
///
/// Returns `BadRequest` if the patch document is malformed or cannot be
/// applied (e.g. a JSON Patch `test` operation fails).
pub fn apply_patch(
    doc: &Value,
    patch_type: PatchType,
    patch: &Value,
    merge_keys: &[(&str, &str)],
) -> Result<Value, RegistryError> {
    let mut out = doc.clone();
    match patch_type {
        PatchType::Json => {
            let ops: json_patch::Patch = serde_json::from_value(patch.clone())
                .map_err(|e| RegistryError::BadRequest(format!("malformed JSON patch: {e}")))?;
            json_patch::patch(&mut out, &ops)
                .map_err(|e| RegistryError::BadRequest(format!("unable to apply JSON patch: {e}")))?;
        }
        PatchType::Merge => {
            if !patch.is_object() {
                return Err(RegistryError::BadRequest(
                    "merge patch must be a JSON object".to_string(),
                ));
            }
            json_patch::merge(&mut out, patch);
        }
        PatchType::Strategic => {
            let Value::Object(patch) = patch else {
                return Err(RegistryError::BadRequest(
                    "strategic merge patch must be a JSON object".to_string(),
                ));
            };
            if directive(patch) == Some("delete") {
                return Err(RegistryError::BadRequest(
                    "$patch: delete is not allowed at the top level".to_string(),
                ));
            }
            strategic_merge(&mut out, patch, merge_keys)?;
        }
    }
    Ok(out)
}

fn directive(map: &Map<String, Value>) -> Option<&str> {
    map.get(PATCH_DIRECTIVE).and_then(Value::as_str)
}

/// Copy of `map` without any `$`-prefixed directive keys, recursively.
fn strip_directives(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !k.starts_with('$'))
                .map(|(k, v)| (k.clone(), strip_directives(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_directives).collect()),
        other => other.clone(),
    }
}

fn strategic_merge(
    target: &mut Value,
    patch: &Map<String, Value>,
    merge_keys: &[(&str, &str)],
) -> Result<(), RegistryError> {
    match directive(patch) {
        Some("replace") => {
            *target = strip_directives(&Value::Object(patch.clone()));
            return Ok(());
        }
        Some("delete") | None => {}
        Some(other) => {
            return Err(RegistryError::BadRequest(format!(
                "unknown patch directive {other:?}"
            )));
        }
    }

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(target_map) = target else {
        return Ok(());
    };

    for (key, value) in patch.iter().filter(|(k, _)| !k.starts_with('$')) {
        match value {
            Value::Null => {
                target_map.remove(key);
            }
            Value::Object(child) if directive(child) == Some("delete") => {
                target_map.remove(key);
            }
            Value::Object(child) => {
                let entry = target_map
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                strategic_merge(entry, child, merge_keys)?;
            }
            Value::Array(items) => {
                let merge_key = merge_keys
                    .iter()
                    .find(|(field, _)| field == key)
                    .map(|(_, mk)| *mk);
                if let Some(mk) = merge_key {
                    if let Some(Value::Array(existing)) = target_map.get_mut(key) {
                        merge_keyed_list(existing, items, mk, merge_keys)?;
                        continue;
                    }
                }
                let cleaned: Vec<Value> = items
                    .iter()
                    .filter(|item| {
                        !item
                            .as_object()
                            .is_some_and(|m| directive(m) == Some("delete"))
                    })
                    .map(strip_directives)
                    .collect();
                target_map.insert(key.clone(), Value::Array(cleaned));
            }
            scalar => {
                target_map.insert(key.clone(), scalar.clone());
            }
        }
    }
    Ok(())
}

/// Merge list `patch` into `existing`, matching elements on `merge_key`.
fn merge_keyed_list(
    existing: &mut Vec<Value>,
    patch: &[Value],
    merge_key: &str,
    merge_keys: &[(&str, &str)],
) -> Result<(), RegistryError> {
    for item in patch {
        let Value::Object(item_map) = item else {
            return Err(RegistryError::BadRequest(format!(
                "list elements merged on {merge_key:?} must be objects"
            )));
        };
        let Some(key_value) = item_map.get(merge_key) else {
            return Err(RegistryError::BadRequest(format!(
                "list element is missing merge key {merge_key:?}"
            )));
        };
        let position = existing
            .iter()
            .position(|e| e.get(merge_key) == Some(key_value));

        match (directive(item_map), position) {
            (Some("delete"), Some(pos)) => {
                existing.remove(pos);
            }
            (Some("delete"), None) => {}
            (_, Some(pos)) => strategic_merge(&mut existing[pos], item_map, merge_keys)?,
            (_, None) => existing.push(strip_directives(item)),
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "patch_tests.rs"]
mod patch_tests;
