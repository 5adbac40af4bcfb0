//! Canonical operation parameter encoding.
//!
//! Two parameter objects that differ only in key order must address the same
//! cached preview, so keys are produced from a sorted rendition of the JSON.

use serde_json::{Map, Value};

/// Returns `params` with every object's keys sorted, recursively.
pub fn canonical_params(params: &Value) -> Value {
	match params {
		Value::Object(map) => {
			let mut keys: Vec<&String> = map.keys().collect();
			keys.sort();
			let mut sorted = Map::with_capacity(map.len());
			for key in keys {
				sorted.insert(key.clone(), canonical_params(&map[key]));
			}
			Value::Object(sorted)
		}
		Value::Array(items) => Value::Array(items.iter().map(canonical_params).collect()),
		other => other.clone(),
	}
}

/// Cache key for a preview of `op` with `params`, formatted `op:{json}`.
pub fn preview_key(op: &str, params: &Value) -> String {
	format!("{op}:{}", canonical_params(params))
}
