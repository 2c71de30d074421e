//! Canonical JSON encoding.
//!
//! Envelopes sign the exact bytes they carry, so two servers serialising the
//! same event must agree byte-for-byte. Canonical JSON here means: object keys
//! sorted lexicographically at every depth, no insignificant whitespace.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Produce canonical JSON (sorted keys, no extra whitespace).
pub fn canonical_json(value: &Value) -> String {
    sort_keys(value).to_string()
}

/// Serialise any value to canonical JSON bytes.
pub fn to_canonical_vec<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    Ok(canonical_json(&value).into_bytes())
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: serde_json::Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), sort_keys(v)))
                .collect::<BTreeMap<_, _>>()
                .into_iter()
                .collect();
            Value::Object(sorted)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted_at_every_depth() {
        let value = json!({ "b": 1, "a": { "z": [ { "y": 1, "x": 2 } ], "c": null } });
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"c":null,"z":[{"x":2,"y":1}]},"b":1}"#
        );
    }

    #[test]
    fn struct_field_order_does_not_matter() {
        #[derive(Serialize)]
        struct Forward { a: u8, b: u8 }
        #[derive(Serialize)]
        struct Reverse { b: u8, a: u8 }

        assert_eq!(
            to_canonical_vec(&Forward { a: 1, b: 2 }).unwrap(),
            to_canonical_vec(&Reverse { b: 2, a: 1 }).unwrap()
        );
    }
}
