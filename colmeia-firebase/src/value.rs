//! Conversion between plain JSON and Firestore typed values.
//!
//! Firestore's REST API wraps every value in a single-key object naming its
//! type (`{"stringValue": "a"}`, `{"integerValue": "3"}`, ...). Integers travel
//! as strings. Timestamps, references and bytes decode to strings.

use colmeia_core::{StorageError, StoreResult};
use colmeia_storage::Fields;
use serde_json::{json, Map, Number, Value};

/// Encode a JSON value as a Firestore `Value`.
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64().unwrap_or_default() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            if values.is_empty() {
                json!({ "arrayValue": {} })
            } else {
                json!({ "arrayValue": { "values": values } })
            }
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Encode a field map as the `fields` object of a Firestore document.
pub fn encode_fields(fields: &Fields) -> Value {
    let encoded: Map<String, Value> = fields
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect();
    Value::Object(encoded)
}

fn decode_error(reason: impl Into<String>) -> StorageError {
    StorageError::Decode {
        reason: reason.into(),
    }
}

/// Decode a Firestore `Value` into plain JSON.
pub fn decode_value(value: &Value) -> StoreResult<Value> {
    let object = value
        .as_object()
        .ok_or_else(|| decode_error("typed value is not an object"))?;
    let (kind, inner) = object
        .iter()
        .next()
        .ok_or_else(|| decode_error("typed value is empty"))?;

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => inner
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| decode_error("booleanValue is not a bool")),
        "integerValue" => {
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                Value::Number(n) => n.as_i64(),
                _ => None,
            };
            parsed
                .map(|i| Value::Number(i.into()))
                .ok_or_else(|| decode_error(format!("bad integerValue: {}", inner)))
        }
        "doubleValue" => {
            let parsed = match inner {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.parse::<f64>().ok(),
                _ => None,
            };
            parsed
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| decode_error(format!("bad doubleValue: {}", inner)))
        }
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| decode_error(format!("{} is not a string", kind))),
        "geoPointValue" => Ok(inner.clone()),
        "arrayValue" => {
            let values = match inner.get("values") {
                Some(Value::Array(values)) => values
                    .iter()
                    .map(decode_value)
                    .collect::<StoreResult<Vec<_>>>()?,
                Some(_) => return Err(decode_error("arrayValue.values is not an array")),
                None => Vec::new(),
            };
            Ok(Value::Array(values))
        }
        "mapValue" => match inner.get("fields") {
            Some(fields) => decode_fields(fields).map(Value::Object),
            None => Ok(Value::Object(Map::new())),
        },
        other => Err(decode_error(format!("unsupported value type {}", other))),
    }
}

/// Decode the `fields` object of a Firestore document.
pub fn decode_fields(fields: &Value) -> StoreResult<Fields> {
    let object = fields
        .as_object()
        .ok_or_else(|| decode_error("fields is not an object"))?;
    object
        .iter()
        .map(|(k, v)| decode_value(v).map(|decoded| (k.clone(), decoded)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_integers_travel_as_strings() {
        assert_eq!(encode_value(&json!(42)), json!({"integerValue": "42"}));
        assert_eq!(decode_value(&json!({"integerValue": "-7"})).unwrap(), json!(-7));
    }

    #[test]
    fn test_nested_task_document() {
        let fields = json!({
            "title": "Ship",
            "workspaceIdPg": 3,
            "attachment": {"url": "https://x", "size": 1.5},
            "tags": [],
            "expirationDate": null,
        });
        let Value::Object(map) = fields.clone() else {
            unreachable!()
        };
        let encoded = encode_fields(&map);
        assert_eq!(encoded["tags"], json!({"arrayValue": {}}));
        assert_eq!(
            encoded["attachment"]["mapValue"]["fields"]["size"],
            json!({"doubleValue": 1.5})
        );
        assert_eq!(Value::Object(decode_fields(&encoded).unwrap()), fields);
    }

    #[test]
    fn test_timestamp_decodes_to_string() {
        let decoded = decode_value(&json!({"timestampValue": "2024-05-01T12:00:00.000Z"})).unwrap();
        assert_eq!(decoded, json!("2024-05-01T12:00:00.000Z"));
    }

    #[test]
    fn test_unknown_type_is_error() {
        assert!(decode_value(&json!({"mysteryValue": 1})).is_err());
        assert!(decode_value(&json!({})).is_err());
        assert!(decode_value(&json!({"integerValue": "abc"})).is_err());
    }

    fn json_strategy() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|i| Value::Number(i.into())),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(value in json_strategy()) {
            prop_assert_eq!(decode_value(&encode_value(&value)).unwrap(), value);
        }
    }
}
