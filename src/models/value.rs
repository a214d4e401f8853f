//! Native value representation for rows and documents.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

/// A scalar or compound value as seen by the client.
///
/// Dates and datetimes are first-class (the wire format carries them as
/// text, JSON does not carry them at all), integers keep their signedness,
/// and nested documents are `Object` trees that the flattener decomposes
/// before anything reaches the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent / SQL NULL
    Null,
    /// Boolean (stored as UInt8 on the store side)
    Bool(bool),
    /// Signed 64-bit integer
    Int(i64),
    /// Unsigned 64-bit integer
    UInt(u64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Calendar date
    Date(NaiveDate),
    /// Date and time, second precision, no timezone
    DateTime(NaiveDateTime),
    /// Array of values
    Array(Vec<Value>),
    /// Nested record
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Whether this value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value is an empty array or empty object.
    ///
    /// Such values carry no type information and are dropped instead of
    /// being transmitted (the store applies the column default).
    pub fn is_empty_container(&self) -> bool {
        match self {
            Value::Array(elements) => elements.is_empty(),
            Value::Object(fields) => fields.is_empty(),
            _ => false,
        }
    }

    /// String content, if this is a `String` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Signed integer content, widening `UInt` and `Bool` where possible.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::UInt(u) => i64::try_from(*u).ok(),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Convert to the JSON representation used for fallback serialization.
    ///
    /// Dates render as their wire text (`YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`)
    /// since JSON has no temporal values.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::UInt(u) => JsonValue::from(*u),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => JsonValue::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            Value::Array(elements) => JsonValue::Array(elements.iter().map(Value::to_json).collect()),
            Value::Object(fields) => JsonValue::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Canonical index key for the filterable cache.
    ///
    /// Booleans and integers share one keyspace (the store compares them as
    /// integers); strings, floats, dates and datetimes each keep their own.
    /// Compound values and `Null` are not indexable.
    pub(crate) fn index_key(&self) -> Option<String> {
        match self {
            Value::Null | Value::Array(_) | Value::Object(_) => None,
            Value::Bool(b) => Some(format!("i:{}", i64::from(*b))),
            Value::Int(i) => Some(format!("i:{i}")),
            Value::UInt(u) => match i64::try_from(*u) {
                Ok(i) => Some(format!("i:{i}")),
                Err(_) => Some(format!("u:{u}")),
            },
            Value::Float(f) => Some(format!("f:{f}")),
            Value::String(s) => Some(format!("s:{s}")),
            Value::Date(d) => Some(format!("d:{d}")),
            Value::DateTime(dt) => Some(format!("t:{dt}")),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(elements) => {
                Value::Array(elements.into_iter().map(Value::from).collect())
            }
            JsonValue::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&JsonValue> for Value {
    fn from(json: &JsonValue) -> Self {
        Value::from(json.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Value::UInt(u)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(elements: Vec<V>) -> Self {
        Value::Array(elements.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_round_trip() {
        let value = Value::from(json!({"id": 1, "name": "x", "tags": ["a", "b"], "missing": null}));
        let Value::Object(fields) = &value else {
            panic!("expected object");
        };
        assert_eq!(fields.get("id"), Some(&Value::Int(1)));
        assert_eq!(fields.get("name"), Some(&Value::String("x".to_string())));
        assert_eq!(fields.get("missing"), Some(&Value::Null));

        assert_eq!(
            value.to_json(),
            json!({"id": 1, "name": "x", "tags": ["a", "b"], "missing": null})
        );
    }

    #[test]
    fn test_dates_serialize_as_wire_text() {
        let d = Value::Date(NaiveDate::from_ymd_opt(2020, 6, 1).unwrap());
        assert_eq!(d.to_json(), json!("2020-06-01"));

        let dt = Value::DateTime(
            NaiveDate::from_ymd_opt(2020, 6, 1)
                .unwrap()
                .and_hms_opt(13, 30, 5)
                .unwrap(),
        );
        assert_eq!(dt.to_json(), json!("2020-06-01 13:30:05"));
    }

    #[test]
    fn test_empty_container_detection() {
        assert!(Value::Array(vec![]).is_empty_container());
        assert!(Value::Object(BTreeMap::new()).is_empty_container());
        assert!(!Value::String(String::new()).is_empty_container());
        assert!(!Value::Int(0).is_empty_container());
    }

    #[test]
    fn test_index_keys_unify_integers() {
        assert_eq!(Value::Bool(true).index_key(), Value::Int(1).index_key());
        assert_eq!(Value::UInt(7).index_key(), Value::Int(7).index_key());
        assert_ne!(Value::Int(1).index_key(), Value::String("1".to_string()).index_key());
        assert_eq!(Value::Null.index_key(), None);
    }
}
