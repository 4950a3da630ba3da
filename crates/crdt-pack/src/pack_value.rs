//! [`PackValue`]: the universal value type carried by CBOR and the CRDT
//! codecs.

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use serde_json::{Map, Number, Value};

/// Prefix used when binary data has to travel through plain JSON.
pub const BYTES_DATA_URI_PREFIX: &str = "data:application/octet-stream;base64,";

/// JSON plus `undefined` and binary data.
///
/// Integers that fit into `i64` are always held as [`PackValue::Integer`];
/// [`PackValue::UInteger`] only carries values above `i64::MAX`. Every
/// constructor in this crate keeps that normalisation so that structural
/// equality is meaningful after a round trip.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PackValue {
    Null,
    #[default]
    Undefined,
    Bool(bool),
    Integer(i64),
    UInteger(u64),
    Float(f64),
    Bytes(Vec<u8>),
    Str(String),
    Array(Vec<PackValue>),
    /// Ordered key-value pairs.
    Object(Vec<(String, PackValue)>),
}

impl PackValue {
    /// Builds an unsigned integer value, normalised to `Integer` when it fits.
    pub fn uint(n: u64) -> Self {
        match i64::try_from(n) {
            Ok(i) => PackValue::Integer(i),
            Err(_) => PackValue::UInteger(n),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, PackValue::Undefined)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PackValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PackValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PackValue::Integer(i) => Some(*i),
            PackValue::UInteger(u) => i64::try_from(*u).ok(),
            PackValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PackValue]> {
        match self {
            PackValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&[(String, PackValue)]> {
        match self {
            PackValue::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Looks a key up in an object value.
    pub fn get(&self, key: &str) -> Option<&PackValue> {
        self.as_object()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Converts to JSON. Binary data becomes a base64 data URI, `undefined`
    /// becomes `null` inside arrays and is dropped from objects.
    pub fn to_json(&self) -> Value {
        match self {
            PackValue::Null | PackValue::Undefined => Value::Null,
            PackValue::Bool(b) => Value::Bool(*b),
            PackValue::Integer(i) => Value::Number((*i).into()),
            PackValue::UInteger(u) => Value::Number((*u).into()),
            PackValue::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            PackValue::Bytes(b) => Value::String(format!("{BYTES_DATA_URI_PREFIX}{}", B64.encode(b))),
            PackValue::Str(s) => Value::String(s.clone()),
            PackValue::Array(arr) => Value::Array(arr.iter().map(PackValue::to_json).collect()),
            PackValue::Object(obj) => {
                let mut map = Map::with_capacity(obj.len());
                for (k, v) in obj {
                    if !v.is_undefined() {
                        map.insert(k.clone(), v.to_json());
                    }
                }
                Value::Object(map)
            }
        }
    }

    /// Inverse of [`PackValue::to_json`]: strings carrying the binary data URI
    /// prefix are turned back into bytes.
    pub fn from_json_lossless(value: &Value) -> Self {
        match value {
            Value::String(s) => match s.strip_prefix(BYTES_DATA_URI_PREFIX) {
                Some(b64) => match B64.decode(b64) {
                    Ok(bytes) => PackValue::Bytes(bytes),
                    Err(_) => PackValue::Str(s.clone()),
                },
                None => PackValue::Str(s.clone()),
            },
            Value::Array(arr) => PackValue::Array(arr.iter().map(Self::from_json_lossless).collect()),
            Value::Object(obj) => PackValue::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json_lossless(v)))
                    .collect(),
            ),
            other => PackValue::from(other),
        }
    }
}

impl From<&Value> for PackValue {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => PackValue::Null,
            Value::Bool(b) => PackValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    PackValue::Integer(i)
                } else if let Some(u) = n.as_u64() {
                    PackValue::UInteger(u)
                } else {
                    PackValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => PackValue::Str(s.clone()),
            Value::Array(arr) => PackValue::Array(arr.iter().map(PackValue::from).collect()),
            Value::Object(obj) => PackValue::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), PackValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for PackValue {
    fn from(v: Value) -> Self {
        PackValue::from(&v)
    }
}

impl From<PackValue> for Value {
    fn from(v: PackValue) -> Self {
        v.to_json()
    }
}

impl From<&str> for PackValue {
    fn from(s: &str) -> Self {
        PackValue::Str(s.to_owned())
    }
}

impl From<String> for PackValue {
    fn from(s: String) -> Self {
        PackValue::Str(s)
    }
}

impl From<bool> for PackValue {
    fn from(b: bool) -> Self {
        PackValue::Bool(b)
    }
}

impl From<i64> for PackValue {
    fn from(i: i64) -> Self {
        PackValue::Integer(i)
    }
}

impl From<f64> for PackValue {
    fn from(f: f64) -> Self {
        PackValue::Float(f)
    }
}

impl From<Vec<u8>> for PackValue {
    fn from(b: Vec<u8>) -> Self {
        PackValue::Bytes(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_numbers_are_normalised() {
        assert_eq!(PackValue::from(json!(5)), PackValue::Integer(5));
        assert_eq!(PackValue::from(json!(-5)), PackValue::Integer(-5));
        assert_eq!(PackValue::from(json!(u64::MAX)), PackValue::UInteger(u64::MAX));
        assert_eq!(PackValue::from(json!(1.5)), PackValue::Float(1.5));
        assert_eq!(PackValue::uint(7), PackValue::Integer(7));
    }

    #[test]
    fn undefined_is_dropped_from_objects() {
        let v = PackValue::Object(vec![
            ("a".into(), PackValue::Integer(1)),
            ("b".into(), PackValue::Undefined),
        ]);
        assert_eq!(v.to_json(), json!({"a": 1}));
        let arr = PackValue::Array(vec![PackValue::Undefined]);
        assert_eq!(arr.to_json(), json!([null]));
    }

    #[test]
    fn bytes_survive_json_as_data_uri() {
        let v = PackValue::Bytes(vec![1, 2, 3]);
        let json = v.to_json();
        assert!(json.as_str().unwrap().starts_with(BYTES_DATA_URI_PREFIX));
        assert_eq!(PackValue::from_json_lossless(&json), v);
    }

    #[test]
    fn object_lookup() {
        let v = PackValue::from(json!({"x": true}));
        assert_eq!(v.get("x"), Some(&PackValue::Bool(true)));
        assert_eq!(v.get("y"), None);
    }
}
