//! # Event Arguments
//!
//! [`Data`] is a JSON value that may also hold raw binary. On the wire binary
//! values travel out of band; in the JSON text they are replaced by
//! placeholders:
//!
//! ```text
//! {"_placeholder":true,"num":0}
//! ```
//!
//! where `num` is the index of the attachment, counted in emission order.

use crate::error::{constants, ProtocolError, Result};
use bytes::Bytes;
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

const PLACEHOLDER_KEY: &str = "_placeholder";
const NUM_KEY: &str = "num";

/// A JSON value extended with binary
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Data {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Binary(Bytes),
    Array(Vec<Data>),
    Object(IndexMap<String, Data>),
}

impl Data {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Data::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Bytes> {
        match self {
            Data::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Resolve placeholders in `value` against received attachments
    pub fn resolve(value: Value, attachments: &[Bytes]) -> Result<Data> {
        Ok(match value {
            Value::Null => Data::Null,
            Value::Bool(b) => Data::Bool(b),
            Value::Number(n) => Data::Number(n),
            Value::String(s) => Data::String(s),
            Value::Array(items) => Data::Array(
                items
                    .into_iter()
                    .map(|item| Data::resolve(item, attachments))
                    .collect::<Result<_>>()?,
            ),
            Value::Object(map) => match placeholder_index(&map) {
                Some(num) => attachments
                    .get(num)
                    .cloned()
                    .map(Data::Binary)
                    .ok_or_else(|| {
                        ProtocolError::Decode(constants::ERR_INVALID_PLACEHOLDER.into())
                    })?,
                None => Data::Object(
                    map.into_iter()
                        .map(|(k, v)| -> Result<(String, Data)> {
                            Ok((k, Data::resolve(v, attachments)?))
                        })
                        .collect::<Result<_>>()?,
                ),
            },
        })
    }
}

fn placeholder_index(map: &Map<String, Value>) -> Option<usize> {
    if map.get(PLACEHOLDER_KEY) != Some(&Value::Bool(true)) {
        return None;
    }
    map.get(NUM_KEY)
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
}

/// Split `data` into JSON with placeholders and the binary attachments they
/// refer to, in depth-first order.
pub fn deconstruct(data: Data) -> (Value, Vec<Bytes>) {
    let mut buffers = Vec::new();
    let value = extract(data, &mut buffers);
    (value, buffers)
}

fn extract(data: Data, buffers: &mut Vec<Bytes>) -> Value {
    match data {
        Data::Null => Value::Null,
        Data::Bool(b) => Value::Bool(b),
        Data::Number(n) => Value::Number(n),
        Data::String(s) => Value::String(s),
        Data::Binary(bytes) => {
            let num = buffers.len();
            buffers.push(bytes);
            serde_json::json!({ PLACEHOLDER_KEY: true, NUM_KEY: num })
        }
        Data::Array(items) => {
            Value::Array(items.into_iter().map(|d| extract(d, buffers)).collect())
        }
        Data::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, extract(v, buffers)))
                .collect(),
        ),
    }
}

impl From<Value> for Data {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Data::Null,
            Value::Bool(b) => Data::Bool(b),
            Value::Number(n) => Data::Number(n),
            Value::String(s) => Data::String(s),
            Value::Array(items) => Data::Array(items.into_iter().map(Data::from).collect()),
            Value::Object(map) => {
                Data::Object(map.into_iter().map(|(k, v)| (k, Data::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Data {
    fn from(s: &str) -> Self {
        Data::String(s.to_string())
    }
}

impl From<String> for Data {
    fn from(s: String) -> Self {
        Data::String(s)
    }
}

impl From<bool> for Data {
    fn from(b: bool) -> Self {
        Data::Bool(b)
    }
}

impl From<i64> for Data {
    fn from(n: i64) -> Self {
        Data::Number(n.into())
    }
}

impl From<i32> for Data {
    fn from(n: i32) -> Self {
        Data::Number(n.into())
    }
}

impl From<u64> for Data {
    fn from(n: u64) -> Self {
        Data::Number(n.into())
    }
}

impl From<Bytes> for Data {
    fn from(b: Bytes) -> Self {
        Data::Binary(b)
    }
}

impl From<Vec<u8>> for Data {
    fn from(b: Vec<u8>) -> Self {
        Data::Binary(Bytes::from(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_placeholders_by_index() {
        let value = json!([
            "message",
            {"_placeholder": true, "num": 1},
            {"nested": [{"_placeholder": true, "num": 0}]}
        ]);
        let attachments = [Bytes::from_static(&[1]), Bytes::from_static(&[2])];
        let data = Data::resolve(value, &attachments).unwrap();

        let Data::Array(items) = data else { panic!("expected array") };
        assert_eq!(items[1], Data::Binary(Bytes::from_static(&[2])));
        let Data::Object(map) = &items[2] else { panic!("expected object") };
        assert_eq!(
            map["nested"],
            Data::Array(vec![Data::Binary(Bytes::from_static(&[1]))])
        );
    }

    #[test]
    fn out_of_range_placeholder_is_an_error() {
        let value = json!([{"_placeholder": true, "num": 2}]);
        assert!(Data::resolve(value, &[Bytes::new()]).is_err());
    }

    #[test]
    fn objects_that_only_look_like_placeholders_are_kept() {
        let value = json!({"_placeholder": false, "num": 0});
        let data = Data::resolve(value.clone(), &[]).unwrap();
        assert_eq!(data, Data::from(value));
    }

    #[test]
    fn deconstruct_numbers_binaries_in_emission_order() {
        let data = Data::Array(vec![
            Data::from("x"),
            Data::Binary(Bytes::from_static(&[9])),
            Data::Array(vec![Data::Binary(Bytes::from_static(&[8]))]),
        ]);
        let (value, buffers) = deconstruct(data);
        assert_eq!(
            value,
            json!(["x", {"_placeholder": true, "num": 0}, [{"_placeholder": true, "num": 1}]])
        );
        assert_eq!(buffers, vec![Bytes::from_static(&[9]), Bytes::from_static(&[8])]);
    }

    #[test]
    fn key_order_survives_conversion() {
        let value = json!({"b": 1, "a": 2});
        let (back, _) = deconstruct(Data::from(value.clone()));
        assert_eq!(back.to_string(), r#"{"b":1,"a":2}"#);
    }
}
