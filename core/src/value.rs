//! # Values
//!
//! The structured value model shared by every validation stage.
//!
//! Deserializers (media types, parameter styles) only produce the
//! wire-shaped variants: `Null`, `Bool`, `Integer`, `Number`, `String`,
//! `Bytes`, `Array` and `Object`. The schema unmarshaller additionally
//! produces the typed variants (`Date`, `DateTime`, `Uuid`) when a schema
//! `format` asks for them.

use base64::prelude::{Engine, BASE64_STANDARD};
use chrono::{DateTime, FixedOffset, NaiveDate};
use derive_more::Display;
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use uuid::Uuid;

/// A structured, possibly typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// JSON `null`.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number without a fractional part that fits in `i64`.
    Integer(i64),
    /// Any other number.
    Number(f64),
    /// A text value.
    String(String),
    /// Opaque bytes (`binary`/`byte` formats, file parts, binary bodies).
    Bytes(Vec<u8>),
    /// A calendar date (`date` format).
    Date(NaiveDate),
    /// An RFC 3339 timestamp (`date-time` format).
    DateTime(DateTime<FixedOffset>),
    /// A UUID (`uuid` format).
    Uuid(Uuid),
    /// A sequence.
    Array(Vec<Value>),
    /// A mapping with preserved key order.
    Object(IndexMap<String, Value>),
}

/// The runtime kind of a `Value`, used in type mismatch diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// `Value::Null`
    #[display("null")]
    Null,
    /// `Value::Bool`
    #[display("boolean")]
    Boolean,
    /// `Value::Integer`
    #[display("integer")]
    Integer,
    /// `Value::Number`
    #[display("number")]
    Number,
    /// `Value::String`
    #[display("string")]
    String,
    /// `Value::Bytes`
    #[display("bytes")]
    Bytes,
    /// `Value::Date`
    #[display("date")]
    Date,
    /// `Value::DateTime`
    #[display("date-time")]
    DateTime,
    /// `Value::Uuid`
    #[display("uuid")]
    Uuid,
    /// `Value::Array`
    #[display("array")]
    Array,
    /// `Value::Object`
    #[display("object")]
    Object,
}

impl Value {
    /// Returns the runtime kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Integer(_) => ValueKind::Integer,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Date(_) => ValueKind::Date,
            Value::DateTime(_) => ValueKind::DateTime,
            Value::Uuid(_) => ValueKind::Uuid,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
        }
    }

    /// Whether this is `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value is a string on the wire, typed or not.
    pub fn is_string_like(&self) -> bool {
        matches!(
            self,
            Value::String(_) | Value::Bytes(_) | Value::Date(_) | Value::DateTime(_) | Value::Uuid(_)
        )
    }

    /// The text of a string-like value as written on the wire.
    ///
    /// Typed variants render through `to_json`, so string keywords see the
    /// same text whether or not a format already typed the value.
    pub fn wire_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            typed if typed.is_string_like() => match typed.to_json() {
                JsonValue::String(s) => Some(Cow::Owned(s)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Returns the text of a `Value::String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric value of an `Integer` or `Number`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the entries of a `Value::Object`.
    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the elements of a `Value::Array`.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Looks up a property of an object value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Converts this value to its JSON wire representation.
    ///
    /// Typed variants are rendered the way they are written on the wire:
    /// dates as `YYYY-MM-DD`, timestamps as RFC 3339, bytes as base64.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Integer(i) => JsonValue::from(*i),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Bytes(b) => JsonValue::String(BASE64_STANDARD.encode(b)),
            Value::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            Value::Uuid(u) => JsonValue::String(u.hyphenated().to_string()),
            Value::Array(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Compares this value with a literal from the document (`enum`, `default`).
    ///
    /// Numbers compare numerically so `5` and `5.0` are the same literal.
    pub fn matches_literal(&self, literal: &JsonValue) -> bool {
        json_eq(&self.to_json(), literal)
    }
}

fn json_eq(left: &JsonValue, right: &JsonValue) -> bool {
    match (left, right) {
        (JsonValue::Number(a), JsonValue::Number(b)) => a.as_f64() == b.as_f64(),
        (JsonValue::Array(a), JsonValue::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| json_eq(x, y))
        }
        (JsonValue::Object(a), JsonValue::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| json_eq(v, other)))
        }
        _ => left == right,
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            JsonValue::Object(map) => Value::Object(
                map.into_iter()
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

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
            scalar => scalar.to_json().serialize(serializer),
        }
    }
}
