//! Write payloads for the document store.
//!
//! Documents are assembled as [`Payload`] trees in which an optional field that has no value
//! is marked [`Payload::Absent`]. [`Payload::sanitize`] is the single place those markers are
//! removed before anything is written:
//!
//! * object keys whose value is `Absent` are dropped, at any depth;
//! * `Null` is kept, it is an explicit value;
//! * arrays keep their length, an `Absent` element is written as `Null`.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Absent,
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Payload>),
    Object(BTreeMap<String, Payload>),
}

impl Payload {
    pub fn object() -> PayloadObject {
        PayloadObject::default()
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Converts to JSON, dropping absent object fields recursively.
    pub fn sanitize(self) -> Value {
        match self {
            Self::Absent | Self::Null => Value::Null,
            Self::Bool(value) => Value::Bool(value),
            Self::Number(value) => Value::Number(value),
            Self::String(value) => Value::String(value),
            Self::Array(items) => Value::Array(items.into_iter().map(Self::sanitize).collect()),
            Self::Object(fields) => {
                let mut map = Map::new();
                for (key, value) in fields {
                    if !value.is_absent() {
                        map.insert(key, value.sanitize());
                    }
                }
                Value::Object(map)
            }
        }
    }
}

/// Builder for object payloads.
#[derive(Debug, Clone, Default)]
pub struct PayloadObject {
    fields: BTreeMap<String, Payload>,
}

impl PayloadObject {
    pub fn field(mut self, key: &str, value: impl Into<Payload>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> Payload {
        Payload::Object(self.fields)
    }
}

impl From<PayloadObject> for Payload {
    fn from(value: PayloadObject) -> Self {
        value.build()
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map_or(Payload::Absent, Into::into)
    }
}

impl<T: Into<Payload>> From<Vec<T>> for Payload {
    fn from(value: Vec<T>) -> Self {
        Payload::Array(value.into_iter().map(Into::into).collect())
    }
}

impl From<bool> for Payload {
    fn from(value: bool) -> Self {
        Payload::Bool(value)
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::String(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::String(value.to_string())
    }
}

impl From<i64> for Payload {
    fn from(value: i64) -> Self {
        Payload::Number(value.into())
    }
}

impl From<u16> for Payload {
    fn from(value: u16) -> Self {
        Payload::Number(value.into())
    }
}

impl From<u32> for Payload {
    fn from(value: u32) -> Self {
        Payload::Number(value.into())
    }
}

impl From<f64> for Payload {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Payload::Null, Payload::Number)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Payload::Null,
            Value::Bool(value) => Payload::Bool(value),
            Value::Number(value) => Payload::Number(value),
            Value::String(value) => Payload::String(value),
            Value::Array(items) => Payload::Array(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                Payload::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// Records that can be written to the document store.
pub trait ToDocument {
    fn to_document(&self) -> Payload;
}
