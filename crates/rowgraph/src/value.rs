//! Dynamically typed cell values exchanged with the driver.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// A single parameter or result cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in conversion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Timestamp(_) => "timestamp",
            Value::TimestampTz(_) => "timestamptz",
            Value::Uuid(_) => "uuid",
            Value::Json(_) => "json",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// A `Value` usable as a hash key.
///
/// Floats hash and compare by bit pattern; JSON by its serialized text.
#[derive(Debug, Clone)]
pub struct KeyValue(pub Value);

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Json(a), Value::Json(b)) => a.to_string() == b.to_string(),
            (a, b) => a == b,
        }
    }
}

impl Eq for KeyValue {}

impl Hash for KeyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Value::Null => 0u8.hash(state),
            Value::Bool(v) => {
                1u8.hash(state);
                v.hash(state);
            }
            Value::Int(v) => {
                2u8.hash(state);
                v.hash(state);
            }
            Value::Float(v) => {
                3u8.hash(state);
                v.to_bits().hash(state);
            }
            Value::Text(v) => {
                4u8.hash(state);
                v.hash(state);
            }
            Value::Bytes(v) => {
                5u8.hash(state);
                v.hash(state);
            }
            Value::Date(v) => {
                6u8.hash(state);
                v.hash(state);
            }
            Value::Time(v) => {
                7u8.hash(state);
                v.hash(state);
            }
            Value::Timestamp(v) => {
                8u8.hash(state);
                v.hash(state);
            }
            Value::TimestampTz(v) => {
                9u8.hash(state);
                v.hash(state);
            }
            Value::Uuid(v) => {
                10u8.hash(state);
                v.hash(state);
            }
            Value::Json(v) => {
                11u8.hash(state);
                v.to_string().hash(state);
            }
        }
    }
}
