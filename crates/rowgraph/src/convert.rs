//! Scalar conversions between Rust field types and [`Value`].
//!
//! Implement [`FromValue`] and [`ToValue`] for your own field types (enums stored as text,
//! newtype ids, ...) to make them usable as entity scalars and query parameters.

use crate::error::{OrmError, OrmResult};
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

/// Convert a result cell into a field value.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> OrmResult<Self>;
}

/// Convert a field value into a statement parameter.
pub trait ToValue {
    fn to_value(&self) -> Value;
}

fn mismatch(expected: &'static str, found: &Value) -> OrmError {
    OrmError::Conversion {
        expected,
        found: found.type_name(),
    }
}

macro_rules! impl_int {
    ($($t:ty),* $(,)?) => {
        $(
            impl FromValue for $t {
                fn from_value(value: Value) -> OrmResult<Self> {
                    match value {
                        Value::Int(v) => <$t>::try_from(v).map_err(|_| mismatch(stringify!($t), &Value::Int(v))),
                        Value::Text(ref s) => s.trim().parse().map_err(|_| mismatch(stringify!($t), &value)),
                        other => Err(mismatch(stringify!($t), &other)),
                    }
                }
            }

            impl ToValue for $t {
                fn to_value(&self) -> Value {
                    Value::Int(i64::from(*self))
                }
            }
        )*
    };
}

impl_int!(i8, i16, i32, i64, u8, u16, u32);

impl FromValue for f64 {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Float(v) => Ok(v),
            Value::Int(v) => Ok(v as f64),
            Value::Text(ref s) => s.trim().parse().map_err(|_| mismatch("f64", &value)),
            other => Err(mismatch("f64", &other)),
        }
    }
}

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Float(v) => Ok(v as f32),
            Value::Int(v) => Ok(v as f32),
            Value::Text(ref s) => s.trim().parse().map_err(|_| mismatch("f32", &value)),
            other => Err(mismatch("f32", &other)),
        }
    }
}

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Bool(v) => Ok(v),
            Value::Int(0) => Ok(false),
            Value::Int(1) => Ok(true),
            Value::Text(ref s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Ok(true),
                "false" | "f" | "no" | "0" => Ok(false),
                _ => Err(mismatch("bool", &value)),
            },
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Text(v) => Ok(v),
            Value::Int(v) => Ok(v.to_string()),
            Value::Float(v) => Ok(v.to_string()),
            Value::Bool(v) => Ok(v.to_string()),
            Value::Uuid(v) => Ok(v.to_string()),
            Value::Json(v) => Ok(v.to_string()),
            other => Err(mismatch("String", &other)),
        }
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::Text(self.to_owned())
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Bytes(v) => Ok(v),
            other => Err(mismatch("Vec<u8>", &other)),
        }
    }
}

impl ToValue for Vec<u8> {
    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Date(v) => Ok(v),
            Value::Timestamp(v) => Ok(v.date()),
            Value::TimestampTz(v) => Ok(v.date_naive()),
            Value::Text(ref s) => {
                NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| mismatch("NaiveDate", &value))
            }
            other => Err(mismatch("NaiveDate", &other)),
        }
    }
}

impl ToValue for NaiveDate {
    fn to_value(&self) -> Value {
        Value::Date(*self)
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Time(v) => Ok(v),
            Value::Timestamp(v) => Ok(v.time()),
            Value::Text(ref s) => s
                .trim()
                .parse::<NaiveTime>()
                .map_err(|_| mismatch("NaiveTime", &value)),
            other => Err(mismatch("NaiveTime", &other)),
        }
    }
}

impl ToValue for NaiveTime {
    fn to_value(&self) -> Value {
        Value::Time(*self)
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Timestamp(v) => Ok(v),
            Value::TimestampTz(v) => Ok(v.naive_utc()),
            Value::Date(v) => Ok(v.and_time(NaiveTime::MIN)),
            Value::Text(ref s) => s
                .trim()
                .parse::<NaiveDateTime>()
                .map_err(|_| mismatch("NaiveDateTime", &value)),
            other => Err(mismatch("NaiveDateTime", &other)),
        }
    }
}

impl ToValue for NaiveDateTime {
    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::TimestampTz(v) => Ok(v),
            Value::Timestamp(v) => Ok(v.and_utc()),
            Value::Text(ref s) => DateTime::parse_from_rfc3339(s.trim())
                .map(|v| v.with_timezone(&Utc))
                .map_err(|_| mismatch("DateTime<Utc>", &value)),
            other => Err(mismatch("DateTime<Utc>", &other)),
        }
    }
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::TimestampTz(*self)
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Uuid(v) => Ok(v),
            Value::Text(ref s) => Uuid::parse_str(s.trim()).map_err(|_| mismatch("Uuid", &value)),
            other => Err(mismatch("Uuid", &other)),
        }
    }
}

impl ToValue for Uuid {
    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Json(v) => Ok(v),
            Value::Text(ref s) => serde_json::from_str(s).map_err(|_| mismatch("json", &value)),
            other => Err(mismatch("json", &other)),
        }
    }
}

impl ToValue for serde_json::Value {
    fn to_value(&self) -> Value {
        Value::Json(self.clone())
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> OrmResult<Self> {
        Ok(value)
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}
