//! Dynamically typed column values.
//!
//! Rows coming out of the storage backend are untyped; entity fields are typed.
//! [`Value`] sits in between, and [`FieldValue`] is the strict bridge from a
//! `Value` back into a concrete Rust field type.

use chrono::{DateTime, NaiveTime, Utc};
use std::fmt;

/// A single raw or converted column value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// SQL `NULL`, or "no value"
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Signed 64-bit integer
    Int(i64),
    /// Unsigned 64-bit integer
    UInt(u64),
    /// Double precision float
    Float(f64),
    /// UTF-8 text
    Text(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Absolute point in time
    Timestamp(DateTime<Utc>),
}

/// Runtime kind of a [`Value`], used for strict type checks and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// See [`Value::Null`]
    Null,
    /// See [`Value::Bool`]
    Bool,
    /// See [`Value::Int`]
    Int,
    /// See [`Value::UInt`]
    UInt,
    /// See [`Value::Float`]
    Float,
    /// See [`Value::Text`]
    Text,
    /// See [`Value::Bytes`]
    Bytes,
    /// See [`Value::Timestamp`]
    Timestamp,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "i64",
            Self::UInt => "u64",
            Self::Float => "f64",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

impl Value {
    /// Runtime kind of this value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::UInt(_) => ValueKind::UInt,
            Self::Float(_) => ValueKind::Float,
            Self::Text(_) => ValueKind::Text,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Timestamp(_) => ValueKind::Timestamp,
        }
    }

    /// True for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<sea_orm::Value> for Value {
    fn from(value: sea_orm::Value) -> Self {
        use sea_orm::Value as Db;

        match value {
            Db::Bool(b) => b.map_or(Self::Null, Self::Bool),
            Db::TinyInt(i) => i.map_or(Self::Null, |i| Self::Int(i.into())),
            Db::SmallInt(i) => i.map_or(Self::Null, |i| Self::Int(i.into())),
            Db::Int(i) => i.map_or(Self::Null, |i| Self::Int(i.into())),
            Db::BigInt(i) => i.map_or(Self::Null, Self::Int),
            Db::TinyUnsigned(u) => u.map_or(Self::Null, |u| Self::Int(u.into())),
            Db::SmallUnsigned(u) => u.map_or(Self::Null, |u| Self::Int(u.into())),
            Db::Unsigned(u) => u.map_or(Self::Null, |u| Self::Int(u.into())),
            Db::BigUnsigned(u) => u.map_or(Self::Null, Self::UInt),
            Db::Float(f) => f.map_or(Self::Null, |f| Self::Float(f.into())),
            Db::Double(f) => f.map_or(Self::Null, Self::Float),
            Db::String(s) => s.map_or(Self::Null, |s| Self::Text(*s)),
            Db::Char(c) => c.map_or(Self::Null, |c| Self::Text(c.to_string())),
            Db::Bytes(b) => b.map_or(Self::Null, |b| Self::Bytes(*b)),
            Db::ChronoDateTimeUtc(t) => t.map_or(Self::Null, |t| Self::Timestamp(*t)),
            Db::ChronoDateTime(t) => t.map_or(Self::Null, |t| Self::Timestamp(t.and_utc())),
            Db::ChronoDateTimeLocal(t) => {
                t.map_or(Self::Null, |t| Self::Timestamp(t.with_timezone(&Utc)))
            }
            Db::ChronoDateTimeWithTimeZone(t) => {
                t.map_or(Self::Null, |t| Self::Timestamp(t.with_timezone(&Utc)))
            }
            Db::ChronoDate(d) => d.map_or(Self::Null, |d| {
                Self::Timestamp(d.and_time(NaiveTime::MIN).and_utc())
            }),
            Db::Json(j) => j.map_or(Self::Null, |j| Self::Text(j.to_string())),
            // Times, decimals and uuids are kept in their textual form
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<Value> for sea_orm::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::from(None::<String>),
            Value::Bool(b) => b.into(),
            Value::Int(i) => i.into(),
            Value::UInt(u) => u.into(),
            Value::Float(f) => f.into(),
            Value::Text(s) => s.into(),
            Value::Bytes(b) => b.into(),
            Value::Timestamp(t) => t.into(),
        }
    }
}

/// A Rust type that can live in a mapped entity field.
///
/// `from_value` is strict: it only accepts a [`Value`] of exactly the declared
/// kind and hands the value back otherwise, so the caller decides what a
/// mismatch means.
pub trait FieldValue: Sized + Send + Sync + 'static {
    /// Kind a raw value must have to be assigned without a converter.
    const KIND: ValueKind;

    /// Converts the field value into a [`Value`].
    fn into_value(self) -> Value;

    /// Strictly converts a [`Value`] into the field type.
    ///
    /// # Errors
    /// Returns the original value when its kind does not match.
    fn from_value(value: Value) -> Result<Self, Value>;
}

macro_rules! field_value {
    ($ty:ty, $variant:ident) => {
        impl FieldValue for $ty {
            const KIND: ValueKind = ValueKind::$variant;

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: Value) -> Result<Self, Value> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(other),
                }
            }
        }
    };
}

field_value!(bool, Bool);
field_value!(i64, Int);
field_value!(u64, UInt);
field_value!(f64, Float);
field_value!(String, Text);
field_value!(Vec<u8>, Bytes);
field_value!(DateTime<Utc>, Timestamp);

impl<V: FieldValue> FieldValue for Option<V> {
    const KIND: ValueKind = V::KIND;

    fn into_value(self) -> Value {
        self.map_or(Value::Null, FieldValue::into_value)
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Null => Ok(None),
            other => V::from_value(other).map(Some),
        }
    }
}
