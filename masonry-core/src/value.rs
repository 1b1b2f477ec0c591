use crate::{AsValue, Result, TIME_FORMAT, TIMESTAMP_FORMAT};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use std::fmt::{self, Display};
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, Time, format_description::well_known::Rfc3339,
    macros::format_description,
};
use uuid::Uuid;

/// Dynamically typed value, every variant but `Null` carries its type even when empty.
#[derive(Default, Debug, Clone)]
pub enum Value {
    #[default]
    Null,
    Boolean(Option<bool>),
    Int8(Option<i8>),
    Int16(Option<i16>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    UInt8(Option<u8>),
    UInt16(Option<u16>),
    UInt32(Option<u32>),
    UInt64(Option<u64>),
    Float32(Option<f32>),
    Float64(Option<f64>),
    Decimal(Option<Decimal>),
    Varchar(Option<String>),
    Blob(Option<Box<[u8]>>),
    Date(Option<Date>),
    Time(Option<Time>),
    Timestamp(Option<PrimitiveDateTime>),
    TimestampWithTimezone(Option<OffsetDateTime>),
    Uuid(Option<Uuid>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(l), Self::Boolean(r)) => l == r,
            (Self::Int8(l), Self::Int8(r)) => l == r,
            (Self::Int16(l), Self::Int16(r)) => l == r,
            (Self::Int32(l), Self::Int32(r)) => l == r,
            (Self::Int64(l), Self::Int64(r)) => l == r,
            (Self::UInt8(l), Self::UInt8(r)) => l == r,
            (Self::UInt16(l), Self::UInt16(r)) => l == r,
            (Self::UInt32(l), Self::UInt32(r)) => l == r,
            (Self::UInt64(l), Self::UInt64(r)) => l == r,
            (Self::Float32(l), Self::Float32(r)) => l == r,
            (Self::Float64(l), Self::Float64(r)) => l == r,
            (Self::Decimal(l), Self::Decimal(r)) => l == r,
            (Self::Varchar(l), Self::Varchar(r)) => l == r,
            (Self::Blob(l), Self::Blob(r)) => l == r,
            (Self::Date(l), Self::Date(r)) => l == r,
            (Self::Time(l), Self::Time(r)) => l == r,
            (Self::Timestamp(l), Self::Timestamp(r)) => l == r,
            (Self::TimestampWithTimezone(l), Self::TimestampWithTimezone(r)) => l == r,
            (Self::Uuid(l), Self::Uuid(r)) => l == r,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

/// Hashable identity of a non null value, integers of every width share one representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Boolean(bool),
    Integer(i128),
    Float(u64),
    Decimal(Decimal),
    Text(String),
    Bytes(Box<[u8]>),
    Date(Date),
    Time(Time),
    Timestamp(PrimitiveDateTime),
    TimestampWithTimezone(OffsetDateTime),
    Uuid(Uuid),
}

/// Families of values that can be compared as keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyClass {
    Boolean,
    Integer,
    Float,
    Decimal,
    Text,
    Bytes,
    Date,
    Time,
    Timestamp,
    TimestampWithTimezone,
    Uuid,
}

impl Value {
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Boolean(v) => v.is_none(),
            Value::Int8(v) => v.is_none(),
            Value::Int16(v) => v.is_none(),
            Value::Int32(v) => v.is_none(),
            Value::Int64(v) => v.is_none(),
            Value::UInt8(v) => v.is_none(),
            Value::UInt16(v) => v.is_none(),
            Value::UInt32(v) => v.is_none(),
            Value::UInt64(v) => v.is_none(),
            Value::Float32(v) => v.is_none(),
            Value::Float64(v) => v.is_none(),
            Value::Decimal(v) => v.is_none(),
            Value::Varchar(v) => v.is_none(),
            Value::Blob(v) => v.is_none(),
            Value::Date(v) => v.is_none(),
            Value::Time(v) => v.is_none(),
            Value::Timestamp(v) => v.is_none(),
            Value::TimestampWithTimezone(v) => v.is_none(),
            Value::Uuid(v) => v.is_none(),
        }
    }

    /// Null or the default of its type (`0`, `false`, `""`, empty blob, nil uuid).
    pub fn is_zero(&self) -> bool {
        match self {
            v if v.is_null() => true,
            Value::Boolean(Some(v)) => !v,
            Value::Int8(Some(v)) => *v == 0,
            Value::Int16(Some(v)) => *v == 0,
            Value::Int32(Some(v)) => *v == 0,
            Value::Int64(Some(v)) => *v == 0,
            Value::UInt8(Some(v)) => *v == 0,
            Value::UInt16(Some(v)) => *v == 0,
            Value::UInt32(Some(v)) => *v == 0,
            Value::UInt64(Some(v)) => *v == 0,
            Value::Float32(Some(v)) => *v == 0.0,
            Value::Float64(Some(v)) => *v == 0.0,
            Value::Decimal(Some(v)) => v.is_zero(),
            Value::Varchar(Some(v)) => v.is_empty(),
            Value::Blob(Some(v)) => v.is_empty(),
            Value::Uuid(Some(v)) => v.is_nil(),
            _ => false,
        }
    }

    pub fn same_type(&self, other: &Self) -> bool {
        core::mem::discriminant(self) == core::mem::discriminant(other)
    }

    /// The empty value of the same type.
    pub fn as_null(&self) -> Value {
        match self {
            Value::Null => Value::Null,
            Value::Boolean(..) => Value::Boolean(None),
            Value::Int8(..) => Value::Int8(None),
            Value::Int16(..) => Value::Int16(None),
            Value::Int32(..) => Value::Int32(None),
            Value::Int64(..) => Value::Int64(None),
            Value::UInt8(..) => Value::UInt8(None),
            Value::UInt16(..) => Value::UInt16(None),
            Value::UInt32(..) => Value::UInt32(None),
            Value::UInt64(..) => Value::UInt64(None),
            Value::Float32(..) => Value::Float32(None),
            Value::Float64(..) => Value::Float64(None),
            Value::Decimal(..) => Value::Decimal(None),
            Value::Varchar(..) => Value::Varchar(None),
            Value::Blob(..) => Value::Blob(None),
            Value::Date(..) => Value::Date(None),
            Value::Time(..) => Value::Time(None),
            Value::Timestamp(..) => Value::Timestamp(None),
            Value::TimestampWithTimezone(..) => Value::TimestampWithTimezone(None),
            Value::Uuid(..) => Value::Uuid(None),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Boolean(..) => "BOOLEAN",
            Value::Int8(..) => "INT8",
            Value::Int16(..) => "INT16",
            Value::Int32(..) => "INT32",
            Value::Int64(..) => "INT64",
            Value::UInt8(..) => "UINT8",
            Value::UInt16(..) => "UINT16",
            Value::UInt32(..) => "UINT32",
            Value::UInt64(..) => "UINT64",
            Value::Float32(..) => "FLOAT32",
            Value::Float64(..) => "FLOAT64",
            Value::Decimal(..) => "DECIMAL",
            Value::Varchar(..) => "VARCHAR",
            Value::Blob(..) => "BLOB",
            Value::Date(..) => "DATE",
            Value::Time(..) => "TIME",
            Value::Timestamp(..) => "TIMESTAMP",
            Value::TimestampWithTimezone(..) => "TIMESTAMPTZ",
            Value::Uuid(..) => "UUID",
        }
    }

    pub(crate) fn as_i128(&self) -> Option<i128> {
        Some(match self {
            Value::Boolean(Some(v)) => *v as i128,
            Value::Int8(Some(v)) => *v as i128,
            Value::Int16(Some(v)) => *v as i128,
            Value::Int32(Some(v)) => *v as i128,
            Value::Int64(Some(v)) => *v as i128,
            Value::UInt8(Some(v)) => *v as i128,
            Value::UInt16(Some(v)) => *v as i128,
            Value::UInt32(Some(v)) => *v as i128,
            Value::UInt64(Some(v)) => *v as i128,
            Value::Float32(Some(v)) if v.fract() == 0.0 => *v as i128,
            Value::Float64(Some(v)) if v.fract() == 0.0 => *v as i128,
            Value::Decimal(Some(v)) if v.is_integer() => v.to_i128()?,
            _ => return None,
        })
    }

    pub fn key_class(&self) -> Option<KeyClass> {
        Some(match self {
            Value::Null => return None,
            Value::Boolean(..) => KeyClass::Boolean,
            Value::Int8(..)
            | Value::Int16(..)
            | Value::Int32(..)
            | Value::Int64(..)
            | Value::UInt8(..)
            | Value::UInt16(..)
            | Value::UInt32(..)
            | Value::UInt64(..) => KeyClass::Integer,
            Value::Float32(..) | Value::Float64(..) => KeyClass::Float,
            Value::Decimal(..) => KeyClass::Decimal,
            Value::Varchar(..) => KeyClass::Text,
            Value::Blob(..) => KeyClass::Bytes,
            Value::Date(..) => KeyClass::Date,
            Value::Time(..) => KeyClass::Time,
            Value::Timestamp(..) => KeyClass::Timestamp,
            Value::TimestampWithTimezone(..) => KeyClass::TimestampWithTimezone,
            Value::Uuid(..) => KeyClass::Uuid,
        })
    }

    /// Key used to match rows of different queries, `None` for nulls.
    pub fn key(&self) -> Option<Key> {
        if self.is_null() {
            return None;
        }
        Some(match self {
            Value::Boolean(Some(v)) => Key::Boolean(*v),
            Value::Float32(Some(v)) => Key::Float((*v as f64).to_bits()),
            Value::Float64(Some(v)) => Key::Float(v.to_bits()),
            Value::Decimal(Some(v)) => Key::Decimal(v.normalize()),
            Value::Varchar(Some(v)) => Key::Text(v.clone()),
            Value::Blob(Some(v)) => Key::Bytes(v.clone()),
            Value::Date(Some(v)) => Key::Date(*v),
            Value::Time(Some(v)) => Key::Time(*v),
            Value::Timestamp(Some(v)) => Key::Timestamp(*v),
            Value::TimestampWithTimezone(Some(v)) => Key::TimestampWithTimezone(*v),
            Value::Uuid(Some(v)) => Key::Uuid(*v),
            v => Key::Integer(v.as_i128()?),
        })
    }

    /// Converts to the type of `prototype`, nulls become the typed null of the prototype.
    pub fn convert_to(&self, prototype: &Value) -> Result<Value> {
        if self.is_null() {
            return Ok(prototype.as_null());
        }
        if self.same_type(prototype) || matches!(prototype, Value::Null) {
            return Ok(self.clone());
        }
        let value = self.clone();
        Ok(match prototype {
            Value::Null => value,
            Value::Boolean(..) => bool::try_from_value(value)?.as_value(),
            Value::Int8(..) => i8::try_from_value(value)?.as_value(),
            Value::Int16(..) => i16::try_from_value(value)?.as_value(),
            Value::Int32(..) => i32::try_from_value(value)?.as_value(),
            Value::Int64(..) => i64::try_from_value(value)?.as_value(),
            Value::UInt8(..) => u8::try_from_value(value)?.as_value(),
            Value::UInt16(..) => u16::try_from_value(value)?.as_value(),
            Value::UInt32(..) => u32::try_from_value(value)?.as_value(),
            Value::UInt64(..) => u64::try_from_value(value)?.as_value(),
            Value::Float32(..) => f32::try_from_value(value)?.as_value(),
            Value::Float64(..) => f64::try_from_value(value)?.as_value(),
            Value::Decimal(..) => Decimal::try_from_value(value)?.as_value(),
            Value::Varchar(..) => String::try_from_value(value)?.as_value(),
            Value::Blob(..) => Box::<[u8]>::try_from_value(value)?.as_value(),
            Value::Date(..) => Date::try_from_value(value)?.as_value(),
            Value::Time(..) => Time::try_from_value(value)?.as_value(),
            Value::Timestamp(..) => PrimitiveDateTime::try_from_value(value)?.as_value(),
            Value::TimestampWithTimezone(..) => OffsetDateTime::try_from_value(value)?.as_value(),
            Value::Uuid(..) => Uuid::try_from_value(value)?.as_value(),
        })
    }

    /// Textual form used by drivers that store temporal, decimal and uuid values as text.
    pub fn to_text(&self) -> Result<Option<String>> {
        Ok(Some(match self {
            Value::Decimal(Some(v)) => v.to_string(),
            Value::Varchar(Some(v)) => v.clone(),
            Value::Date(Some(v)) => v.format(format_description!("[year]-[month]-[day]"))?,
            Value::Time(Some(v)) => v.format(TIME_FORMAT)?,
            Value::Timestamp(Some(v)) => v.format(TIMESTAMP_FORMAT)?,
            Value::TimestampWithTimezone(Some(v)) => v.format(&Rfc3339)?,
            Value::Uuid(Some(v)) => v.hyphenated().to_string(),
            _ => return Ok(None),
        }))
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            v if v.is_null() => f.write_str("NULL"),
            Value::Boolean(Some(v)) => write!(f, "{v}"),
            Value::Int8(Some(v)) => write!(f, "{v}"),
            Value::Int16(Some(v)) => write!(f, "{v}"),
            Value::Int32(Some(v)) => write!(f, "{v}"),
            Value::Int64(Some(v)) => write!(f, "{v}"),
            Value::UInt8(Some(v)) => write!(f, "{v}"),
            Value::UInt16(Some(v)) => write!(f, "{v}"),
            Value::UInt32(Some(v)) => write!(f, "{v}"),
            Value::UInt64(Some(v)) => write!(f, "{v}"),
            Value::Float32(Some(v)) => write!(f, "{v}"),
            Value::Float64(Some(v)) => write!(f, "{v}"),
            Value::Decimal(Some(v)) => write!(f, "{v}"),
            Value::Varchar(Some(v)) => write!(f, "'{}'", v.replace('\'', "''")),
            Value::Blob(Some(v)) => {
                f.write_str("X'")?;
                for b in v.iter() {
                    write!(f, "{b:02X}")?;
                }
                f.write_str("'")
            }
            Value::Date(Some(v)) => write!(f, "'{v}'"),
            Value::Time(Some(v)) => write!(f, "'{v}'"),
            Value::Timestamp(Some(v)) => write!(f, "'{v}'"),
            Value::TimestampWithTimezone(Some(v)) => write!(f, "'{v}'"),
            Value::Uuid(Some(v)) => write!(f, "'{v}'"),
            _ => f.write_str("NULL"),
        }
    }
}
