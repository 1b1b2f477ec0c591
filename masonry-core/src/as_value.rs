use crate::{ConversionError, Error, Result, Value};
use rust_decimal::{
    Decimal,
    prelude::{FromPrimitive, ToPrimitive},
};
use std::{any, str::FromStr};
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset,
    format_description::{BorrowedFormatItem, well_known::Rfc3339},
    macros::format_description,
};
use uuid::Uuid;

pub const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
pub const TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[hour]:[minute]:[second].[subsecond]");
pub const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]");

const TIME_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    TIME_FORMAT,
    format_description!("[hour]:[minute]:[second]"),
    format_description!("[hour]:[minute]"),
];
const TIMESTAMP_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    TIMESTAMP_FORMAT,
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
];

/// Conversion between native Rust types and the dynamically typed [`Value`].
///
/// `as_empty_value` is the typed null used as the declared type of a field, `try_from_value`
/// accepts the canonical variant plus the lossless conversions drivers produce (integers of
/// other widths, temporal and uuid values stored as text).
pub trait AsValue {
    /// True for `Option<T>`, the column accepts NULL.
    const NULLABLE: bool = false;
    fn as_empty_value() -> Value;
    fn as_value(self) -> Value;
    fn try_from_value(value: Value) -> Result<Self>
    where
        Self: Sized;
}

pub(crate) fn conversion_error<T>(value: &Value) -> Error {
    Error::new(ConversionError {
        value: format!("{value:?}"),
        target: any::type_name::<T>(),
    })
}

impl<T: AsValue> From<T> for Value {
    fn from(value: T) -> Self {
        value.as_value()
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Varchar(Some(value.into()))
    }
}

macro_rules! impl_as_value_integer {
    ($source:ty, $destination:path) => {
        impl AsValue for $source {
            fn as_empty_value() -> Value {
                $destination(None)
            }
            fn as_value(self) -> Value {
                $destination(Some(self))
            }
            fn try_from_value(value: Value) -> Result<Self> {
                let wide = match &value {
                    $destination(Some(v)) => return Ok(*v),
                    Value::Varchar(Some(v)) => v.trim().parse::<i128>().ok(),
                    Value::TimestampWithTimezone(Some(v)) => Some(v.unix_timestamp() as i128),
                    Value::Timestamp(Some(v)) => Some(v.assume_utc().unix_timestamp() as i128),
                    v => v.as_i128(),
                };
                wide.and_then(|v| <$source>::try_from(v).ok())
                    .ok_or_else(|| conversion_error::<Self>(&value))
            }
        }
    };
}
impl_as_value_integer!(i8, Value::Int8);
impl_as_value_integer!(i16, Value::Int16);
impl_as_value_integer!(i32, Value::Int32);
impl_as_value_integer!(i64, Value::Int64);
impl_as_value_integer!(u8, Value::UInt8);
impl_as_value_integer!(u16, Value::UInt16);
impl_as_value_integer!(u32, Value::UInt32);
impl_as_value_integer!(u64, Value::UInt64);

macro_rules! impl_as_value_float {
    ($source:ty, $destination:path) => {
        impl AsValue for $source {
            fn as_empty_value() -> Value {
                $destination(None)
            }
            fn as_value(self) -> Value {
                $destination(Some(self))
            }
            fn try_from_value(value: Value) -> Result<Self> {
                let result = match &value {
                    $destination(Some(v)) => return Ok(*v),
                    #[allow(unreachable_patterns)]
                    Value::Float32(Some(v)) => Some(*v as $source),
                    #[allow(unreachable_patterns)]
                    Value::Float64(Some(v)) => Some(*v as $source),
                    Value::Decimal(Some(v)) => v.to_f64().map(|v| v as $source),
                    Value::Varchar(Some(v)) => v.trim().parse::<$source>().ok(),
                    v => v.as_i128().map(|v| v as $source),
                };
                result.ok_or_else(|| conversion_error::<Self>(&value))
            }
        }
    };
}
impl_as_value_float!(f32, Value::Float32);
impl_as_value_float!(f64, Value::Float64);

impl AsValue for bool {
    fn as_empty_value() -> Value {
        Value::Boolean(None)
    }
    fn as_value(self) -> Value {
        Value::Boolean(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match &value {
            Value::Boolean(Some(v)) => Ok(*v),
            Value::Varchar(Some(v)) => match v.as_str() {
                x if x.eq_ignore_ascii_case("true") || x == "1" => Ok(true),
                x if x.eq_ignore_ascii_case("false") || x == "0" => Ok(false),
                _ => Err(conversion_error::<Self>(&value)),
            },
            v => v
                .as_i128()
                .map(|v| v != 0)
                .ok_or_else(|| conversion_error::<Self>(&value)),
        }
    }
}

impl AsValue for String {
    fn as_empty_value() -> Value {
        Value::Varchar(None)
    }
    fn as_value(self) -> Value {
        Value::Varchar(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Varchar(Some(v)) => Ok(v),
            Value::Blob(Some(v)) => {
                String::from_utf8(v.into_vec()).map_err(|e| Error::new(e).context("blob to String"))
            }
            v => Err(conversion_error::<Self>(&v)),
        }
    }
}

impl AsValue for Box<[u8]> {
    fn as_empty_value() -> Value {
        Value::Blob(None)
    }
    fn as_value(self) -> Value {
        Value::Blob(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Blob(Some(v)) => Ok(v),
            Value::Varchar(Some(v)) => Ok(v.into_bytes().into_boxed_slice()),
            v => Err(conversion_error::<Self>(&v)),
        }
    }
}

impl AsValue for Vec<u8> {
    fn as_empty_value() -> Value {
        Value::Blob(None)
    }
    fn as_value(self) -> Value {
        Value::Blob(Some(self.into_boxed_slice()))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        Box::<[u8]>::try_from_value(value).map(Into::into)
    }
}

impl AsValue for Decimal {
    fn as_empty_value() -> Value {
        Value::Decimal(None)
    }
    fn as_value(self) -> Value {
        Value::Decimal(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        let result = match &value {
            Value::Decimal(Some(v)) => return Ok(*v),
            Value::Float32(Some(v)) => Decimal::from_f32(*v),
            Value::Float64(Some(v)) => Decimal::from_f64(*v),
            Value::Varchar(Some(v)) => Decimal::from_str(v.trim()).ok(),
            v => v.as_i128().and_then(Decimal::from_i128),
        };
        result.ok_or_else(|| conversion_error::<Self>(&value))
    }
}

impl AsValue for Uuid {
    fn as_empty_value() -> Value {
        Value::Uuid(None)
    }
    fn as_value(self) -> Value {
        Value::Uuid(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        let result = match &value {
            Value::Uuid(Some(v)) => return Ok(*v),
            Value::Varchar(Some(v)) => Uuid::parse_str(v.trim()).ok(),
            Value::Blob(Some(v)) => Uuid::from_slice(v).ok(),
            _ => None,
        };
        result.ok_or_else(|| conversion_error::<Self>(&value))
    }
}

impl AsValue for Date {
    fn as_empty_value() -> Value {
        Value::Date(None)
    }
    fn as_value(self) -> Value {
        Value::Date(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        let result = match &value {
            Value::Date(Some(v)) => return Ok(*v),
            Value::Timestamp(Some(v)) => Some(v.date()),
            Value::Varchar(Some(v)) => Date::parse(v.trim(), DATE_FORMAT).ok(),
            _ => None,
        };
        result.ok_or_else(|| conversion_error::<Self>(&value))
    }
}

impl AsValue for Time {
    fn as_empty_value() -> Value {
        Value::Time(None)
    }
    fn as_value(self) -> Value {
        Value::Time(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        let result = match &value {
            Value::Time(Some(v)) => return Ok(*v),
            Value::Timestamp(Some(v)) => Some(v.time()),
            Value::Varchar(Some(v)) => TIME_FORMATS
                .iter()
                .find_map(|format| Time::parse(v.trim(), *format).ok()),
            _ => None,
        };
        result.ok_or_else(|| conversion_error::<Self>(&value))
    }
}

impl AsValue for PrimitiveDateTime {
    fn as_empty_value() -> Value {
        Value::Timestamp(None)
    }
    fn as_value(self) -> Value {
        Value::Timestamp(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        let result = match &value {
            Value::Timestamp(Some(v)) => return Ok(*v),
            Value::TimestampWithTimezone(Some(v)) => {
                let v = v.to_offset(UtcOffset::UTC);
                Some(PrimitiveDateTime::new(v.date(), v.time()))
            }
            Value::Varchar(Some(v)) => TIMESTAMP_FORMATS
                .iter()
                .find_map(|format| PrimitiveDateTime::parse(v.trim(), *format).ok()),
            v => v
                .as_i128()
                .and_then(|v| i64::try_from(v).ok())
                .and_then(|v| OffsetDateTime::from_unix_timestamp(v).ok())
                .map(|v| PrimitiveDateTime::new(v.date(), v.time())),
        };
        result.ok_or_else(|| conversion_error::<Self>(&value))
    }
}

impl AsValue for OffsetDateTime {
    fn as_empty_value() -> Value {
        Value::TimestampWithTimezone(None)
    }
    fn as_value(self) -> Value {
        Value::TimestampWithTimezone(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        let result = match &value {
            Value::TimestampWithTimezone(Some(v)) => return Ok(*v),
            Value::Timestamp(Some(v)) => Some(v.assume_utc()),
            Value::Varchar(Some(v)) => OffsetDateTime::parse(v.trim(), &Rfc3339).ok().or_else(|| {
                TIMESTAMP_FORMATS
                    .iter()
                    .find_map(|format| PrimitiveDateTime::parse(v.trim(), *format).ok())
                    .map(PrimitiveDateTime::assume_utc)
            }),
            v => v
                .as_i128()
                .and_then(|v| i64::try_from(v).ok())
                .and_then(|v| OffsetDateTime::from_unix_timestamp(v).ok()),
        };
        result.ok_or_else(|| conversion_error::<Self>(&value))
    }
}

impl<T: AsValue> AsValue for Option<T> {
    const NULLABLE: bool = true;
    fn as_empty_value() -> Value {
        T::as_empty_value()
    }
    fn as_value(self) -> Value {
        match self {
            Some(v) => v.as_value(),
            None => T::as_empty_value(),
        }
    }
    fn try_from_value(value: Value) -> Result<Self> {
        Ok(if value.is_null() {
            None
        } else {
            Some(<T as AsValue>::try_from_value(value)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::find_error;

    #[test]
    fn integers_accept_other_widths() {
        assert_eq!(u8::try_from_value(Value::Int64(Some(255))).unwrap(), 255);
        assert_eq!(i64::try_from_value(Value::UInt32(Some(9))).unwrap(), 9);
        assert_eq!(i32::try_from_value(Value::Varchar(Some(" 12 ".into()))).unwrap(), 12);
        let error = u8::try_from_value(Value::Int64(Some(256))).unwrap_err();
        let conversion = find_error::<ConversionError>(&error).expect("conversion error");
        assert_eq!(conversion.target, "u8");
    }

    #[test]
    fn options_are_nullable() {
        assert!(<Option<i32> as AsValue>::NULLABLE);
        assert!(!<i32 as AsValue>::NULLABLE);
        assert_eq!(Option::<i32>::try_from_value(Value::Int32(None)).unwrap(), None);
        assert_eq!(Option::<i32>::try_from_value(Value::Null).unwrap(), None);
        assert_eq!(None::<String>.as_value(), Value::Varchar(None));
    }

    #[test]
    fn temporal_values_from_text_and_unix_seconds() {
        let timestamp = OffsetDateTime::try_from_value(Value::Int64(Some(86_400))).unwrap();
        assert_eq!(
            timestamp.date(),
            Date::from_calendar_date(1970, time::Month::January, 2).unwrap()
        );
        let parsed = OffsetDateTime::try_from_value(Value::Varchar(Some(
            "2025-01-02T03:04:05+02:00".into(),
        )))
        .unwrap();
        assert_eq!(parsed.offset().whole_hours(), 2);
        assert_eq!(
            i64::try_from_value(Value::TimestampWithTimezone(Some(timestamp))).unwrap(),
            86_400
        );
        assert_eq!(
            Time::try_from_value(Value::Varchar(Some("10:20".into()))).unwrap(),
            Time::from_hms(10, 20, 0).unwrap()
        );
    }
}
