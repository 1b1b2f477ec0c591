use masonry_core::{Error, Result, Value};
use rusqlite::types::{Value as SqliteValue, ValueRef};

/// Column value as read from a row, the record converts it to the declared type.
pub(crate) fn extract_value(value: ValueRef<'_>) -> Result<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Int64(Some(v)),
        ValueRef::Real(v) => Value::Float64(Some(v)),
        ValueRef::Text(v) => Value::Varchar(Some(String::from_utf8(v.to_vec())?)),
        ValueRef::Blob(v) => Value::Blob(Some(v.into())),
    })
}

/// Argument bound to a statement. Types without a native storage class are bound as text.
pub(crate) fn bind_value(value: &Value) -> Result<SqliteValue> {
    if value.is_null() {
        return Ok(SqliteValue::Null);
    }
    Ok(match value {
        Value::Boolean(Some(v)) => SqliteValue::Integer(*v as i64),
        Value::Int8(Some(v)) => SqliteValue::Integer(*v as i64),
        Value::Int16(Some(v)) => SqliteValue::Integer(*v as i64),
        Value::Int32(Some(v)) => SqliteValue::Integer(*v as i64),
        Value::Int64(Some(v)) => SqliteValue::Integer(*v),
        Value::UInt8(Some(v)) => SqliteValue::Integer(*v as i64),
        Value::UInt16(Some(v)) => SqliteValue::Integer(*v as i64),
        Value::UInt32(Some(v)) => SqliteValue::Integer(*v as i64),
        Value::UInt64(Some(v)) => SqliteValue::Integer(i64::try_from(*v).map_err(|_| {
            Error::msg(format!("{v} does not fit a sqlite integer"))
        })?),
        Value::Float32(Some(v)) => SqliteValue::Real(*v as f64),
        Value::Float64(Some(v)) => SqliteValue::Real(*v),
        Value::Blob(Some(v)) => SqliteValue::Blob(v.to_vec()),
        v => match v.to_text()? {
            Some(text) => SqliteValue::Text(text),
            None => {
                return Err(Error::msg(format!(
                    "Cannot bind a {} value to sqlite",
                    v.type_name()
                )));
            }
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn binds_by_storage_class() {
        assert_eq!(bind_value(&Value::Boolean(Some(true))).unwrap(), SqliteValue::Integer(1));
        assert_eq!(bind_value(&Value::Int64(None)).unwrap(), SqliteValue::Null);
        assert!(bind_value(&Value::UInt64(Some(u64::MAX))).is_err());
        assert_eq!(
            bind_value(&Value::Timestamp(Some(datetime!(2024-01-02 03:04:05)))).unwrap(),
            SqliteValue::Text(
                Value::Timestamp(Some(datetime!(2024-01-02 03:04:05)))
                    .to_text()
                    .unwrap()
                    .unwrap()
            )
        );
    }
}
