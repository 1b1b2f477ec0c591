use masonry_core::{Dialect, Model, ModelField, Query, Value};

/// Sqlite flavour of the SQL printer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn write_column_type(&self, out: &mut String, value: &Value) {
        out.push_str(match value {
            Value::Boolean(..)
            | Value::Int8(..)
            | Value::Int16(..)
            | Value::Int32(..)
            | Value::Int64(..)
            | Value::UInt8(..)
            | Value::UInt16(..)
            | Value::UInt32(..)
            | Value::UInt64(..) => "INTEGER",
            Value::Float32(..) | Value::Float64(..) => "REAL",
            Value::Blob(..) => "BLOB",
            Value::Null
            | Value::Decimal(..)
            | Value::Varchar(..)
            | Value::Date(..)
            | Value::Time(..)
            | Value::Timestamp(..)
            | Value::TimestampWithTimezone(..)
            | Value::Uuid(..) => "TEXT",
        });
    }

    /// Generated keys are rowid aliases: `INTEGER PRIMARY KEY AUTOINCREMENT`.
    fn write_create_table_column_fragment(
        &self,
        out: &mut String,
        model: &Model,
        field: &ModelField,
    ) {
        let single_key = field.primary_key && model.primary_key_indices().len() == 1;
        self.write_identifier_quoted(out, &field.column);
        out.push(' ');
        match &field.sql_type {
            Some(sql_type) => out.push_str(sql_type),
            None if single_key && field.auto_increment => out.push_str("INTEGER"),
            None => self.write_column_type(out, &field.value),
        }
        if !field.nullable && !single_key {
            out.push_str(" NOT NULL");
        }
        if let Some(default) = &field.default {
            out.push_str(" DEFAULT ");
            out.push_str(default);
        }
        if single_key {
            out.push_str(" PRIMARY KEY");
            if field.auto_increment {
                out.push_str(" AUTOINCREMENT");
            }
        }
        if field.unique && !single_key {
            out.push_str(" UNIQUE");
        }
    }

    fn has_table(&self, table: &str) -> Query {
        Query::new(
            "SELECT 1\nFROM sqlite_master\nWHERE type = 'table' AND name = ?;",
            vec![Value::Varchar(Some(table.into()))],
        )
    }

    /// Sqlite has no `OFFSET` without `LIMIT`, a negative limit means no limit.
    fn write_limit_offset(&self, out: &mut String, limit: Option<u64>, offset: Option<u64>) {
        match (limit, offset) {
            (Some(limit), _) => out.push_str(&format!("\nLIMIT {limit}")),
            (None, Some(..)) => out.push_str("\nLIMIT -1"),
            (None, None) => {}
        }
        if let Some(offset) = offset {
            out.push_str(&format!("\nOFFSET {offset}"));
        }
    }
}
