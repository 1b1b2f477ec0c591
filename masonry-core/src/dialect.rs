use crate::{Fragment, Model, ModelField, Value, separated_by};
use std::fmt::{self, Display};

/// Statement ready for an executor: SQL text in the dialect placeholder style and its arguments.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Query {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Query {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

/// Column to order by, with direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordered {
    pub column: String,
    pub order: Order,
}

/// Projection, filter and paging of a select.
#[derive(Debug, Clone, Copy)]
pub struct Select<'a> {
    pub columns: &'a [&'a ModelField],
    pub condition: &'a Fragment,
    pub order_by: &'a [Ordered],
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Dialect printer producing the SQL text of every statement the engine runs.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Escape occurrences of `search` char with `replace` while copying into buffer.
    fn write_escaped(&self, out: &mut String, value: &str, search: char, replace: &str) {
        let mut position = 0;
        for (i, c) in value.char_indices() {
            if c == search {
                out.push_str(&value[position..i]);
                out.push_str(replace);
                position = i + c.len_utf8();
            }
        }
        out.push_str(&value[position..]);
    }

    /// Quote identifiers ("name") doubling inner quotes.
    fn write_identifier_quoted(&self, out: &mut String, value: &str) {
        out.push('"');
        self.write_escaped(out, value, '"', "\"\"");
        out.push('"');
    }

    /// Placeholder of the argument at `index`, zero based.
    fn write_placeholder(&self, out: &mut String, _index: usize) {
        out.push('?');
    }

    /// Render the SQL type for a `Value` prototype.
    fn write_column_type(&self, out: &mut String, value: &Value) {
        out.push_str(match value {
            Value::Null => "VARCHAR",
            Value::Boolean(..) => "BOOLEAN",
            Value::Int8(..) => "TINYINT",
            Value::Int16(..) => "SMALLINT",
            Value::Int32(..) => "INTEGER",
            Value::Int64(..) => "BIGINT",
            Value::UInt8(..) => "UTINYINT",
            Value::UInt16(..) => "USMALLINT",
            Value::UInt32(..) => "UINTEGER",
            Value::UInt64(..) => "UBIGINT",
            Value::Float32(..) => "FLOAT",
            Value::Float64(..) => "DOUBLE",
            Value::Decimal(..) => "DECIMAL",
            Value::Varchar(..) => "VARCHAR",
            Value::Blob(..) => "BLOB",
            Value::Date(..) => "DATE",
            Value::Time(..) => "TIME",
            Value::Timestamp(..) => "TIMESTAMP",
            Value::TimestampWithTimezone(..) => "TIMESTAMPTZ",
            Value::Uuid(..) => "UUID",
        });
    }

    /// Emit single column definition fragment.
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
            None => self.write_column_type(out, &field.value),
        }
        if field.auto_increment {
            out.push_str(" GENERATED BY DEFAULT AS IDENTITY");
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
        }
        if field.unique && !single_key {
            out.push_str(" UNIQUE");
        }
    }

    /// CREATE TABLE followed by one CREATE INDEX per declared index.
    fn create_table(&self, model: &Model, if_not_exists: bool) -> Vec<Query> {
        let mut out = String::with_capacity(128 + model.fields().len() * 48);
        out.push_str("CREATE TABLE ");
        if if_not_exists {
            out.push_str("IF NOT EXISTS ");
        }
        self.write_identifier_quoted(&mut out, model.name());
        out.push_str(" (\n");
        separated_by(
            &mut out,
            model.sql_fields(),
            |out, field| self.write_create_table_column_fragment(out, model, field),
            ",\n",
        );
        if model.primary_key_indices().len() > 1 {
            out.push_str(",\nPRIMARY KEY (");
            separated_by(
                &mut out,
                model.primary_key(),
                |out, field| self.write_identifier_quoted(out, &field.column),
                ", ",
            );
            out.push(')');
        }
        out.push_str("\n);");
        let mut result = vec![Query::new(out, Vec::new())];
        let indexes = model
            .indexes()
            .iter()
            .map(|v| (false, v))
            .chain(model.unique_indexes().iter().map(|v| (true, v)));
        for (unique, (name, fields)) in indexes {
            let mut out = String::with_capacity(64);
            out.push_str(if unique {
                "CREATE UNIQUE INDEX "
            } else {
                "CREATE INDEX "
            });
            if if_not_exists {
                out.push_str("IF NOT EXISTS ");
            }
            self.write_identifier_quoted(&mut out, name);
            out.push_str(" ON ");
            self.write_identifier_quoted(&mut out, model.name());
            out.push_str(" (");
            separated_by(
                &mut out,
                fields.iter().filter_map(|i| model.fields().get(*i)),
                |out, field| self.write_identifier_quoted(out, &field.column),
                ", ",
            );
            out.push_str(");");
            result.push(Query::new(out, Vec::new()));
        }
        result
    }

    fn drop_table(&self, model: &Model, if_exists: bool) -> Query {
        let mut out = String::with_capacity(24 + model.name().len());
        out.push_str("DROP TABLE ");
        if if_exists {
            out.push_str("IF EXISTS ");
        }
        self.write_identifier_quoted(&mut out, model.name());
        out.push(';');
        Query::new(out, Vec::new())
    }

    /// Query returning one row when the table exists.
    fn has_table(&self, table: &str) -> Query {
        self.finish(
            "SELECT 1\nFROM information_schema.tables\nWHERE table_name = ?;".into(),
            vec![Value::Varchar(Some(table.into()))],
        )
    }

    /// INSERT of one row.
    fn insert(&self, model: &Model, row: &[(&ModelField, Value)]) -> Query {
        let mut out = String::with_capacity(64 + row.len() * 24);
        self.write_insert(&mut out, model, row);
        out.push(';');
        self.finish(out, row.iter().map(|(_, v)| v.clone()).collect())
    }

    fn write_insert(&self, out: &mut String, model: &Model, row: &[(&ModelField, Value)]) {
        out.push_str("INSERT INTO ");
        self.write_identifier_quoted(out, model.name());
        if row.is_empty() {
            out.push_str(" DEFAULT VALUES");
            return;
        }
        out.push_str(" (");
        separated_by(
            out,
            row,
            |out, (field, _)| self.write_identifier_quoted(out, &field.column),
            ", ",
        );
        out.push_str(") VALUES (");
        separated_by(out, row, |out, _| out.push('?'), ", ");
        out.push(')');
    }

    /// INSERT that updates the row when the primary key already exists.
    fn save(&self, model: &Model, row: &[(&ModelField, Value)]) -> Query {
        let mut out = String::with_capacity(96 + row.len() * 48);
        self.write_insert(&mut out, model, row);
        if model.primary_key_indices().is_empty() {
            out.push(';');
            return self.finish(out, row.iter().map(|(_, v)| v.clone()).collect());
        }
        out.push_str("\nON CONFLICT (");
        separated_by(
            &mut out,
            model.primary_key(),
            |out, field| self.write_identifier_quoted(out, &field.column),
            ", ",
        );
        out.push(')');
        let mut update = row.iter().filter(|(field, _)| !field.primary_key).peekable();
        if update.peek().is_none() {
            out.push_str(" DO NOTHING;");
        } else {
            out.push_str(" DO UPDATE SET\n");
            separated_by(
                &mut out,
                update,
                |out, (field, _)| {
                    self.write_identifier_quoted(out, &field.column);
                    out.push_str(" = EXCLUDED.");
                    self.write_identifier_quoted(out, &field.column);
                },
                ",\n",
            );
            out.push(';');
        }
        self.finish(out, row.iter().map(|(_, v)| v.clone()).collect())
    }

    fn update(&self, model: &Model, row: &[(&ModelField, Value)], condition: &Fragment) -> Query {
        let mut out = String::with_capacity(64 + row.len() * 24 + condition.sql.len());
        out.push_str("UPDATE ");
        self.write_identifier_quoted(&mut out, model.name());
        out.push_str(" SET\n");
        separated_by(
            &mut out,
            row,
            |out, (field, _)| {
                self.write_identifier_quoted(out, &field.column);
                out.push_str(" = ?");
            },
            ",\n",
        );
        self.write_where(&mut out, condition);
        out.push(';');
        let mut args: Vec<Value> = row.iter().map(|(_, v)| v.clone()).collect();
        args.extend(condition.args.iter().cloned());
        self.finish(out, args)
    }

    fn find(&self, model: &Model, select: Select<'_>) -> Query {
        let mut out = String::with_capacity(128 + select.columns.len() * 24);
        out.push_str("SELECT ");
        separated_by(
            &mut out,
            select.columns,
            |out, field| self.write_identifier_quoted(out, &field.column),
            ", ",
        );
        out.push_str("\nFROM ");
        self.write_identifier_quoted(&mut out, model.name());
        self.write_where(&mut out, select.condition);
        if !select.order_by.is_empty() {
            out.push_str("\nORDER BY ");
            separated_by(
                &mut out,
                select.order_by,
                |out, ordered| {
                    self.write_identifier_quoted(out, &ordered.column);
                    out.push_str(match ordered.order {
                        Order::Asc => " ASC",
                        Order::Desc => " DESC",
                    });
                },
                ", ",
            );
        }
        self.write_limit_offset(&mut out, select.limit, select.offset);
        out.push(';');
        self.finish(out, select.condition.args.clone())
    }

    fn write_limit_offset(&self, out: &mut String, limit: Option<u64>, offset: Option<u64>) {
        if let Some(limit) = limit {
            out.push_str(&format!("\nLIMIT {limit}"));
        }
        if let Some(offset) = offset {
            out.push_str(&format!("\nOFFSET {offset}"));
        }
    }

    fn count(&self, model: &Model, condition: &Fragment) -> Query {
        let mut out = String::with_capacity(48 + condition.sql.len());
        out.push_str("SELECT COUNT(*)\nFROM ");
        self.write_identifier_quoted(&mut out, model.name());
        self.write_where(&mut out, condition);
        out.push(';');
        self.finish(out, condition.args.clone())
    }

    fn delete(&self, model: &Model, condition: &Fragment) -> Query {
        let mut out = String::with_capacity(32 + condition.sql.len());
        out.push_str("DELETE FROM ");
        self.write_identifier_quoted(&mut out, model.name());
        self.write_where(&mut out, condition);
        out.push(';');
        self.finish(out, condition.args.clone())
    }

    fn write_where(&self, out: &mut String, condition: &Fragment) {
        if !condition.is_empty() {
            out.push_str("\nWHERE ");
            out.push_str(&condition.sql);
        }
    }

    /// Replaces every `?` outside quoted text with the dialect placeholder.
    fn finish(&self, sql: String, args: Vec<Value>) -> Query {
        let mut probe = String::new();
        self.write_placeholder(&mut probe, 0);
        if probe == "?" {
            return Query::new(sql, args);
        }
        let mut out = String::with_capacity(sql.len() + args.len() * 2);
        let mut quote: Option<char> = None;
        let mut index = 0;
        for c in sql.chars() {
            match (quote, c) {
                (None, '?') => {
                    self.write_placeholder(&mut out, index);
                    index += 1;
                    continue;
                }
                (None, '\'' | '"') => quote = Some(c),
                (Some(q), c) if q == c => quote = None,
                _ => {}
            }
            out.push(c);
        }
        Query::new(out, args)
    }
}

/// Fallback dialect with ANSI quoting and `?` placeholders.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericDialect;

impl GenericDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Numbered;
    impl Dialect for Numbered {
        fn name(&self) -> &'static str {
            "numbered"
        }
        fn write_placeholder(&self, out: &mut String, index: usize) {
            out.push_str(&format!("${}", index + 1));
        }
    }

    #[test]
    fn placeholders_skip_quoted_text() {
        let query = Numbered.finish(
            r#"SELECT "a?" FROM "t" WHERE "b" = ? AND "c" LIKE '?%' AND "d" IN (?, ?);"#.into(),
            Vec::new(),
        );
        assert_eq!(
            query.sql,
            r#"SELECT "a?" FROM "t" WHERE "b" = $1 AND "c" LIKE '?%' AND "d" IN ($2, $3);"#
        );
    }

    #[test]
    fn escaping_keeps_multibyte_text() {
        let mut out = String::new();
        GenericDialect.write_identifier_quoted(&mut out, "ü\"x");
        assert_eq!(out, "\"ü\"\"x\"");
    }
}
