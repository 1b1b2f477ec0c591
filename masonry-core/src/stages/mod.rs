//! Built-in stages and the default stage list of every operation.

mod delete;
mod find;
mod shard;
mod table;
mod write;

pub(crate) use shard::*;

use crate::{
    Condition, Context, Error, FieldRole, IgnoreMode, KeyClass, MissingPrimaryKey, Model,
    ModelField, Record, Result, SearchList, Stage, Value, preload,
};
use time::{OffsetDateTime, PrimitiveDateTime};

pub(crate) fn create_table() -> Vec<Stage> {
    vec![
        Stage::new("fan_out_shards", fan_out_shards),
        Stage::new("create_belongs_to_tables", preload::create_belongs_to_tables),
        Stage::new("create_table", table::create_table),
        Stage::new("create_child_tables", preload::create_child_tables),
    ]
}

pub(crate) fn drop_table() -> Vec<Stage> {
    vec![
        Stage::new("fan_out_shards", fan_out_shards),
        Stage::new("drop_child_tables", preload::drop_child_tables),
        Stage::new("drop_table", table::drop_table),
        Stage::new("drop_belongs_to_tables", preload::drop_belongs_to_tables),
    ]
}

pub(crate) fn insert() -> Vec<Stage> {
    vec![
        Stage::new("skip_empty", skip_empty),
        Stage::new("assign_ids", assign_ids),
        Stage::new("fan_out_records", fan_out_records),
        Stage::new("write_belongs_to", preload::write_belongs_to),
        Stage::new("insert_timestamps", write::insert_timestamps),
        Stage::new("insert", write::insert),
        Stage::new("write_children", preload::write_children),
        Stage::new("write_many_to_many", preload::write_many_to_many),
    ]
}

pub(crate) fn save() -> Vec<Stage> {
    vec![
        Stage::new("skip_empty", skip_empty),
        Stage::new("assign_ids", assign_ids),
        Stage::new("fan_out_records", fan_out_records),
        Stage::new("write_belongs_to", preload::write_belongs_to),
        Stage::new("save_timestamps", write::save_timestamps),
        Stage::new("save", write::save),
        Stage::new("write_children", preload::write_children),
        Stage::new("write_many_to_many", preload::write_many_to_many),
    ]
}

pub(crate) fn update() -> Vec<Stage> {
    vec![
        Stage::new("skip_empty", skip_empty),
        Stage::new("fan_out_records", fan_out_records),
        Stage::new("update_timestamps", write::update_timestamps),
        Stage::new("update", write::update),
    ]
}

pub(crate) fn find() -> Vec<Stage> {
    vec![
        Stage::new("fan_out_shards", fan_out_shards),
        Stage::new("find", find::find),
        Stage::new("find_preloads", preload::find_preloads),
    ]
}

pub(crate) fn hard_delete() -> Vec<Stage> {
    vec![
        Stage::new("skip_empty", skip_empty),
        Stage::new("fan_out_records", fan_out_records),
        Stage::new("delete_children", preload::delete_children),
        Stage::new("hard_delete", delete::hard_delete),
        Stage::new("delete_belongs_to", preload::delete_belongs_to),
    ]
}

pub(crate) fn soft_delete() -> Vec<Stage> {
    vec![
        Stage::new("skip_empty", skip_empty),
        Stage::new("fan_out_records", fan_out_records),
        Stage::new("delete_children", preload::delete_children),
        Stage::new("soft_delete", delete::soft_delete),
        Stage::new("delete_belongs_to", preload::delete_belongs_to),
    ]
}

pub(crate) fn hard_delete_where() -> Vec<Stage> {
    vec![
        Stage::new("fan_out_shards", fan_out_shards),
        Stage::new("hard_delete_where", delete::hard_delete_where),
    ]
}

pub(crate) fn soft_delete_where() -> Vec<Stage> {
    vec![
        Stage::new("fan_out_shards", fan_out_shards),
        Stage::new("soft_delete_where", delete::soft_delete_where),
    ]
}

pub(crate) fn update_where() -> Vec<Stage> {
    vec![
        Stage::new("fan_out_shards", fan_out_shards),
        Stage::new("update_where", write::update_where),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteKind {
    Insert,
    Save,
    Update,
}

/// Fields and values of `record` that go into a write statement.
pub(crate) fn row_values<'m>(
    ctx: &Context<'_>,
    model: &'m Model,
    record: &Record,
    kind: WriteKind,
) -> Vec<(&'m ModelField, Value)> {
    let brick = ctx.brick();
    let variable = ctx.records().is_variable_container();
    let mode = brick.ignore_mode_for(ctx.operation());
    let bound = brick.bound_fields();
    let mut result = Vec::with_capacity(model.fields().len());
    for (i, field) in model.fields().iter().enumerate() {
        if field.ignore || (variable && !record.has_field(i)) {
            continue;
        }
        let unbound = bound.is_some_and(|bound| !bound.contains(&field.name));
        if unbound && !field.primary_key && field.role == FieldRole::Plain {
            continue;
        }
        let Some(value) = record.field(&field.name) else {
            continue;
        };
        match kind {
            WriteKind::Insert | WriteKind::Save => {
                if field.primary_key && field.auto_increment && value.is_zero() {
                    continue;
                }
            }
            WriteKind::Update => {
                if field.primary_key
                    || matches!(field.role, FieldRole::CreatedAt | FieldRole::DeletedAt)
                {
                    continue;
                }
            }
        }
        let skip = match mode {
            IgnoreMode::Nothing => false,
            IgnoreMode::Zero => value.is_zero(),
            IgnoreMode::Null => value.is_null(),
        };
        if skip && !variable {
            continue;
        }
        result.push((field, value));
    }
    result
}

/// Value of `field` when it identifies a row: not null, and not zero for a generated key.
pub(crate) fn key_value(record: &Record, field: &ModelField) -> Option<Value> {
    record
        .field(&field.name)
        .filter(|v| !v.is_null() && !(field.auto_increment && v.is_zero()))
}

/// True when the database is expected to generate the primary key of `record`.
pub(crate) fn generated_key(model: &Model, record: &Record) -> bool {
    let mut keys = model.primary_key();
    match (keys.next(), keys.next()) {
        (Some(pk), None) => pk.auto_increment && key_value(record, pk).is_none(),
        _ => false,
    }
}

/// Filter matching the row of `record` by primary key.
pub(crate) fn primary_key_search(
    model: &Model,
    record: &Record,
    index: usize,
    reason: &'static str,
) -> Result<SearchList> {
    let missing = || {
        Error::new(MissingPrimaryKey {
            model: model.name().into(),
            index,
            reason,
        })
    };
    let mut search = SearchList::new();
    for field in model.primary_key() {
        let value = key_value(record, field).ok_or_else(missing)?;
        search = search.and(Condition::eq(field.name.clone(), value));
    }
    if search.is_empty() {
        return Err(missing());
    }
    Ok(search)
}

/// Current time in the type of `prototype`.
pub(crate) fn now_value(prototype: &Value) -> Result<Value> {
    let now = OffsetDateTime::now_utc();
    Ok(match prototype {
        Value::TimestampWithTimezone(..) | Value::Null => Value::TimestampWithTimezone(Some(now)),
        Value::Timestamp(..) => {
            Value::Timestamp(Some(PrimitiveDateTime::new(now.date(), now.time())))
        }
        Value::Date(..) => Value::Date(Some(now.date())),
        Value::Varchar(..) => Value::Varchar(Value::TimestampWithTimezone(Some(now)).to_text()?),
        v if v.key_class() == Some(KeyClass::Integer) => {
            Value::Int64(Some(now.unix_timestamp())).convert_to(v)?
        }
        other => {
            return Err(Error::msg(format!(
                "Cannot stamp the current time into a {} field",
                other.type_name()
            )));
        }
    })
}
