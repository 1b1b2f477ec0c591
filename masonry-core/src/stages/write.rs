use super::{WriteKind, generated_key, key_value, now_value, primary_key_search, row_values};
use crate::{
    Condition, Context, Error, FieldRole, Key, ModelField, Result, Select, SearchList, Value,
    compile,
};
use std::collections::HashMap;

/// Sets the creation and update stamps that are still empty.
pub(crate) fn insert_timestamps(ctx: &mut Context<'_>) -> Result<()> {
    let model = ctx.model().clone();
    let stamps: Vec<&ModelField> = [FieldRole::CreatedAt, FieldRole::UpdatedAt]
        .into_iter()
        .filter_map(|role| model.field_with_role(role))
        .collect();
    if stamps.is_empty() {
        return Ok(());
    }
    for record in ctx.records_mut().iter_mut() {
        for field in &stamps {
            if record.field(&field.name).is_none_or(|v| v.is_zero()) {
                record.set_field(&field.name, now_value(&field.value)?)?;
            }
        }
    }
    Ok(())
}

/// Refreshes the update stamp and keeps the creation stamp of rows that already exist, those
/// are read back in a single query.
pub(crate) fn save_timestamps(ctx: &mut Context<'_>) -> Result<()> {
    let model = ctx.model().clone();
    let created_at = model.field_with_role(FieldRole::CreatedAt);
    let updated_at = model.field_with_role(FieldRole::UpdatedAt);
    let mut existing: HashMap<Key, Value> = HashMap::new();
    if let (Some(created_at), Ok(pk)) = (created_at, model.single_primary_key()) {
        let mut keys = Vec::new();
        let mut indices = Vec::new();
        for (i, record) in ctx.records().iter().enumerate() {
            if let Some(key) = key_value(record, pk) {
                keys.push(key);
                indices.push(i);
            }
        }
        if !keys.is_empty() {
            let condition = compile(
                &SearchList::from(Condition::is_in(pk.name.clone(), keys)),
                &model,
            )?;
            let columns = [pk, created_at];
            let query = ctx.database().dialect().find(
                &model,
                Select {
                    columns: &columns,
                    condition: &condition,
                    order_by: &[],
                    limit: None,
                    offset: None,
                },
            );
            for row in ctx.query(query, &indices)? {
                let (Some(key), Some(value)) =
                    (row.get_column(&pk.column), row.get_column(&created_at.column))
                else {
                    continue;
                };
                if let Some(key) = key.convert_to(&pk.value)?.key() {
                    existing.insert(key, value.clone());
                }
            }
        }
    }
    let mut now = HashMap::new();
    for record in ctx.records_mut().iter_mut() {
        if let Some(field) = created_at {
            let previous = model
                .single_primary_key()
                .ok()
                .and_then(|pk| key_value(record, pk))
                .and_then(|key| key.key())
                .and_then(|key| existing.get(&key))
                .filter(|v| !v.is_null());
            match previous {
                Some(previous) => record.set_field(&field.name, previous.clone())?,
                None if record.field(&field.name).is_none_or(|v| v.is_zero()) => {
                    record.set_field(&field.name, stamp(&mut now, field)?)?
                }
                None => {}
            }
        }
        if let Some(field) = updated_at {
            record.set_field(&field.name, stamp(&mut now, field)?)?;
        }
    }
    Ok(())
}

/// Refreshes the update stamp.
pub(crate) fn update_timestamps(ctx: &mut Context<'_>) -> Result<()> {
    let model = ctx.model().clone();
    let Some(field) = model.field_with_role(FieldRole::UpdatedAt) else {
        return Ok(());
    };
    let value = now_value(&field.value)?;
    for record in ctx.records_mut().iter_mut() {
        record.set_field(&field.name, value.clone())?;
    }
    Ok(())
}

/// One current time per field type, so the stamps of a batch agree.
fn stamp(cache: &mut HashMap<String, Value>, field: &ModelField) -> Result<Value> {
    if let Some(value) = cache.get(&field.name) {
        return Ok(value.clone());
    }
    let value = now_value(&field.value)?;
    cache.insert(field.name.clone(), value.clone());
    Ok(value)
}

pub(crate) fn insert(ctx: &mut Context<'_>) -> Result<()> {
    write_rows(ctx, WriteKind::Insert)
}

/// Upsert by primary key. Records whose key is still to be generated are plain inserts.
pub(crate) fn save(ctx: &mut Context<'_>) -> Result<()> {
    write_rows(ctx, WriteKind::Save)
}

fn write_rows(ctx: &mut Context<'_>, kind: WriteKind) -> Result<()> {
    let model = ctx.model().clone();
    let dialect = ctx.database().dialect();
    for i in 0..ctx.records().len() {
        let Some(record) = ctx.records().get(i) else {
            break;
        };
        let generated = generated_key(&model, record);
        let row = row_values(ctx, &model, record, kind);
        let query = if kind == WriteKind::Save && !generated {
            dialect.save(&model, &row)
        } else {
            dialect.insert(&model, &row)
        };
        let affected = ctx.exec(query, &[i])?;
        if !generated {
            continue;
        }
        match (affected.last_affected_id, model.single_primary_key()) {
            (Some(id), Ok(pk)) => {
                if let Some(record) = ctx.records_mut().get_mut(i) {
                    record.set_field(&pk.name, Value::Int64(Some(id)))?;
                }
            }
            _ => log::warn!(
                "Record {} of `{}` was inserted without knowing its generated key",
                i,
                model.name()
            ),
        }
    }
    Ok(())
}

/// Updates every record by primary key, soft deleted rows are left alone unless unscoped.
pub(crate) fn update(ctx: &mut Context<'_>) -> Result<()> {
    let model = ctx.model().clone();
    let dialect = ctx.database().dialect();
    let unscoped = ctx.brick().is_unscoped();
    for i in 0..ctx.records().len() {
        let Some(record) = ctx.records().get(i) else {
            break;
        };
        let row = row_values(ctx, &model, record, WriteKind::Update);
        if row.is_empty() {
            log::warn!("Record {} of `{}` has nothing to update", i, model.name());
            continue;
        }
        let mut search = primary_key_search(&model, record, i, "needed to update it")?;
        if let Some(deleted_at) = model.deleted_at().filter(|_| !unscoped) {
            search = search.and(Condition::is_null(deleted_at.name.clone()));
        }
        let condition = compile(&search, &model)?;
        let query = dialect.update(&model, &row, &condition);
        ctx.exec(query, &[i])?;
    }
    Ok(())
}

/// Sets the values carried by the single record on every row matching the filter.
pub(crate) fn update_where(ctx: &mut Context<'_>) -> Result<()> {
    let model = ctx.model().clone();
    let brick = ctx.brick();
    if brick.search().is_empty() {
        return Err(Error::msg(format!(
            "Refusing to update every row of `{}`, the filter is empty",
            model.name()
        )));
    }
    let record = ctx
        .records()
        .get(0)
        .ok_or_else(|| Error::msg("The values to set are missing"))?;
    let mut row = Vec::new();
    for (i, field) in model.fields().iter().enumerate() {
        if field.ignore || !record.has_field(i) {
            continue;
        }
        if let Some(value) = record.field(&field.name) {
            row.push((field, value));
        }
    }
    if let Some(field) = model.field_with_role(FieldRole::UpdatedAt) {
        if !row.iter().any(|(f, _)| f.name == field.name) {
            row.push((field, now_value(&field.value)?));
        }
    }
    if row.is_empty() {
        return Err(Error::msg(format!(
            "Nothing to set on `{}`",
            model.name()
        )));
    }
    let condition = compile(&brick.scoped_search(), &model)?;
    let query = ctx.database().dialect().update(&model, &row, &condition);
    ctx.exec(query, &[0])?;
    Ok(())
}
