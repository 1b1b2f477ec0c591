use super::{now_value, primary_key_search};
use crate::{Condition, Context, Error, Model, Result, SearchList, compile};

fn refuse_everything(model: &Model, what: &str) -> Error {
    Error::msg(format!(
        "Refusing to {what} every row of `{}`, the filter is empty",
        model.name()
    ))
}

/// Deletes every record by primary key.
pub(crate) fn hard_delete(ctx: &mut Context<'_>) -> Result<()> {
    let model = ctx.model().clone();
    let dialect = ctx.database().dialect();
    for i in 0..ctx.records().len() {
        let Some(record) = ctx.records().get(i) else {
            break;
        };
        let search = primary_key_search(&model, record, i, "needed to delete it")?;
        let query = dialect.delete(&model, &compile(&search, &model)?);
        ctx.exec(query, &[i])?;
    }
    Ok(())
}

/// Stamps the deletion time on every record, rows already deleted keep their stamp.
pub(crate) fn soft_delete(ctx: &mut Context<'_>) -> Result<()> {
    let model = ctx.model().clone();
    let deleted_at = model.deleted_at().ok_or_else(|| {
        Error::msg(format!("`{}` has no deletion stamp field", model.name()))
    })?;
    let dialect = ctx.database().dialect();
    let now = now_value(&deleted_at.value)?;
    for i in 0..ctx.records().len() {
        let Some(record) = ctx.records().get(i) else {
            break;
        };
        let search = primary_key_search(&model, record, i, "needed to delete it")?
            .and(Condition::is_null(deleted_at.name.clone()));
        let query = dialect.update(
            &model,
            &[(deleted_at, now.clone())],
            &compile(&search, &model)?,
        );
        ctx.exec(query, &[i])?;
        if let Some(record) = ctx.records_mut().get_mut(i) {
            record.set_field(&deleted_at.name, now.clone())?;
        }
    }
    Ok(())
}

pub(crate) fn hard_delete_where(ctx: &mut Context<'_>) -> Result<()> {
    let model = ctx.model().clone();
    let search = ctx.brick().search();
    if search.is_empty() {
        return Err(refuse_everything(&model, "delete"));
    }
    let query = ctx
        .database()
        .dialect()
        .delete(&model, &compile(search, &model)?);
    ctx.exec(query, &[])?;
    Ok(())
}

/// Stamps every row matching the filter, rows already deleted keep their stamp.
pub(crate) fn soft_delete_where(ctx: &mut Context<'_>) -> Result<()> {
    let model = ctx.model().clone();
    let brick = ctx.brick();
    if brick.search().is_empty() {
        return Err(refuse_everything(&model, "delete"));
    }
    let deleted_at = model.deleted_at().ok_or_else(|| {
        Error::msg(format!("`{}` has no deletion stamp field", model.name()))
    })?;
    let search = SearchList::new()
        .and_group(brick.search().clone())
        .and(Condition::is_null(deleted_at.name.clone()));
    let now = now_value(&deleted_at.value)?;
    let query = ctx.database().dialect().update(
        &model,
        &[(deleted_at, now)],
        &compile(&search, &model)?,
    );
    ctx.exec(query, &[])?;
    Ok(())
}
