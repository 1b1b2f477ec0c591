use crate::{Context, ModelField, Result, RowLabeled, Select, compile};

/// Reads the rows matching the filter into new records, columns the model doesn't declare end
/// up as virtual fields.
pub(crate) fn find(ctx: &mut Context<'_>) -> Result<()> {
    let brick = ctx.brick();
    let model = ctx.model().clone();
    let columns: Vec<&ModelField> = match brick.bound_fields() {
        Some(bound) => model
            .sql_fields()
            .filter(|f| f.primary_key || bound.contains(&f.name))
            .collect(),
        None => model.sql_fields().collect(),
    };
    let condition = compile(&brick.scoped_search(), &model)?;
    let query = ctx.database().dialect().find(
        &model,
        Select {
            columns: &columns,
            condition: &condition,
            order_by: brick.ordering(),
            limit: brick.limit_value(),
            offset: brick.offset_value(),
        },
    );
    let rows = ctx.query(query, &[])?;
    let start = ctx.records().len();
    for RowLabeled { labels, values } in rows {
        let record = ctx.records_mut().add_default()?;
        for (label, value) in labels.iter().zip(values.into_vec()) {
            match model.field_by_column(label) {
                Some((i, _)) => record.handle(i)?.set(value)?,
                None => record.set_field(label, value)?,
            }
        }
    }
    let outcome = ctx.outcome_mut();
    if let Some(action) = outcome.actions.len().checked_sub(1) {
        for i in start..outcome.records.len() {
            outcome.record_actions.entry(i).or_default().push(action);
        }
    }
    Ok(())
}
