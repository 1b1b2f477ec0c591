use crate::{Context, Result, operation};

pub(crate) fn create_table(ctx: &mut Context<'_>) -> Result<()> {
    let if_not_exists = ctx.operation() == operation::CREATE_TABLE_IF_NOT_EXIST;
    let model = ctx.model().clone();
    for query in ctx.database().dialect().create_table(&model, if_not_exists) {
        ctx.exec(query, &[])?;
    }
    Ok(())
}

pub(crate) fn drop_table(ctx: &mut Context<'_>) -> Result<()> {
    let if_exists = ctx.operation() == operation::DROP_TABLE_IF_EXIST;
    let model = ctx.model().clone();
    let query = ctx.database().dialect().drop_table(&model, if_exists);
    ctx.exec(query, &[])?;
    Ok(())
}
