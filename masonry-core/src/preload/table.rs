use super::{Filed, nested, of_kind};
use crate::{Context, Preload, RecordKind, RecordSet, RelationKind, Result};

/// Runs the table operation of the context on the sub table of `preload`, unless the relation
/// points back at the owner table.
fn sub_table(ctx: &mut Context<'_>, preload: &Preload, operation: &str) -> Result<()> {
    let relation = &preload.relation;
    if relation.sub.name() == relation.owner.name() {
        return Ok(());
    }
    let records = RecordSet::empty(relation.sub.clone(), RecordKind::Named);
    let shard = ctx.shard();
    nested(ctx, Filed::Preload(&relation.field), &preload.brick, operation, records, shard).1
}

fn junction_table(ctx: &mut Context<'_>, preload: &Preload, operation: &str) -> Result<()> {
    let Some(junction) = &preload.relation.junction else {
        return Ok(());
    };
    let brick = ctx.brick().junction_brick(&junction.model);
    let records = RecordSet::empty(junction.model.clone(), RecordKind::Named);
    let shard = ctx.shard();
    nested(ctx, Filed::Junction(junction.model.name()), &brick, operation, records, shard).1
}

/// Tables the owner table points to come first.
pub(crate) fn create_belongs_to_tables(ctx: &mut Context<'_>) -> Result<()> {
    let operation = ctx.operation().to_string();
    for preload in of_kind(ctx.brick(), RelationKind::BelongsTo) {
        sub_table(ctx, preload, &operation)?;
    }
    Ok(())
}

pub(crate) fn create_child_tables(ctx: &mut Context<'_>) -> Result<()> {
    let operation = ctx.operation().to_string();
    for kind in [RelationKind::OneToOne, RelationKind::OneToMany] {
        for preload in of_kind(ctx.brick(), kind) {
            sub_table(ctx, preload, &operation)?;
        }
    }
    for preload in of_kind(ctx.brick(), RelationKind::ManyToMany) {
        sub_table(ctx, preload, &operation)?;
        junction_table(ctx, preload, &operation)?;
    }
    Ok(())
}

/// Tables pointing to the owner table go first.
pub(crate) fn drop_child_tables(ctx: &mut Context<'_>) -> Result<()> {
    let operation = ctx.operation().to_string();
    for kind in [RelationKind::OneToOne, RelationKind::OneToMany] {
        for preload in of_kind(ctx.brick(), kind) {
            sub_table(ctx, preload, &operation)?;
        }
    }
    for preload in of_kind(ctx.brick(), RelationKind::ManyToMany) {
        junction_table(ctx, preload, &operation)?;
        sub_table(ctx, preload, &operation)?;
    }
    Ok(())
}

pub(crate) fn drop_belongs_to_tables(ctx: &mut Context<'_>) -> Result<()> {
    let operation = ctx.operation().to_string();
    for preload in of_kind(ctx.brick(), RelationKind::BelongsTo) {
        sub_table(ctx, preload, &operation)?;
    }
    Ok(())
}
