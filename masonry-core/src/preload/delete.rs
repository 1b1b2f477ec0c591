use super::{Filed, distinct, nested, of_kind, owner_keys};
use crate::{
    Condition, Context, Error, Preload, Record, RecordKind, RecordSet, RelationKind, Result,
    SearchList, Value, operation, stages::now_value,
};
use std::collections::BTreeMap;

/// Removes what points to the owners before the owners go: children are deleted (or stamped when
/// soft deletable) and junction rows are dropped. Records related through a junction stay, other
/// owners may still point to them.
pub(crate) fn delete_children(ctx: &mut Context<'_>) -> Result<()> {
    let hard_owner = ctx.operation() == operation::HARD_DELETE;
    for preload in ctx.brick().preloads() {
        let relation = &preload.relation;
        match relation.kind {
            RelationKind::OneToOne | RelationKind::OneToMany => {
                let keys = distinct(owner_keys(ctx, relation.owner_key_field()?));
                let link = relation.sub_key_field()?;
                let unlink = hard_owner && link.nullable;
                delete_matching(ctx, preload, &link.name, keys, unlink)?;
            }
            RelationKind::ManyToMany => delete_junction_rows(ctx, preload)?,
            RelationKind::BelongsTo => {}
        }
    }
    Ok(())
}

/// Removes the records the owners pointed to, once the owners are gone.
pub(crate) fn delete_belongs_to(ctx: &mut Context<'_>) -> Result<()> {
    for preload in of_kind(ctx.brick(), RelationKind::BelongsTo) {
        let relation = &preload.relation;
        let keys = distinct(owner_keys(ctx, relation.owner_key_field()?));
        let sub_key = relation.sub_key_field()?;
        delete_matching(ctx, preload, &sub_key.name, keys, false)?;
    }
    Ok(())
}

/// Deletes the related rows whose `field` is one of `keys`. Soft deletable rows are stamped in one
/// statement, `unlink` also clears their link. The other rows are read first so their own
/// preloads cascade.
fn delete_matching(
    ctx: &mut Context<'_>,
    preload: &Preload,
    field: &str,
    keys: Vec<Value>,
    unlink: bool,
) -> Result<()> {
    if keys.is_empty() {
        return Ok(());
    }
    let relation = &preload.relation;
    let sub = &relation.sub;
    let brick = preload.brick.with_search(
        SearchList::from(Condition::is_in(field, keys)).and_group(preload.brick.search().clone()),
    );
    let filed = Filed::Preload(&relation.field);
    match sub.deleted_at().filter(|_| !brick.is_unscoped()) {
        Some(deleted_at) => {
            let mut values =
                BTreeMap::from([(deleted_at.name.clone(), now_value(&deleted_at.value)?)]);
            if unlink {
                let link = sub.resolve_field(field)?;
                values.insert(link.name.clone(), link.value.as_null());
            }
            let mut records = RecordSet::empty(sub.clone(), RecordKind::Named);
            records.add(Record::named(sub.clone(), values))?;
            nested(ctx, filed, &brick, operation::UPDATE_WHERE, records, None).1
        }
        None => {
            let records = RecordSet::empty(sub.clone(), RecordKind::Named);
            let (found, result) = nested(ctx, filed, &brick, operation::FIND, records, None);
            result?;
            if found.is_empty() {
                return Ok(());
            }
            nested(ctx, filed, &brick, operation::HARD_DELETE, found, None).1
        }
    }
}

fn delete_junction_rows(ctx: &mut Context<'_>, preload: &Preload) -> Result<()> {
    let relation = &preload.relation;
    let junction = relation.junction.as_ref().ok_or_else(|| {
        Error::msg(format!(
            "`{}.{}` has no junction",
            relation.owner.name(),
            relation.field
        ))
    })?;
    let keys = distinct(owner_keys(ctx, relation.owner_key_field()?));
    if keys.is_empty() {
        return Ok(());
    }
    let brick = ctx
        .brick()
        .junction_brick(&junction.model)
        .with_search(SearchList::from(Condition::is_in(
            junction.owner_column.clone(),
            keys,
        )));
    let records = RecordSet::empty(junction.model.clone(), RecordKind::Named);
    let shard = ctx.shard();
    nested(
        ctx,
        Filed::Junction(junction.model.name()),
        &brick,
        operation::HARD_DELETE_WHERE,
        records,
        shard,
    )
    .1
}
