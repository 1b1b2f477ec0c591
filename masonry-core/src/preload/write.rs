use super::{Filed, missing_key, nested, of_kind, put_related, related_set, take_related};
use crate::{
    Context, Error, Key, Preload, Record, RecordSet, RelationKind, Result, Value, operation,
    stages::key_value,
};
use std::collections::{BTreeMap, HashSet};

/// Writes the records the owners point to, then copies their keys into the owner links.
pub(crate) fn write_belongs_to(ctx: &mut Context<'_>) -> Result<()> {
    let parent_operation = ctx.operation().to_string();
    for preload in of_kind(ctx.brick(), RelationKind::BelongsTo) {
        let relation = &preload.relation;
        let taken = take_related(ctx, relation)?;
        if taken.records.is_empty() {
            continue;
        }
        let (owners, set) = related_set(ctx, relation, taken)?;
        let (records, result) = nested(
            ctx,
            Filed::Preload(&relation.field),
            &preload.brick,
            &parent_operation,
            set,
            None,
        );
        let records = records.into_records();
        let linked = match &result {
            Ok(()) => link_owners(ctx, preload, &owners, &records),
            Err(..) => Ok(()),
        };
        put_related(ctx, relation, &owners, records)?;
        result?;
        linked?;
    }
    Ok(())
}

fn link_owners(
    ctx: &mut Context<'_>,
    preload: &Preload,
    owners: &[usize],
    subs: &[Record],
) -> Result<()> {
    let relation = &preload.relation;
    let sub_key = relation.sub_key_field()?;
    for (position, (owner, sub)) in owners.iter().zip(subs).enumerate() {
        let key = key_value(sub, sub_key).ok_or_else(|| {
            missing_key(relation.sub.name(), position, "needed to link its owner")
        })?;
        if let Some(owner) = ctx.records_mut().get_mut(*owner) {
            owner.set_field(&relation.owner_key, key)?;
        }
    }
    Ok(())
}

/// Links the children to their owners, then writes them.
pub(crate) fn write_children(ctx: &mut Context<'_>) -> Result<()> {
    let parent_operation = ctx.operation().to_string();
    for preload in ctx.brick().preloads().iter().filter(|p| p.relation.is_child()) {
        let relation = &preload.relation;
        let mut taken = take_related(ctx, relation)?;
        if taken.records.is_empty() {
            continue;
        }
        let owner_key = relation.owner_key_field()?;
        let mut failure = None;
        for (owner, sub) in taken.owners.iter().zip(taken.records.iter_mut()) {
            let key = ctx.records().get(*owner).and_then(|r| key_value(r, owner_key));
            let linked = match key {
                Some(key) => sub.set_field(&relation.sub_key, key),
                None => Err(missing_key(
                    relation.owner.name(),
                    *owner,
                    "needed to link its children",
                )),
            };
            if let Err(error) = linked {
                failure = Some(error);
                break;
            }
        }
        if let Some(error) = failure {
            put_related(ctx, relation, &taken.owners, taken.records)?;
            return Err(error);
        }
        let (owners, set) = related_set(ctx, relation, taken)?;
        let (records, result) = nested(
            ctx,
            Filed::Preload(&relation.field),
            &preload.brick,
            &parent_operation,
            set,
            None,
        );
        put_related(ctx, relation, &owners, records.into_records())?;
        result?;
    }
    Ok(())
}

/// Writes the related records, then one junction row per owner and related pair. Junction rows
/// are always saved, a pair already linked is left as it is.
pub(crate) fn write_many_to_many(ctx: &mut Context<'_>) -> Result<()> {
    let parent_operation = ctx.operation().to_string();
    for preload in of_kind(ctx.brick(), RelationKind::ManyToMany) {
        let relation = &preload.relation;
        let junction = relation.junction.as_ref().ok_or_else(|| {
            Error::msg(format!(
                "`{}.{}` has no junction",
                relation.owner.name(),
                relation.field
            ))
        })?;
        let taken = take_related(ctx, relation)?;
        if taken.records.is_empty() {
            continue;
        }
        let (owners, set) = related_set(ctx, relation, taken)?;
        let (records, result) = nested(
            ctx,
            Filed::Preload(&relation.field),
            &preload.brick,
            &parent_operation,
            set,
            None,
        );
        let records = records.into_records();
        if let Err(error) = result {
            put_related(ctx, relation, &owners, records)?;
            return Err(error);
        }
        let rows = junction_rows(ctx, preload, &owners, &records);
        put_related(ctx, relation, &owners, records)?;
        let rows = rows?;
        let brick = ctx.brick().junction_brick(&junction.model);
        let set = RecordSet::from_named(junction.model.clone(), rows);
        let shard = ctx.shard();
        nested(
            ctx,
            Filed::Junction(junction.model.name()),
            &brick,
            operation::SAVE,
            set,
            shard,
        )
        .1?;
    }
    Ok(())
}

/// One junction row per distinct owner and related pair.
fn junction_rows(
    ctx: &Context<'_>,
    preload: &Preload,
    owners: &[usize],
    subs: &[Record],
) -> Result<Vec<BTreeMap<String, Value>>> {
    let relation = &preload.relation;
    let owner_key = relation.owner_key_field()?;
    let sub_key = relation.sub_key_field()?;
    let Some(junction) = &relation.junction else {
        return Ok(Vec::new());
    };
    let mut seen: HashSet<(Key, Key)> = HashSet::new();
    let mut rows = Vec::new();
    for (position, (owner, sub)) in owners.iter().zip(subs).enumerate() {
        let owner_value = ctx
            .records()
            .get(*owner)
            .and_then(|r| key_value(r, owner_key))
            .ok_or_else(|| {
                missing_key(relation.owner.name(), *owner, "needed to fill the junction")
            })?;
        let sub_value = key_value(sub, sub_key).ok_or_else(|| {
            missing_key(relation.sub.name(), position, "needed to fill the junction")
        })?;
        if let (Some(a), Some(b)) = (owner_value.key(), sub_value.key()) {
            if !seen.insert((a, b)) {
                continue;
            }
        }
        rows.push(BTreeMap::from([
            (junction.owner_column.clone(), owner_value),
            (junction.sub_column.clone(), sub_value),
        ]));
    }
    Ok(rows)
}
