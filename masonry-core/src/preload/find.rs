use super::{Filed, distinct, hash_key, nested, owner_keys};
use crate::{
    Brick, Condition, Context, Error, Key, Preload, Record, RecordKind, RecordSet, RelationKind,
    Result, SearchList, Value, operation, stages::key_value,
};
use std::collections::{HashMap, HashSet};

/// Loads every preloaded relation of the records found so far.
pub(crate) fn find_preloads(ctx: &mut Context<'_>) -> Result<()> {
    for preload in ctx.brick().preloads() {
        if ctx.records().is_empty() {
            break;
        }
        match preload.relation.kind {
            RelationKind::BelongsTo => find_belongs_to(ctx, preload)?,
            RelationKind::OneToOne | RelationKind::OneToMany => find_children(ctx, preload)?,
            RelationKind::ManyToMany => find_many_to_many(ctx, preload)?,
        }
    }
    Ok(())
}

/// Brick of the preload narrowed to the rows whose `field` is one of `keys`.
fn narrowed(preload: &Preload, field: &str, keys: Vec<Value>) -> Brick {
    preload.brick.with_search(
        SearchList::from(Condition::is_in(field, keys)).and_group(preload.brick.search().clone()),
    )
}

/// Finds the related rows whose `field` is one of `keys`.
fn find_related(
    ctx: &mut Context<'_>,
    preload: &Preload,
    field: &str,
    keys: Vec<Value>,
) -> Result<Vec<Record>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let relation = &preload.relation;
    let brick = narrowed(preload, field, keys);
    let records = RecordSet::empty(relation.sub.clone(), ctx.records().kind());
    let (records, result) = nested(
        ctx,
        Filed::Preload(&relation.field),
        &brick,
        operation::FIND,
        records,
        None,
    );
    result?;
    Ok(records.into_records())
}

fn put_found(ctx: &mut Context<'_>, preload: &Preload, found: Vec<Vec<Record>>) -> Result<()> {
    let relation = &preload.relation;
    for (i, mut records) in found.into_iter().enumerate() {
        if !relation.collection && records.len() > 1 {
            log::warn!(
                "`{}.{}` holds one record, {} were found for record {}",
                relation.owner.name(),
                relation.field,
                records.len(),
                i
            );
            records.truncate(1);
        }
        if let Some(owner) = ctx.records_mut().get_mut(i) {
            owner.put_related(&relation.field, records)?;
        }
    }
    Ok(())
}

fn find_belongs_to(ctx: &mut Context<'_>, preload: &Preload) -> Result<()> {
    let relation = &preload.relation;
    let sub_key = relation.sub_key_field()?;
    let keys = owner_keys(ctx, relation.owner_key_field()?);
    let subs = find_related(ctx, preload, &sub_key.name, distinct(keys.iter().cloned()))?;
    let by_key: HashMap<Key, Record> = subs
        .into_iter()
        .filter_map(|sub| Some((hash_key(key_value(&sub, sub_key).as_ref())?, sub)))
        .collect();
    let found = keys
        .iter()
        .map(|key| {
            hash_key(key.as_ref())
                .and_then(|key| by_key.get(&key))
                .cloned()
                .into_iter()
                .collect()
        })
        .collect();
    put_found(ctx, preload, found)
}

fn find_children(ctx: &mut Context<'_>, preload: &Preload) -> Result<()> {
    let relation = &preload.relation;
    let link = relation.sub_key_field()?;
    let keys = owner_keys(ctx, relation.owner_key_field()?);
    let subs = find_related(ctx, preload, &link.name, distinct(keys.iter().cloned()))?;
    let mut by_owner: HashMap<Key, Vec<Record>> = HashMap::new();
    for sub in subs {
        if let Some(key) = hash_key(key_value(&sub, link).as_ref()) {
            by_owner.entry(key).or_default().push(sub);
        }
    }
    let found = keys
        .iter()
        .map(|key| {
            hash_key(key.as_ref())
                .and_then(|key| by_owner.get(&key))
                .cloned()
                .unwrap_or_default()
        })
        .collect();
    put_found(ctx, preload, found)
}

/// Reads the junction rows of the owners, then the related rows they point to.
fn find_many_to_many(ctx: &mut Context<'_>, preload: &Preload) -> Result<()> {
    let relation = &preload.relation;
    let junction = relation.junction.as_ref().ok_or_else(|| {
        Error::msg(format!(
            "`{}.{}` has no junction",
            relation.owner.name(),
            relation.field
        ))
    })?;
    let sub_key = relation.sub_key_field()?;
    let keys = owner_keys(ctx, relation.owner_key_field()?);
    let distinct_keys = distinct(keys.iter().cloned());
    let mut pairs: Vec<(Key, Value)> = Vec::new();
    if !distinct_keys.is_empty() {
        let brick = ctx.brick().junction_brick(&junction.model).with_search(SearchList::from(
            Condition::is_in(junction.owner_column.clone(), distinct_keys),
        ));
        let records = RecordSet::empty(junction.model.clone(), RecordKind::Named);
        let shard = ctx.shard();
        let (rows, result) = nested(
            ctx,
            Filed::Junction(junction.model.name()),
            &brick,
            operation::FIND,
            records,
            shard,
        );
        result?;
        for row in rows.iter() {
            let owner = hash_key(row.field(&junction.owner_column).as_ref());
            let sub = row.field(&junction.sub_column).filter(|v| !v.is_null());
            if let (Some(owner), Some(sub)) = (owner, sub) {
                pairs.push((owner, sub));
            }
        }
    }
    let subs = find_related(
        ctx,
        preload,
        &sub_key.name,
        distinct(pairs.iter().map(|(_, sub)| Some(sub.clone()))),
    )?;
    let by_key: HashMap<Key, Record> = subs
        .into_iter()
        .filter_map(|sub| Some((hash_key(key_value(&sub, sub_key).as_ref())?, sub)))
        .collect();
    let found = keys
        .iter()
        .map(|key| {
            let Some(key) = hash_key(key.as_ref()) else {
                return Vec::new();
            };
            let mut seen = HashSet::new();
            pairs
                .iter()
                .filter(|(owner, _)| *owner == key)
                .filter_map(|(_, sub)| sub.key())
                .filter(|sub| seen.insert(sub.clone()))
                .filter_map(|sub| by_key.get(&sub).cloned())
                .collect()
        })
        .collect();
    put_found(ctx, preload, found)
}
