//! Stages that carry an operation over the relations preloaded on the brick.
//!
//! Every relation runs through the full pipeline of its own brick, the nested outcomes are filed
//! under the relation field (or the junction table) of the owner outcome.

mod delete;
mod find;
mod table;
mod write;

pub(crate) use delete::*;
pub(crate) use find::*;
pub(crate) use table::*;
pub(crate) use write::*;

use crate::{
    Brick, Context, Error, InvalidRecordType, Key, MissingPrimaryKey, ModelField, Preload, Record,
    RecordSet, Relation, RelationKind, Result, Value, outcome::merge_nested, run_pipeline,
    stages::key_value,
};
use std::collections::{BTreeMap, HashSet};

/// Where a nested outcome is filed.
#[derive(Debug, Clone, Copy)]
enum Filed<'a> {
    Preload(&'a str),
    Junction(&'a str),
}

/// Runs `operation` on `brick` and files the outcome. The records come back on failure too.
fn nested(
    ctx: &mut Context<'_>,
    filed: Filed<'_>,
    brick: &Brick,
    operation: &str,
    records: RecordSet,
    shard: Option<usize>,
) -> (RecordSet, Result<()>) {
    let (outcome, result) = run_pipeline(brick, operation, records, shard);
    let records = outcome.records.clone();
    let (map, name) = match filed {
        Filed::Preload(field) => (&mut ctx.outcome_mut().preload, field),
        Filed::Junction(table) => (&mut ctx.outcome_mut().junction, table),
    };
    merge_nested(map, BTreeMap::from([(name.to_string(), outcome)]));
    let result = result.map_err(|error| {
        error.context(format!("{operation} on `{}` nested in `{name}`", brick.model().name()))
    });
    (records, result)
}

/// Related records moved out of the owners, `owners[i]` is the owner index of `records[i]`.
struct Taken {
    owners: Vec<usize>,
    records: Vec<Record>,
}

fn take_related(ctx: &mut Context<'_>, relation: &Relation) -> Result<Taken> {
    let mut taken = Taken {
        owners: Vec::new(),
        records: Vec::new(),
    };
    for (i, owner) in ctx.records_mut().iter_mut().enumerate() {
        for record in owner.take_related(&relation.field, &relation.sub)? {
            taken.owners.push(i);
            taken.records.push(record);
        }
    }
    Ok(taken)
}

/// Moves the related records back into their owners.
fn put_related(
    ctx: &mut Context<'_>,
    relation: &Relation,
    owners: &[usize],
    records: Vec<Record>,
) -> Result<()> {
    if owners.len() != records.len() {
        log::warn!(
            "`{}.{}`: {} related record(s) came back for {} owner slot(s)",
            relation.owner.name(),
            relation.field,
            records.len(),
            owners.len()
        );
    }
    let mut grouped: BTreeMap<usize, Vec<Record>> = BTreeMap::new();
    for (owner, record) in owners.iter().zip(records) {
        grouped.entry(*owner).or_default().push(record);
    }
    for (owner, records) in grouped {
        if let Some(owner) = ctx.records_mut().get_mut(owner) {
            owner.put_related(&relation.field, records)?;
        }
    }
    Ok(())
}

/// Batch of the taken records, they go back into the owners if they can't form one.
fn related_set(
    ctx: &mut Context<'_>,
    relation: &Relation,
    taken: Taken,
) -> Result<(Vec<usize>, RecordSet)> {
    let kind = taken.records.first().map(Record::kind).unwrap_or(ctx.records().kind());
    if let Some(other) = taken.records.iter().find(|r| r.kind() != kind) {
        let error = Error::new(InvalidRecordType(format!(
            "`{}.{}` mixes {:?} and {:?} records",
            relation.owner.name(),
            relation.field,
            kind,
            other.kind()
        )));
        put_related(ctx, relation, &taken.owners, taken.records)?;
        return Err(error);
    }
    Ok((
        taken.owners,
        RecordSet::with_records(relation.sub.clone(), kind, taken.records),
    ))
}

fn of_kind(brick: &Brick, kind: RelationKind) -> impl Iterator<Item = &Preload> {
    brick
        .preloads()
        .iter()
        .filter(move |p| p.relation.kind == kind)
}

/// Key of every owner, `None` where it's missing.
fn owner_keys(ctx: &Context<'_>, field: &ModelField) -> Vec<Option<Value>> {
    ctx.records().iter().map(|r| key_value(r, field)).collect()
}

/// Distinct non null keys, in first seen order.
fn distinct(keys: impl IntoIterator<Item = Option<Value>>) -> Vec<Value> {
    let mut seen = HashSet::new();
    keys.into_iter()
        .flatten()
        .filter(|v| v.key().is_some_and(|k| seen.insert(k)))
        .collect()
}

fn hash_key(value: Option<&Value>) -> Option<Key> {
    value.and_then(Value::key)
}

fn missing_key(model: &str, index: usize, reason: &'static str) -> Error {
    Error::new(MissingPrimaryKey {
        model: model.into(),
        index,
        reason,
    })
}
