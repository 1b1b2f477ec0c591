use crate::{Context, Error, Fork, MissingPrimaryKey, Record, RecordSet, Result};
use std::collections::BTreeMap;

/// Stops a write over an empty batch.
pub(crate) fn skip_empty(ctx: &mut Context<'_>) -> Result<()> {
    if ctx.records().is_empty() {
        ctx.abort();
    }
    Ok(())
}

/// Fills the missing primary keys from the id generator of the model, if one is configured.
pub(crate) fn assign_ids(ctx: &mut Context<'_>) -> Result<()> {
    let Some(generator) = ctx.database().id_generator(ctx.model().name()) else {
        return Ok(());
    };
    let model = ctx.model().clone();
    let pk = model.single_primary_key()?;
    for record in ctx.records_mut().iter_mut() {
        if record.field(&pk.name).is_none_or(|v| v.is_zero()) {
            record.set_field(&pk.name, generator.next_id(&model)?)?;
        }
    }
    Ok(())
}

/// Binds the shard when there is nothing to choose from. Returns true if the context is bound.
fn bind_shard(ctx: &mut Context<'_>) -> bool {
    if let Some(shard) = ctx.brick().pinned_shard() {
        ctx.set_shard(shard);
        return true;
    }
    if ctx.shard().is_some() {
        return true;
    }
    if ctx.database().shards() <= 1 {
        ctx.set_shard(0);
        return true;
    }
    false
}

/// Runs the rest of the pipeline once per shard, each run gets a copy of the records.
pub(crate) fn fan_out_shards(ctx: &mut Context<'_>) -> Result<()> {
    if bind_shard(ctx) {
        return Ok(());
    }
    let model = ctx.model().clone();
    let kind = ctx.records().kind();
    let records = ctx.records_mut().take_records();
    let indices: Vec<usize> = (0..records.len()).collect();
    let forks = (0..ctx.database().shards())
        .map(|shard| Fork {
            shard,
            records: RecordSet::with_records(model.clone(), kind, records.clone()),
            indices: if records.is_empty() {
                None
            } else {
                Some(indices.clone())
            },
        })
        .collect();
    ctx.fan_out(forks)
}

/// Partitions the records by the shard their primary key routes to, then runs the rest of the
/// pipeline once per partition.
pub(crate) fn fan_out_records(ctx: &mut Context<'_>) -> Result<()> {
    if bind_shard(ctx) {
        return Ok(());
    }
    let database = ctx.database();
    let model = ctx.model().clone();
    let pk = model.single_primary_key()?;
    let mut partitions: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, record) in ctx.records().iter().enumerate() {
        let key = super::key_value(record, pk).ok_or_else(|| {
            Error::new(MissingPrimaryKey {
                model: model.name().into(),
                index: i,
                reason: "needed to select a shard",
            })
        })?;
        partitions
            .entry(database.select_shard(&key)?)
            .or_default()
            .push(i);
    }
    if partitions.len() == 1 {
        if let Some(shard) = partitions.keys().next() {
            ctx.set_shard(*shard);
        }
        return Ok(());
    }
    log::trace!(
        "{} `{}` over {} shard(s)",
        ctx.operation(),
        model.name(),
        partitions.len()
    );
    let kind = ctx.records().kind();
    let mut slots: Vec<Option<Record>> = ctx
        .records_mut()
        .take_records()
        .into_iter()
        .map(Some)
        .collect();
    let forks = partitions
        .into_iter()
        .map(|(shard, indices)| {
            let records = indices.iter().filter_map(|i| slots[*i].take()).collect();
            Fork {
                shard,
                records: RecordSet::with_records(model.clone(), kind, records),
                indices: Some(indices),
            }
        })
        .collect();
    ctx.fan_out(forks)
}
