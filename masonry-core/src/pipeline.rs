use crate::{
    Brick, ConfigError, Context, Error, Outcome, RecordSet, Result, stages, util::unpoison,
};
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock},
};

/// Named step of a pipeline.
#[derive(Clone, Copy)]
pub struct Stage {
    pub name: &'static str,
    pub run: fn(&mut Context<'_>) -> Result<()>,
}

impl Stage {
    pub const fn new(name: &'static str, run: fn(&mut Context<'_>) -> Result<()>) -> Self {
        Self { name, run }
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stage({})", self.name)
    }
}

/// Operation names understood by [`Pipelines::default`].
pub mod operation {
    pub const CREATE_TABLE: &str = "CreateTable";
    pub const CREATE_TABLE_IF_NOT_EXIST: &str = "CreateTableIfNotExist";
    pub const DROP_TABLE: &str = "DropTable";
    pub const DROP_TABLE_IF_EXIST: &str = "DropTableIfExist";
    pub const INSERT: &str = "Insert";
    pub const SAVE: &str = "Save";
    pub const UPDATE: &str = "Update";
    pub const FIND: &str = "Find";
    pub const HARD_DELETE: &str = "HardDelete";
    pub const SOFT_DELETE: &str = "SoftDelete";
    pub const HARD_DELETE_WHERE: &str = "HardDeleteWhere";
    pub const SOFT_DELETE_WHERE: &str = "SoftDeleteWhere";
    pub const UPDATE_WHERE: &str = "UpdateWhere";
}

/// Stage list of every operation.
pub struct Pipelines {
    map: RwLock<HashMap<String, Arc<[Stage]>>>,
}

impl Pipelines {
    pub fn get(&self, operation: &str) -> Option<Arc<[Stage]>> {
        unpoison(self.map.read()).get(operation).cloned()
    }

    /// Replaces (or adds) the stage list of `operation`.
    pub fn set(&self, operation: impl Into<String>, stages: impl Into<Arc<[Stage]>>) {
        let operation = operation.into();
        log::debug!("Pipeline `{}` replaced", operation);
        unpoison(self.map.write()).insert(operation, stages.into());
    }

    pub fn operations(&self) -> Vec<String> {
        let mut result: Vec<String> = unpoison(self.map.read()).keys().cloned().collect();
        result.sort();
        result
    }
}

impl Default for Pipelines {
    fn default() -> Self {
        use operation::*;
        let defaults: [(&str, Vec<Stage>); 13] = [
            (CREATE_TABLE, stages::create_table()),
            (CREATE_TABLE_IF_NOT_EXIST, stages::create_table()),
            (DROP_TABLE, stages::drop_table()),
            (DROP_TABLE_IF_EXIST, stages::drop_table()),
            (INSERT, stages::insert()),
            (SAVE, stages::save()),
            (UPDATE, stages::update()),
            (FIND, stages::find()),
            (HARD_DELETE, stages::hard_delete()),
            (SOFT_DELETE, stages::soft_delete()),
            (HARD_DELETE_WHERE, stages::hard_delete_where()),
            (SOFT_DELETE_WHERE, stages::soft_delete_where()),
            (UPDATE_WHERE, stages::update_where()),
        ];
        Self {
            map: RwLock::new(
                defaults
                    .into_iter()
                    .map(|(name, stages)| (name.to_string(), stages.into()))
                    .collect(),
            ),
        }
    }
}

impl fmt::Debug for Pipelines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(unpoison(self.map.read()).iter())
            .finish()
    }
}

/// Runs `operation` over `records`. The outcome comes back on failure too.
pub fn run_pipeline(
    brick: &Brick,
    operation: &str,
    records: RecordSet,
    shard: Option<usize>,
) -> (Outcome, Result<()>) {
    let Some(stages) = brick.database().pipelines().get(operation) else {
        let error = ConfigError::UnknownOperation {
            operation: operation.into(),
        };
        return (Outcome::new(operation, records), Err(Error::new(error)));
    };
    let mut context = Context::new(stages, brick, operation, records).with_shard(shard);
    let result = context.next();
    (context.into_outcome(), result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ContextState, Database, RecordKind,
        testing::{Recorder, Tag},
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    static REACHED: AtomicUsize = AtomicUsize::new(0);

    fn count(_: &mut Context<'_>) -> Result<()> {
        REACHED.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(ctx: &mut Context<'_>) -> Result<()> {
        ctx.abort();
        Ok(())
    }

    fn fail(_: &mut Context<'_>) -> Result<()> {
        Err(Error::msg("broken stage"))
    }

    fn database(operation: &str, stages: Vec<Stage>) -> Database {
        Database::builder()
            .executor(Recorder::new())
            .pipeline(operation, stages)
            .build()
            .unwrap()
    }

    #[test]
    fn abort_and_failure_stop_the_pipeline() {
        let db = database(
            "Stop",
            vec![Stage::new("stop", stop), Stage::new("count", count)],
        );
        db.pipelines().set(
            "Fail",
            vec![Stage::new("fail", fail), Stage::new("count", count)],
        );
        let brick = db.brick::<Tag>().unwrap();
        let records = || RecordSet::empty(brick.model().clone(), RecordKind::Named);

        let stages = db.pipelines().get("Stop").unwrap();
        let mut context = Context::new(stages, &brick, "Stop", records());
        context.next().unwrap();
        assert_eq!(context.state(), ContextState::Aborted);
        assert_eq!(context.remaining().collect::<Vec<_>>(), ["count"]);

        let stages = db.pipelines().get("Fail").unwrap();
        let mut context = Context::new(stages, &brick, "Fail", records());
        let error = context.next().unwrap_err();
        assert_eq!(context.state(), ContextState::Failed);
        assert!(format!("{error:#}").contains("Stage `fail` of Fail on `tag`: broken stage"));
        assert_eq!(REACHED.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn defaults_cover_every_operation() {
        let pipelines = Pipelines::default();
        assert_eq!(pipelines.operations().len(), 13);
        let find = pipelines.get(operation::FIND).unwrap();
        assert_eq!(
            find.iter().map(|s| s.name).collect::<Vec<_>>(),
            ["fan_out_shards", "find", "find_preloads"]
        );
        pipelines.set(operation::FIND, Vec::<Stage>::new());
        assert!(pipelines.get(operation::FIND).unwrap().is_empty());
        assert!(pipelines.get("Merge").is_none());
    }
}
