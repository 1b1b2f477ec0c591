use crate::{
    Action, ActionKind, Brick, Database, Error, Executor, Model, Outcome, Query, Record,
    RecordSet, Result, RowLabeled, RowsAffected, ShardErrors, Stage, truncate_long,
};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Running,
    Completed,
    Aborted,
    Failed,
}

/// Records given to a forked context.
#[derive(Debug)]
pub struct Fork {
    pub shard: usize,
    pub records: RecordSet,
    /// Position in the parent batch of each record, `None` appends them in fork order.
    pub indices: Option<Vec<usize>>,
}

/// Execution state of one operation over one batch of records.
pub struct Context<'b> {
    brick: &'b Brick,
    outcome: Outcome,
    stages: Arc<[Stage]>,
    cursor: usize,
    state: ContextState,
    shard: Option<usize>,
}

impl<'b> Context<'b> {
    pub fn new(
        stages: Arc<[Stage]>,
        brick: &'b Brick,
        operation: impl Into<String>,
        records: RecordSet,
    ) -> Self {
        Self {
            brick,
            outcome: Outcome::new(operation, records),
            stages,
            cursor: 0,
            state: ContextState::Running,
            shard: None,
        }
    }

    pub fn with_shard(mut self, shard: Option<usize>) -> Self {
        self.shard = shard;
        self
    }

    pub fn brick(&self) -> &'b Brick {
        self.brick
    }
    pub fn database(&self) -> &'b Database {
        self.brick.database()
    }
    pub fn model(&self) -> &Arc<Model> {
        self.outcome.records.model()
    }
    pub fn operation(&self) -> &str {
        &self.outcome.operation
    }
    pub fn state(&self) -> ContextState {
        self.state
    }
    /// Shard the statements go to, `None` until a fan out stage binds one.
    pub fn shard(&self) -> Option<usize> {
        self.shard
    }
    pub fn set_shard(&mut self, shard: usize) {
        self.shard = Some(shard);
    }
    pub fn records(&self) -> &RecordSet {
        &self.outcome.records
    }
    pub fn records_mut(&mut self) -> &mut RecordSet {
        &mut self.outcome.records
    }
    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }
    pub fn outcome_mut(&mut self) -> &mut Outcome {
        &mut self.outcome
    }
    pub fn into_outcome(self) -> Outcome {
        self.outcome
    }
    /// Names of the stages not run yet.
    pub fn remaining(&self) -> impl Iterator<Item = &'static str> {
        self.stages[self.cursor.min(self.stages.len())..]
            .iter()
            .map(|s| s.name)
    }

    /// Runs the stages from the cursor on, until the end, an abort or the first error.
    pub fn next(&mut self) -> Result<()> {
        while self.state == ContextState::Running && self.cursor < self.stages.len() {
            let stage = self.stages[self.cursor];
            self.cursor += 1;
            log::trace!(
                "{} `{}`: stage {}",
                self.operation(),
                self.model().name(),
                stage.name
            );
            if let Err(error) = (stage.run)(self) {
                self.state = ContextState::Failed;
                return Err(error.context(format!(
                    "Stage `{}` of {} on `{}`",
                    stage.name,
                    self.operation(),
                    self.model().name()
                )));
            }
        }
        if self.state == ContextState::Running {
            self.state = ContextState::Completed;
        }
        Ok(())
    }

    /// Stops the context without error, later stages don't run.
    pub fn abort(&mut self) {
        log::trace!(
            "{} `{}` aborted before {:?}",
            self.operation(),
            self.model().name(),
            self.remaining().collect::<Vec<_>>()
        );
        self.state = ContextState::Aborted;
    }

    /// Child context bound to `shard` that will run the stages this one didn't run yet.
    pub fn fork(&self, records: RecordSet, shard: usize) -> Context<'b> {
        let start = self.cursor.min(self.stages.len());
        Context {
            brick: self.brick,
            outcome: Outcome::new(self.outcome.operation.clone(), records),
            stages: self.stages[start..].into(),
            cursor: 0,
            state: ContextState::Running,
            shard: Some(shard),
        }
    }

    /// Runs one forked child per entry, one after another, then takes their records and actions
    /// back. Every child runs even when a sibling fails, the failures come back as
    /// [`ShardErrors`]. The remaining stages of this context are consumed by the children.
    pub fn fan_out(&mut self, forks: Vec<Fork>) -> Result<()> {
        let mut children = Vec::with_capacity(forks.len());
        for fork in forks {
            let mut child = self.fork(fork.records, fork.shard);
            let result = child.next();
            children.push((fork.shard, fork.indices, child.into_outcome(), result));
        }
        self.cursor = self.stages.len();
        let total = children
            .iter()
            .map(|(_, _, outcome, _)| outcome.records.len())
            .sum::<usize>();
        let mut slots: Vec<Option<Record>> = Vec::with_capacity(total);
        slots.resize_with(total, || None);
        let mut appended = 0;
        let mut errors = Vec::new();
        for (shard, indices, mut outcome, result) in children {
            let records = outcome.records.take_records();
            let indices = indices.unwrap_or_else(|| {
                let range = (appended..appended + records.len()).collect();
                appended += records.len();
                range
            });
            self.outcome
                .absorb_actions(&mut outcome, |i| indices.get(i).copied().unwrap_or(i));
            for (record, index) in records.into_iter().zip(&indices) {
                if let Some(slot) = slots.get_mut(*index) {
                    *slot = Some(record);
                }
            }
            self.outcome.merge_children(&mut outcome);
            if let Err(error) = result {
                errors.push((shard, error));
            }
        }
        let mut records = self.outcome.records.take_records();
        records.extend(slots.into_iter().flatten());
        self.outcome.records.put_records(records);
        if !errors.is_empty() {
            return Err(Error::new(ShardErrors { errors }));
        }
        Ok(())
    }

    fn executor(&self) -> Result<&'b dyn Executor> {
        self.database().executor(self.shard.unwrap_or(0))
    }

    fn log_statement(&self, query: &Query) {
        if self.brick.is_debug() {
            log::info!("{}", query.sql);
        } else {
            log::debug!("{}", query.sql);
        }
    }

    /// Executes a statement on the bound shard and logs it against `records`.
    pub fn exec(&mut self, query: Query, records: &[usize]) -> Result<RowsAffected> {
        self.log_statement(&query);
        let result = self.executor().and_then(|e| e.exec(&query));
        let mut action = Action {
            kind: ActionKind::Exec,
            query,
            shard: self.shard,
            affected: None,
            rows: 0,
            error: None,
        };
        match result {
            Ok(affected) => {
                action.affected = Some(affected);
                self.outcome.push_action(action, records);
                Ok(affected)
            }
            Err(error) => {
                log::error!("{:#}\n{}", error, truncate_long!(action.query.sql));
                action.error = Some(format!("{error:#}"));
                self.outcome.push_action(action, records);
                Err(error)
            }
        }
    }

    /// Runs a query on the bound shard and logs it against `records`.
    pub fn query(&mut self, query: Query, records: &[usize]) -> Result<Vec<RowLabeled>> {
        self.log_statement(&query);
        let result = self.executor().and_then(|e| e.query(&query));
        let mut action = Action {
            kind: ActionKind::Query,
            query,
            shard: self.shard,
            affected: None,
            rows: 0,
            error: None,
        };
        match result {
            Ok(rows) => {
                action.rows = rows.len();
                self.outcome.push_action(action, records);
                Ok(rows)
            }
            Err(error) => {
                log::error!("{:#}\n{}", error, truncate_long!(action.query.sql));
                action.error = Some(format!("{error:#}"));
                self.outcome.push_action(action, records);
                Err(error)
            }
        }
    }
}
