use crate::{Query, RecordSet, RowsAffected, truncate_long};
use std::{collections::BTreeMap, fmt::Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Exec,
    Query,
}

/// One statement sent to an executor.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    pub query: Query,
    pub shard: Option<usize>,
    pub affected: Option<RowsAffected>,
    /// Rows returned by a query.
    pub rows: usize,
    pub error: Option<String>,
}

/// Everything an operation did: final records, statements and the outcomes of nested relations.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub operation: String,
    pub records: RecordSet,
    pub actions: Vec<Action>,
    /// Record index to the indices of the actions that touched it.
    pub record_actions: BTreeMap<usize, Vec<usize>>,
    /// Nested outcome per relation field.
    pub preload: BTreeMap<String, Outcome>,
    /// Nested outcome per junction table.
    pub junction: BTreeMap<String, Outcome>,
}

impl Outcome {
    pub fn new(operation: impl Into<String>, records: RecordSet) -> Self {
        Self {
            operation: operation.into(),
            records,
            actions: Vec::new(),
            record_actions: BTreeMap::new(),
            preload: BTreeMap::new(),
            junction: BTreeMap::new(),
        }
    }

    /// Appends an action and returns its index.
    pub fn push_action(&mut self, action: Action, records: &[usize]) -> usize {
        let index = self.actions.len();
        self.actions.push(action);
        for record in records {
            self.record_actions.entry(*record).or_default().push(index);
        }
        index
    }

    /// Actions that touched the record at `index`.
    pub fn actions_of(&self, index: usize) -> impl Iterator<Item = &Action> {
        self.record_actions
            .get(&index)
            .into_iter()
            .flatten()
            .filter_map(|i| self.actions.get(*i))
    }

    /// SQL text of the actions at this level, in execution order.
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(|a| a.query.sql.as_str())
    }

    /// Every recorded error message, nested outcomes included.
    pub fn errors(&self) -> Vec<String> {
        let mut result: Vec<String> = self
            .actions
            .iter()
            .filter_map(|a| a.error.clone())
            .collect();
        for nested in self.preload.values().chain(self.junction.values()) {
            result.extend(nested.errors());
        }
        result
    }

    /// Total number of actions, nested outcomes included.
    pub fn total_actions(&self) -> usize {
        self.actions.len()
            + self
                .preload
                .values()
                .chain(self.junction.values())
                .map(Outcome::total_actions)
                .sum::<usize>()
    }

    /// Indented tree of the actions.
    pub fn report(&self) -> String {
        let mut out = String::new();
        self.write_report(&mut out, 0);
        out
    }

    fn write_report(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        let _ = writeln!(
            out,
            "{indent}{} `{}`, {} record(s)",
            self.operation,
            self.records.model().name(),
            self.records.len()
        );
        for (i, action) in self.actions.iter().enumerate() {
            let shard = action
                .shard
                .map(|s| format!(" @{s}"))
                .unwrap_or_default();
            let result = match (&action.error, action.kind, &action.affected) {
                (Some(error), ..) => format!("error: {error}"),
                (None, ActionKind::Query, _) => format!("{} row(s)", action.rows),
                (None, ActionKind::Exec, Some(affected)) => {
                    format!("{} affected", affected.rows_affected)
                }
                (None, ActionKind::Exec, None) => "done".into(),
            };
            let sql = action.query.sql.replace('\n', " ");
            let _ = writeln!(out, "{indent}  [{i}{shard}] {} -> {result}", truncate_long!(sql));
        }
        for (field, nested) in &self.preload {
            let _ = writeln!(out, "{indent}  {field}:");
            nested.write_report(out, depth + 2);
        }
        for (table, nested) in &self.junction {
            let _ = writeln!(out, "{indent}  junction {table}:");
            nested.write_report(out, depth + 2);
        }
    }

    /// Moves the actions of `other` in, `map` gives the index here of each record of `other`.
    pub(crate) fn absorb_actions(&mut self, other: &mut Outcome, map: impl Fn(usize) -> usize) {
        let base = self.actions.len();
        self.actions.append(&mut other.actions);
        for (record, actions) in std::mem::take(&mut other.record_actions) {
            self.record_actions
                .entry(map(record))
                .or_default()
                .extend(actions.into_iter().map(|i| i + base));
        }
    }

    /// Appends a nested outcome, records and actions included. Records of another shape are
    /// dropped, their actions are kept.
    pub(crate) fn merge(&mut self, mut other: Outcome) {
        let base = self.records.len();
        let count = other.records.len();
        self.absorb_actions(&mut other, |i| i + base);
        if let Err(error) = self.records.extend(other.records) {
            log::warn!("{error:#}, {count} record(s) left out of the {} outcome", self.operation);
        }
        merge_nested(&mut self.preload, other.preload);
        merge_nested(&mut self.junction, other.junction);
    }

    /// Merges the nested outcomes of a forked context.
    pub(crate) fn merge_children(&mut self, other: &mut Outcome) {
        merge_nested(&mut self.preload, std::mem::take(&mut other.preload));
        merge_nested(&mut self.junction, std::mem::take(&mut other.junction));
    }
}

pub(crate) fn merge_nested(into: &mut BTreeMap<String, Outcome>, from: BTreeMap<String, Outcome>) {
    for (name, outcome) in from {
        match into.get_mut(&name) {
            Some(existing) => existing.merge(outcome),
            None => {
                into.insert(name, outcome);
            }
        }
    }
}
