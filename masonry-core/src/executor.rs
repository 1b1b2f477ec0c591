use crate::{Query, Result, Value};
use std::sync::Arc;

/// Summary of a statement that modifies rows.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowsAffected {
    /// Total number of rows impacted.
    pub rows_affected: u64,
    /// Backend-specific last inserted identifier when available.
    pub last_affected_id: Option<i64>,
}

impl Extend<RowsAffected> for RowsAffected {
    fn extend<T: IntoIterator<Item = RowsAffected>>(&mut self, iter: T) {
        for elem in iter {
            self.rows_affected += elem.rows_affected;
            if elem.last_affected_id.is_some() {
                self.last_affected_id = elem.last_affected_id;
            }
        }
    }
}

/// Shared reference-counted column name list.
pub type RowNames = Arc<[String]>;

/// Row with its column names.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct RowLabeled {
    /// Column names.
    pub labels: RowNames,
    /// Data values, aligned by index with `labels`.
    pub values: Box<[Value]>,
}

impl RowLabeled {
    pub fn new(labels: RowNames, values: Box<[Value]>) -> Self {
        Self { labels, values }
    }
    pub fn names(&self) -> &[String] {
        &self.labels
    }
    pub fn get_column(&self, name: &str) -> Option<&Value> {
        self.labels
            .iter()
            .position(|v| v == name)
            .map(|i| &self.values[i])
    }
}

/// Transport of statements to one database.
pub trait Executor: Send + Sync {
    /// Execute the statement and return the total number of rows affected.
    fn exec(&self, query: &Query) -> Result<RowsAffected>;

    /// Execute the query and return the rows.
    fn query(&self, query: &Query) -> Result<Vec<RowLabeled>>;

    /// First row of the query, if any.
    fn query_row(&self, query: &Query) -> Result<Option<RowLabeled>> {
        Ok(self.query(query)?.into_iter().next())
    }
}
