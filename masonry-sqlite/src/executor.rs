use crate::extract::{bind_value, extract_value};
use masonry_core::{
    Error, ErrorContext, Executor, Query, Result, RowLabeled, RowNames, RowsAffected, Value,
    truncate_long,
};
use rusqlite::{Connection, OpenFlags, params_from_iter};
use std::sync::{Mutex, MutexGuard};
use url::form_urlencoded;

const PREFIX: &str = "sqlite://";
const MEMORY: &str = "sqlite::memory:";

/// Executor over one sqlite connection. Statements are serialized by a mutex.
pub struct SqliteExecutor {
    connection: Mutex<Connection>,
}

impl SqliteExecutor {
    /// Opens `sqlite::memory:` or `sqlite://path?mode=rwc`, where `mode` is one of `ro`, `rw`,
    /// `rwc` (the default) or `memory`.
    pub fn connect(url: &str) -> Result<Self> {
        if url == MEMORY {
            return Self::open_in_memory();
        }
        let Some(location) = url.strip_prefix(PREFIX) else {
            let error = Error::msg(format!(
                "Expected sqlite connection url to start with `{PREFIX}` or to be `{MEMORY}`"
            ));
            log::error!("{:#}", error);
            return Err(error);
        };
        let (path, query) = location.split_once('?').unwrap_or((location, ""));
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if key == "mode" && !matches!(value.as_ref(), "ro" | "rw" | "rwc" | "memory") {
                return Err(Error::msg(format!("Unknown sqlite open mode `{value}` in `{url}`")));
            }
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let uri = if query.is_empty() {
            format!("file:{path}")
        } else {
            format!("file:{path}?{query}")
        };
        let connection = Connection::open_with_flags(&uri, flags)
            .with_context(|| format!("Error while opening the sqlite database `{url}`"))?;
        log::debug!("Opened sqlite database `{}`", path);
        Ok(Self::new(connection))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    pub fn new(connection: Connection) -> Self {
        Self {
            connection: Mutex::new(connection),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn arguments(args: &[Value]) -> Result<Vec<rusqlite::types::Value>> {
    args.iter().map(bind_value).collect()
}

impl Executor for SqliteExecutor {
    fn exec(&self, query: &Query) -> Result<RowsAffected> {
        let context = || format!("While executing:\n{}", truncate_long!(query.sql));
        let connection = self.lock();
        let mut statement = connection.prepare_cached(&query.sql).with_context(context)?;
        let rows = statement
            .execute(params_from_iter(arguments(&query.args)?))
            .with_context(context)?;
        let inserted = query.sql.trim_start().starts_with("INSERT");
        Ok(RowsAffected {
            rows_affected: rows as u64,
            last_affected_id: inserted.then(|| connection.last_insert_rowid()),
        })
    }

    fn query(&self, query: &Query) -> Result<Vec<RowLabeled>> {
        let context = || format!("While querying:\n{}", truncate_long!(query.sql));
        let connection = self.lock();
        let mut statement = connection.prepare_cached(&query.sql).with_context(context)?;
        let labels: RowNames = statement
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let mut rows = statement
            .query(params_from_iter(arguments(&query.args)?))
            .with_context(context)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().with_context(context)? {
            let values = (0..labels.len())
                .map(|i| extract_value(row.get_ref(i)?))
                .collect::<Result<Box<[Value]>>>()?;
            result.push(RowLabeled::new(labels.clone(), values));
        }
        Ok(result)
    }
}
