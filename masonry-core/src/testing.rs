use crate::{
    Database, Entity, Error, Executor, ModelBuilder, Query, Result, RowLabeled, RowsAffected,
    Value, util::unpoison,
};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};
use time::PrimitiveDateTime;

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Account {
    pub id: i64,
    pub email: String,
    pub nickname: Option<String>,
    pub deleted_at: Option<PrimitiveDateTime>,
}

impl Entity for Account {
    fn describe(model: &mut ModelBuilder<Self>) {
        model
            .column("id", |v| &v.id, |v| &mut v.id)
            .primary_key()
            .auto_increment();
        model.column("email", |v| &v.email, |v| &mut v.email);
        model
            .column("nickname", |v| &v.nickname, |v| &mut v.nickname)
            .index();
        model
            .column("deleted_at", |v| &v.deleted_at, |v| &mut v.deleted_at)
            .deleted_at();
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Author {
    pub id: i64,
    pub name: String,
    pub books: Vec<Book>,
    pub profile: Option<Profile>,
    pub tags: Vec<Tag>,
    pub notes: Vec<Note>,
}

impl Entity for Author {
    fn describe(model: &mut ModelBuilder<Self>) {
        model
            .column("id", |v| &v.id, |v| &mut v.id)
            .primary_key()
            .auto_increment();
        model.column("name", |v| &v.name, |v| &mut v.name);
        model.related("books", |v| &mut v.books);
        model.related("profile", |v| &mut v.profile);
        model.related("tags", |v| &mut v.tags).many_to_many();
        model
            .related("notes", |v| &mut v.notes)
            .one_to_many("author_id");
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Book {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    pub publisher_id: Option<i64>,
    pub publisher: Option<Publisher>,
}

impl Entity for Book {
    fn describe(model: &mut ModelBuilder<Self>) {
        model
            .column("id", |v| &v.id, |v| &mut v.id)
            .primary_key()
            .auto_increment();
        model.column("author_id", |v| &v.author_id, |v| &mut v.author_id);
        model.column("title", |v| &v.title, |v| &mut v.title);
        model.column("publisher_id", |v| &v.publisher_id, |v| &mut v.publisher_id);
        model.related("publisher", |v| &mut v.publisher);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Publisher {
    pub id: i64,
    pub name: String,
}

impl Entity for Publisher {
    fn describe(model: &mut ModelBuilder<Self>) {
        model
            .column("id", |v| &v.id, |v| &mut v.id)
            .primary_key()
            .auto_increment();
        model.column("name", |v| &v.name, |v| &mut v.name);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Profile {
    pub id: i64,
    pub author_id: i64,
    pub bio: String,
}

impl Entity for Profile {
    fn describe(model: &mut ModelBuilder<Self>) {
        model
            .column("id", |v| &v.id, |v| &mut v.id)
            .primary_key()
            .auto_increment();
        model.column("author_id", |v| &v.author_id, |v| &mut v.author_id);
        model.column("bio", |v| &v.bio, |v| &mut v.bio);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Tag {
    pub id: i64,
    pub label: String,
}

impl Entity for Tag {
    fn describe(model: &mut ModelBuilder<Self>) {
        model
            .column("id", |v| &v.id, |v| &mut v.id)
            .primary_key()
            .auto_increment();
        model.column("label", |v| &v.label, |v| &mut v.label);
    }
}

/// Soft deletable child of [`Author`], stamped with its write times.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Note {
    pub id: i64,
    pub author_id: Option<i64>,
    pub body: String,
    pub created_at: Option<PrimitiveDateTime>,
    pub updated_at: Option<PrimitiveDateTime>,
    pub deleted_at: Option<PrimitiveDateTime>,
}

impl Entity for Note {
    fn describe(model: &mut ModelBuilder<Self>) {
        model
            .column("id", |v| &v.id, |v| &mut v.id)
            .primary_key()
            .auto_increment();
        model.column("author_id", |v| &v.author_id, |v| &mut v.author_id);
        model.column("body", |v| &v.body, |v| &mut v.body);
        model
            .column("created_at", |v| &v.created_at, |v| &mut v.created_at)
            .created_at();
        model
            .column("updated_at", |v| &v.updated_at, |v| &mut v.updated_at)
            .updated_at();
        model
            .column("deleted_at", |v| &v.deleted_at, |v| &mut v.deleted_at)
            .deleted_at();
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Person {
    pub id: i64,
    pub friends: Vec<Person>,
}

impl Entity for Person {
    fn describe(model: &mut ModelBuilder<Self>) {
        model
            .column("id", |v| &v.id, |v| &mut v.id)
            .primary_key()
            .auto_increment();
        model.related("friends", |v| &mut v.friends);
    }
}

#[derive(Default)]
struct Script {
    log: Vec<Query>,
    /// Rows returned by the first query containing the pattern, used once.
    responses: VecDeque<(String, Vec<RowLabeled>)>,
    /// Statements containing one of these fail.
    failures: Vec<String>,
    next_id: i64,
}

/// Executor that logs every statement and answers from a script.
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    script: Arc<Mutex<Script>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, pattern: &str, rows: Vec<RowLabeled>) -> &Self {
        unpoison(self.script.lock())
            .responses
            .push_back((pattern.into(), rows));
        self
    }

    pub fn fail_on(&self, pattern: &str) -> &Self {
        unpoison(self.script.lock()).failures.push(pattern.into());
        self
    }

    pub fn queries(&self) -> Vec<Query> {
        unpoison(self.script.lock()).log.clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.queries().into_iter().map(|q| q.sql).collect()
    }

    fn record(&self, query: &Query) -> Result<()> {
        let mut script = unpoison(self.script.lock());
        script.log.push(query.clone());
        if script.failures.iter().any(|p| query.sql.contains(p.as_str())) {
            return Err(Error::msg(format!("scripted failure: {}", query.sql)));
        }
        Ok(())
    }
}

impl Executor for Recorder {
    fn exec(&self, query: &Query) -> Result<RowsAffected> {
        self.record(query)?;
        let mut script = unpoison(self.script.lock());
        let mut affected = RowsAffected {
            rows_affected: 1,
            last_affected_id: None,
        };
        if query.sql.starts_with("INSERT") {
            script.next_id += 1;
            affected.last_affected_id = Some(script.next_id);
        }
        Ok(affected)
    }

    fn query(&self, query: &Query) -> Result<Vec<RowLabeled>> {
        self.record(query)?;
        let mut script = unpoison(self.script.lock());
        let position = script
            .responses
            .iter()
            .position(|(pattern, _)| query.sql.contains(pattern.as_str()));
        Ok(position
            .and_then(|i| script.responses.remove(i))
            .map(|(_, rows)| rows)
            .unwrap_or_default())
    }
}

/// Rows sharing the same labels.
pub(crate) fn rows(labels: &[&str], values: Vec<Vec<Value>>) -> Vec<RowLabeled> {
    let labels: Arc<[String]> = labels.iter().map(|v| v.to_string()).collect();
    values
        .into_iter()
        .map(|values| RowLabeled::new(labels.clone(), values.into()))
        .collect()
}

pub(crate) fn int(value: i64) -> Value {
    Value::Int64(Some(value))
}

pub(crate) fn text(value: &str) -> Value {
    Value::Varchar(Some(value.into()))
}

/// Database over `shards` recorders, default dialect.
pub(crate) fn database(shards: usize) -> (Database, Vec<Recorder>) {
    let recorders: Vec<Recorder> = (0..shards).map(|_| Recorder::new()).collect();
    let mut builder = Database::builder();
    for recorder in &recorders {
        builder = builder.shard(recorder.clone());
    }
    let database = builder.build().expect("database with recorders");
    (database, recorders)
}
