use crate::{
    ConfigError, Condition, Database, Entity, Error, InvalidRecordType, Model, OperationError,
    Order, Ordered, Orientation, Outcome, Record, RecordKind, RecordSet, Relation, RelationKind,
    RelationSpec, Result, SearchList, Value, compile, operation, run_pipeline,
};
use std::{collections::BTreeMap, fmt, mem, sync::Arc};

/// Which field values the write path leaves out of its statements.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreMode {
    /// Every field is written.
    #[default]
    Nothing,
    /// Zero values (null, `0`, `""`, `false`) are skipped.
    Zero,
    /// Only null values are skipped.
    Null,
}

/// Relation loaded and written together with the owner, through the sub brick.
#[derive(Debug, Clone)]
pub struct Preload {
    pub relation: Arc<Relation>,
    pub brick: Brick,
}

/// Immutable query builder over one model. Every modifier returns a new brick, the receiver is
/// left untouched.
#[derive(Clone)]
pub struct Brick {
    database: Database,
    model: Arc<Model>,
    search: SearchList,
    order_by: Vec<Ordered>,
    limit: Option<u64>,
    offset: Option<u64>,
    bound: Option<Arc<[String]>>,
    ignore_mode: Option<IgnoreMode>,
    unscoped: bool,
    shard: Option<usize>,
    debug: bool,
    preloads: Vec<Preload>,
}

impl Brick {
    pub fn new(database: Database, model: Arc<Model>) -> Self {
        Self {
            database,
            model,
            search: SearchList::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            bound: None,
            ignore_mode: None,
            unscoped: false,
            shard: None,
            debug: false,
            preloads: Vec::new(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }
    pub fn search(&self) -> &SearchList {
        &self.search
    }
    pub fn ordering(&self) -> &[Ordered] {
        &self.order_by
    }
    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }
    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }
    /// Fields the write and read paths are restricted to, all of them when `None`.
    pub fn bound_fields(&self) -> Option<&[String]> {
        self.bound.as_deref()
    }
    pub fn is_unscoped(&self) -> bool {
        self.unscoped
    }
    pub fn is_debug(&self) -> bool {
        self.debug
    }
    pub fn pinned_shard(&self) -> Option<usize> {
        self.shard
    }
    pub fn preloads(&self) -> &[Preload] {
        &self.preloads
    }

    /// Ignore mode in effect for `operation`, an update skips zero values unless told otherwise.
    pub fn ignore_mode_for(&self, operation: &str) -> IgnoreMode {
        self.ignore_mode.unwrap_or(if operation == operation::UPDATE {
            IgnoreMode::Zero
        } else {
            IgnoreMode::Nothing
        })
    }

    fn check_fields<'s>(&self, fields: impl IntoIterator<Item = &'s str>) -> Result<()> {
        for name in fields {
            let field = self.model.resolve_field(name).or_else(|error| {
                self.model
                    .field_by_column(name)
                    .map(|(_, f)| f)
                    .ok_or(error)
            })?;
            if field.ignore {
                return Err(Error::new(ConfigError::InvalidCondition {
                    field: name.into(),
                    reason: "the field is not stored".into(),
                }));
            }
        }
        Ok(())
    }

    /// Conjunction of the current filter with `condition`.
    pub fn filter(&self, condition: Condition) -> Result<Brick> {
        self.check_fields([condition.field.as_str()])?;
        Ok(self.with_search(self.search.clone().and(condition)))
    }
    pub fn and(&self, condition: Condition) -> Result<Brick> {
        self.filter(condition)
    }
    pub fn or(&self, condition: Condition) -> Result<Brick> {
        self.check_fields([condition.field.as_str()])?;
        Ok(self.with_search(self.search.clone().or(condition)))
    }
    pub fn and_group(&self, group: SearchList) -> Result<Brick> {
        self.check_fields(group.fields())?;
        Ok(self.with_search(self.search.clone().and_group(group)))
    }
    pub fn or_group(&self, group: SearchList) -> Result<Brick> {
        self.check_fields(group.fields())?;
        Ok(self.with_search(self.search.clone().or_group(group)))
    }
    /// Negates the filter composed so far.
    pub fn not(&self) -> Brick {
        self.with_search(self.search.clone().not())
    }

    pub(crate) fn with_search(&self, search: SearchList) -> Brick {
        Brick {
            search,
            ..self.clone()
        }
    }

    pub fn order_by(&self, field: &str, order: Order) -> Result<Brick> {
        let column = self.model.resolve_field(field)?.column.clone();
        let mut result = self.clone();
        result.order_by.push(Ordered { column, order });
        Ok(result)
    }
    pub fn limit(&self, limit: u64) -> Brick {
        Brick {
            limit: Some(limit),
            ..self.clone()
        }
    }
    pub fn offset(&self, offset: u64) -> Brick {
        Brick {
            offset: Some(offset),
            ..self.clone()
        }
    }

    /// Restricts writes and reads to `fields`, primary keys are always kept.
    pub fn bind_fields(&self, fields: &[&str]) -> Result<Brick> {
        self.check_fields(fields.iter().copied())?;
        let names = fields
            .iter()
            .map(|name| self.model.resolve_field(name).map(|f| f.name.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Brick {
            bound: Some(names.into()),
            ..self.clone()
        })
    }
    pub fn ignore_mode(&self, mode: IgnoreMode) -> Brick {
        Brick {
            ignore_mode: Some(mode),
            ..self.clone()
        }
    }
    /// Turns the soft delete filter off, deletes become hard.
    pub fn unscoped(&self) -> Brick {
        Brick {
            unscoped: true,
            ..self.clone()
        }
    }
    /// Pins every statement to `shard`, preloads included.
    pub fn shard(&self, shard: usize) -> Result<Brick> {
        self.database.executor(shard)?;
        let mut result = self.clone();
        result.pin_shard(shard);
        Ok(result)
    }
    fn pin_shard(&mut self, shard: usize) {
        self.shard = Some(shard);
        for preload in &mut self.preloads {
            preload.brick.pin_shard(shard);
        }
    }
    /// Logs the statements at info level.
    pub fn debug(&self, debug: bool) -> Brick {
        Brick {
            debug,
            ..self.clone()
        }
    }

    pub fn preload(&self, field: &str) -> Result<Brick> {
        self.preload_with(field, Ok)
    }

    /// Preloads `field`, `configure` shapes the brick the relation is run with.
    pub fn preload_with(
        &self,
        field: &str,
        configure: impl FnOnce(Brick) -> Result<Brick>,
    ) -> Result<Brick> {
        let relation = self
            .database
            .registry()
            .relation(&self.model, field, Orientation::Left)?;
        self.attach(relation, configure)
    }

    /// Preloads a many to many field with the owner on the right side of the junction.
    pub fn right_preload(&self, field: &str) -> Result<Brick> {
        let relation = self
            .database
            .registry()
            .relation(&self.model, field, Orientation::Right)?;
        if relation.kind != RelationKind::ManyToMany {
            return Err(Error::new(ConfigError::InvalidRelation {
                model: self.model.name().into(),
                field: field.into(),
                reason: "only many to many relations have a right side".into(),
            }));
        }
        self.attach(relation, Ok)
    }

    /// Preloads `field` with an explicit layout instead of the derived one.
    pub fn custom_preload(&self, field: &str, spec: RelationSpec) -> Result<Brick> {
        let relation = self
            .database
            .registry()
            .custom_relation(&self.model, field, &spec)?;
        self.attach(relation, Ok)
    }

    fn attach(
        &self,
        relation: Arc<Relation>,
        configure: impl FnOnce(Brick) -> Result<Brick>,
    ) -> Result<Brick> {
        let mut sub = Brick::new(self.database.clone(), relation.sub.clone()).debug(self.debug);
        if let Some(shard) = self.shard {
            sub.pin_shard(shard);
        }
        let sub = configure(sub)?;
        if !Arc::ptr_eq(&sub.model, &relation.sub) && *sub.model != *relation.sub {
            return Err(Error::new(ConfigError::InvalidRelation {
                model: self.model.name().into(),
                field: relation.field.clone(),
                reason: format!(
                    "the preload brick runs on `{}` instead of `{}`",
                    sub.model.name(),
                    relation.sub.name()
                ),
            }));
        }
        let mut result = self.clone();
        result
            .preloads
            .retain(|p| p.relation.field != relation.field);
        log::trace!(
            "`{}.{}` preloaded as {:?}",
            self.model.name(),
            relation.field,
            relation.kind
        );
        result.preloads.push(Preload {
            relation,
            brick: sub,
        });
        Ok(result)
    }

    /// Brick over the junction table of a many to many relation.
    pub(crate) fn junction_brick(&self, junction: &Arc<Model>) -> Brick {
        let mut result = Brick::new(self.database.clone(), junction.clone()).debug(self.debug);
        result.shard = self.shard;
        result
    }

    /// Filter with the soft delete scope applied.
    pub(crate) fn scoped_search(&self) -> SearchList {
        match self.model.deleted_at() {
            Some(deleted_at) if !self.unscoped => SearchList::new()
                .and_group(self.search.clone())
                .and(Condition::is_null(deleted_at.name.clone())),
            _ => self.search.clone(),
        }
    }

    /// Runs `operation` over `records`, the outcome is also carried by the error on failure.
    pub fn run(&self, operation: &str, records: RecordSet) -> Result<Outcome> {
        if !Arc::ptr_eq(records.model(), &self.model) && **records.model() != *self.model {
            return Err(Error::new(InvalidRecordType(format!(
                "the brick on `{}` cannot run over records of `{}`",
                self.model.name(),
                records.model().name()
            ))));
        }
        let (outcome, result) = run_pipeline(self, operation, records, None);
        match result {
            Ok(()) => {
                log::debug!(
                    "{} on `{}` done, {} action(s)",
                    operation,
                    self.model.name(),
                    outcome.total_actions()
                );
                Ok(outcome)
            }
            Err(error) => {
                log::error!("{} on `{}` failed: {:#}", operation, self.model.name(), error);
                Err(Error::new(OperationError::new(operation, outcome, error)))
            }
        }
    }

    fn run_empty(&self, operation: &str) -> Result<Outcome> {
        self.run(operation, RecordSet::empty(self.model.clone(), RecordKind::Named))
    }

    pub fn create_table(&self) -> Result<Outcome> {
        self.run_empty(operation::CREATE_TABLE)
    }
    pub fn create_table_if_not_exists(&self) -> Result<Outcome> {
        self.run_empty(operation::CREATE_TABLE_IF_NOT_EXIST)
    }
    pub fn drop_table(&self) -> Result<Outcome> {
        self.run_empty(operation::DROP_TABLE)
    }
    pub fn drop_table_if_exists(&self) -> Result<Outcome> {
        self.run_empty(operation::DROP_TABLE_IF_EXIST)
    }

    fn target_shards(&self) -> Vec<usize> {
        match self.shard {
            Some(shard) => vec![shard],
            None => (0..self.database.shards()).collect(),
        }
    }

    /// True when the table exists on every targeted shard.
    pub fn has_table(&self) -> Result<bool> {
        let query = self.database.dialect().has_table(self.model.name());
        for shard in self.target_shards() {
            if self.debug {
                log::info!("{}", query.sql);
            }
            if self.database.executor(shard)?.query_row(&query)?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Number of rows matching the filter, summed over the targeted shards.
    pub fn count(&self) -> Result<u64> {
        let condition = compile(&self.scoped_search(), &self.model)?;
        let query = self.database.dialect().count(&self.model, &condition);
        let mut total = 0;
        for shard in self.target_shards() {
            if self.debug {
                log::info!("{}", query.sql);
            }
            let row = self.database.executor(shard)?.query_row(&query)?;
            let value = row
                .and_then(|row| row.values.first().cloned())
                .unwrap_or(Value::Int64(Some(0)));
            total += match value.convert_to(&Value::UInt64(None))? {
                Value::UInt64(Some(v)) => v,
                _ => 0,
            };
        }
        Ok(total)
    }

    /// Runs `operation` over native values, they are moved back into `entities` whatever the
    /// result.
    fn run_entities<T: Entity>(&self, operation: &str, entities: &mut Vec<T>) -> Result<Outcome> {
        let records = RecordSet::from_entities(self.model.clone(), mem::take(entities))?;
        match self.run(operation, records) {
            Ok(mut outcome) => {
                let records = outcome.records.take_records();
                restore_entities(entities, records)?;
                Ok(outcome)
            }
            Err(mut error) => {
                if let Some(failed) = error.downcast_mut::<OperationError>() {
                    let records = failed.outcome.records.take_records();
                    if let Err(restore) = restore_entities(entities, records) {
                        log::error!("{restore:#}");
                    }
                }
                Err(error)
            }
        }
    }

    fn run_one<T: Entity>(&self, operation: &str, entity: &mut T) -> Result<Outcome> {
        let mut entities = vec![mem::take(entity)];
        let result = self.run_entities(operation, &mut entities);
        if let Some(value) = entities.pop() {
            *entity = value;
        }
        result
    }

    pub fn insert<T: Entity>(&self, entities: &mut Vec<T>) -> Result<Outcome> {
        self.run_entities(operation::INSERT, entities)
    }
    pub fn insert_one<T: Entity>(&self, entity: &mut T) -> Result<Outcome> {
        self.run_one(operation::INSERT, entity)
    }
    /// Insert or update by primary key.
    pub fn save<T: Entity>(&self, entities: &mut Vec<T>) -> Result<Outcome> {
        self.run_entities(operation::SAVE, entities)
    }
    pub fn save_one<T: Entity>(&self, entity: &mut T) -> Result<Outcome> {
        self.run_one(operation::SAVE, entity)
    }
    pub fn update<T: Entity>(&self, entities: &mut Vec<T>) -> Result<Outcome> {
        self.run_entities(operation::UPDATE, entities)
    }
    pub fn update_one<T: Entity>(&self, entity: &mut T) -> Result<Outcome> {
        self.run_one(operation::UPDATE, entity)
    }

    /// Soft delete when the model supports it and the brick is scoped, hard delete otherwise.
    pub fn delete_operation(&self) -> &'static str {
        if self.model.is_soft_deletable() && !self.unscoped {
            operation::SOFT_DELETE
        } else {
            operation::HARD_DELETE
        }
    }
    pub fn delete<T: Entity>(&self, entities: &mut Vec<T>) -> Result<Outcome> {
        self.run_entities(self.delete_operation(), entities)
    }
    pub fn delete_one<T: Entity>(&self, entity: &mut T) -> Result<Outcome> {
        self.run_one(self.delete_operation(), entity)
    }
    pub fn hard_delete<T: Entity>(&self, entities: &mut Vec<T>) -> Result<Outcome> {
        self.run_entities(operation::HARD_DELETE, entities)
    }
    pub fn hard_delete_one<T: Entity>(&self, entity: &mut T) -> Result<Outcome> {
        self.run_one(operation::HARD_DELETE, entity)
    }
    pub fn soft_delete<T: Entity>(&self, entities: &mut Vec<T>) -> Result<Outcome> {
        self.run_entities(operation::SOFT_DELETE, entities)
    }
    pub fn soft_delete_one<T: Entity>(&self, entity: &mut T) -> Result<Outcome> {
        self.run_one(operation::SOFT_DELETE, entity)
    }

    /// Deletes the rows matching the filter, soft when the model supports it.
    pub fn delete_where(&self) -> Result<Outcome> {
        if self.model.is_soft_deletable() && !self.unscoped {
            self.run_empty(operation::SOFT_DELETE_WHERE)
        } else {
            self.run_empty(operation::HARD_DELETE_WHERE)
        }
    }
    pub fn hard_delete_where(&self) -> Result<Outcome> {
        self.run_empty(operation::HARD_DELETE_WHERE)
    }

    /// Sets `values` (keyed by field name) on the rows matching the filter.
    pub fn update_where<I, K>(&self, values: I) -> Result<Outcome>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut row = BTreeMap::new();
        for (name, value) in values {
            let name = name.into();
            let field = self.model.resolve_field(&name)?;
            row.insert(field.name.clone(), value);
        }
        let mut records = RecordSet::empty(self.model.clone(), RecordKind::Named);
        records.add(Record::named(self.model.clone(), row))?;
        self.run(operation::UPDATE_WHERE, records)
    }

    /// Loads the matching rows as records of `kind`.
    pub fn find_records(&self, kind: RecordKind) -> Result<Outcome> {
        self.run(
            operation::FIND,
            RecordSet::empty(self.model.clone(), kind),
        )
    }

    /// Appends the matching rows to `entities`.
    pub fn find_into<T: Entity>(&self, entities: &mut Vec<T>) -> Result<Outcome> {
        let mut outcome = self.find_records(RecordKind::Structured)?;
        let records = outcome.records.take_records();
        entities.reserve(records.len());
        for record in records {
            entities.push(record.into_entity()?);
        }
        Ok(outcome)
    }
    pub fn find<T: Entity>(&self) -> Result<Vec<T>> {
        let mut result = Vec::new();
        self.find_into(&mut result)?;
        Ok(result)
    }
    pub fn find_one<T: Entity>(&self) -> Result<Option<T>> {
        Ok(self.limit(1).find::<T>()?.into_iter().next())
    }
}

fn restore_entities<T: Entity>(entities: &mut Vec<T>, records: Vec<Record>) -> Result<()> {
    entities.reserve(records.len());
    for record in records {
        entities.push(record.into_entity()?);
    }
    Ok(())
}

impl fmt::Debug for Brick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Brick")
            .field("model", &self.model.name())
            .field("search", &self.search)
            .field("order_by", &self.order_by)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("bound", &self.bound)
            .field("ignore_mode", &self.ignore_mode)
            .field("unscoped", &self.unscoped)
            .field("shard", &self.shard)
            .field(
                "preloads",
                &self
                    .preloads
                    .iter()
                    .map(|p| p.relation.field.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ShardErrors, find_error,
        testing::{Account, Author, Book, Note, Publisher, Tag, database, int, rows, text},
    };
    use time::{PrimitiveDateTime, macros::datetime};

    fn assert_statements(actual: &[String], expected: &[&str]) {
        assert_eq!(
            actual.len(),
            expected.len(),
            "statements: {actual:#?}"
        );
        for (sql, prefix) in actual.iter().zip(expected) {
            assert!(sql.starts_with(prefix), "`{sql}` does not start with `{prefix}`");
        }
    }

    #[test]
    fn modifiers_leave_the_receiver_untouched() {
        let (db, _) = database(1);
        let brick = db.brick::<Book>().unwrap();
        let filtered = brick
            .filter(Condition::eq("title", "Dune"))
            .unwrap()
            .order_by("id", Order::Desc)
            .unwrap()
            .limit(3)
            .preload("publisher")
            .unwrap();
        assert!(brick.search().is_empty());
        assert!(brick.preloads().is_empty());
        assert_eq!(filtered.limit_value(), Some(3));
        assert_eq!(filtered.preloads().len(), 1);
        assert!(brick.filter(Condition::eq("ghost", 1i64)).is_err());
        assert!(brick.order_by("ghost", Order::Asc).is_err());
        assert!(brick.preload("ghost").is_err());
        assert!(brick.shard(1).is_err());
        assert_eq!(
            brick.ignore_mode_for(operation::UPDATE),
            IgnoreMode::Zero
        );
        assert_eq!(
            brick.ignore_mode_for(operation::INSERT),
            IgnoreMode::Nothing
        );
        let twice = filtered.preload("publisher").unwrap();
        assert_eq!(twice.preloads().len(), 1);
    }

    #[test]
    fn right_preload_needs_many_to_many() {
        let (db, _) = database(1);
        let author = db.brick::<Author>().unwrap();
        let error = author.right_preload("books").unwrap_err();
        assert!(matches!(
            find_error::<ConfigError>(&error),
            Some(ConfigError::InvalidRelation { .. })
        ));
        assert!(author.right_preload("tags").is_ok());
    }

    #[test]
    fn tables_follow_the_relations() {
        let (db, recorders) = database(1);
        let brick = db
            .brick::<Author>()
            .unwrap()
            .preload_with("books", |b| b.preload("publisher"))
            .unwrap()
            .preload("tags")
            .unwrap();
        brick.create_table_if_not_exists().unwrap();
        assert_statements(
            &recorders[0].statements(),
            &[
                r#"CREATE TABLE IF NOT EXISTS "author""#,
                r#"CREATE TABLE IF NOT EXISTS "publisher""#,
                r#"CREATE TABLE IF NOT EXISTS "book""#,
                r#"CREATE TABLE IF NOT EXISTS "tag""#,
                r#"CREATE TABLE IF NOT EXISTS "author_tag""#,
            ],
        );
        let (db, recorders) = database(1);
        let brick = db
            .brick::<Author>()
            .unwrap()
            .preload_with("books", |b| b.preload("publisher"))
            .unwrap()
            .preload("tags")
            .unwrap();
        brick.drop_table().unwrap();
        assert_statements(
            &recorders[0].statements(),
            &[
                r#"DROP TABLE "book""#,
                r#"DROP TABLE "publisher""#,
                r#"DROP TABLE "author_tag""#,
                r#"DROP TABLE "tag""#,
                r#"DROP TABLE "author""#,
            ],
        );
    }

    #[test]
    fn insert_writes_related_records_in_order() {
        let (db, recorders) = database(1);
        let brick = db
            .brick::<Author>()
            .unwrap()
            .preload_with("books", |b| b.preload("publisher"))
            .unwrap()
            .preload("tags")
            .unwrap();
        let mut author = Author {
            name: "Frank".into(),
            books: vec![Book {
                title: "Dune".into(),
                publisher: Some(Publisher {
                    name: "Chilton".into(),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            tags: vec![Tag {
                label: "sf".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let outcome = brick.insert_one(&mut author).unwrap();
        let queries = recorders[0].queries();
        let statements: Vec<String> = queries.iter().map(|q| q.sql.clone()).collect();
        assert_statements(
            &statements,
            &[
                r#"INSERT INTO "author" ("name") VALUES (?);"#,
                r#"INSERT INTO "publisher" ("name") VALUES (?);"#,
                r#"INSERT INTO "book" ("author_id", "title", "publisher_id") VALUES (?, ?, ?);"#,
                r#"INSERT INTO "tag" ("label") VALUES (?);"#,
                r#"INSERT INTO "author_tag" ("author_id", "tag_id") VALUES (?, ?)"#,
            ],
        );
        assert!(statements[4].ends_with("DO NOTHING;"));
        assert_eq!(queries[4].args, [int(1), int(4)]);
        assert_eq!(author.id, 1);
        let book = &author.books[0];
        assert_eq!((book.id, book.author_id, book.publisher_id), (3, 1, Some(2)));
        assert_eq!(book.publisher.as_ref().map(|p| p.id), Some(2));
        assert_eq!(author.tags[0].id, 4);
        assert_eq!(outcome.actions.len(), 1);
        assert!(outcome.preload["books"].preload.contains_key("publisher"));
        assert!(outcome.junction.contains_key("author_tag"));
    }

    #[test]
    fn related_records_follow_the_owner_operation() {
        let (db, recorders) = database(1);
        let brick = db.brick::<Author>().unwrap().preload("books").unwrap();
        let author = || Author {
            id: 1,
            name: "Frank".into(),
            books: vec![Book {
                id: 9,
                title: "Dune".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        brick.insert_one(&mut author()).unwrap();
        let statements = recorders[0].statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[1].starts_with("INSERT INTO \"book\""));
        assert!(!statements[1].contains("ON CONFLICT"));

        brick.save_one(&mut author()).unwrap();
        let statements = recorders[0].statements();
        let book = statements
            .iter()
            .rev()
            .find(|v| v.starts_with("INSERT INTO \"book\""))
            .unwrap();
        assert!(book.contains("ON CONFLICT (\"id\") DO UPDATE SET"));
    }

    #[test]
    fn failing_stage_keeps_what_was_done() {
        let (db, recorders) = database(1);
        recorders[0].fail_on(r#"INSERT INTO "book""#);
        let brick = db
            .brick::<Author>()
            .unwrap()
            .preload("books")
            .unwrap()
            .preload("tags")
            .unwrap();
        let mut authors = vec![Author {
            name: "Frank".into(),
            books: vec![Book::default()],
            tags: vec![Tag::default()],
            ..Default::default()
        }];
        let error = brick.insert(&mut authors).unwrap_err();
        let failed = error.downcast_ref::<OperationError>().unwrap();
        assert_eq!(failed.operation, operation::INSERT);
        assert_eq!(failed.outcome.actions.len(), 1);
        assert_eq!(failed.outcome.errors().len(), 1);
        assert!(format!("{error:#}").contains("scripted failure"));
        assert_eq!(recorders[0].statements().len(), 2);
        assert_eq!(authors.len(), 1);
        assert_eq!(authors[0].id, 1);
        assert_eq!(authors[0].books.len(), 1);
        assert_eq!(authors[0].tags.len(), 1);
    }

    #[test]
    fn empty_batches_do_nothing() {
        let (db, recorders) = database(1);
        let brick = db.brick::<Author>().unwrap();
        let outcome = brick.insert::<Author>(&mut Vec::new()).unwrap();
        assert!(outcome.actions.is_empty());
        let outcome = brick.delete::<Author>(&mut Vec::new()).unwrap();
        assert!(outcome.actions.is_empty());
        assert!(recorders[0].statements().is_empty());
    }

    #[test]
    fn update_skips_zero_values() {
        let (db, recorders) = database(1);
        let brick = db.brick::<Book>().unwrap();
        let mut book = Book {
            id: 3,
            title: "Dune".into(),
            ..Default::default()
        };
        brick.update_one(&mut book).unwrap();
        brick
            .ignore_mode(IgnoreMode::Nothing)
            .update_one(&mut book)
            .unwrap();
        assert_eq!(
            recorders[0].statements(),
            [
                "UPDATE \"book\" SET\n\"title\" = ?\nWHERE \"id\" = ?;",
                "UPDATE \"book\" SET\n\"author_id\" = ?,\n\"title\" = ?,\n\"publisher_id\" = ?\nWHERE \"id\" = ?;",
            ]
        );
        let mut keyless = Book {
            title: "Emma".into(),
            ..Default::default()
        };
        let error = brick.update_one(&mut keyless).unwrap_err();
        assert!(find_error::<crate::MissingPrimaryKey>(&error).is_some());
    }

    #[test]
    fn soft_delete_and_scope() {
        let (db, recorders) = database(1);
        let brick = db.brick::<Account>().unwrap();
        let mut account = Account {
            id: 7,
            email: "a@b.c".into(),
            ..Default::default()
        };
        assert_eq!(brick.delete_operation(), operation::SOFT_DELETE);
        brick.delete_one(&mut account).unwrap();
        assert!(account.deleted_at.is_some());
        brick.unscoped().delete_one(&mut account).unwrap();
        recorders[0].respond("COUNT(*)", rows(&["count"], vec![vec![int(3)]]));
        assert_eq!(brick.count().unwrap(), 3);
        assert_eq!(
            recorders[0].statements(),
            [
                "UPDATE \"account\" SET\n\"deleted_at\" = ?\nWHERE \"id\" = ? AND \"deleted_at\" IS NULL;",
                "DELETE FROM \"account\"\nWHERE \"id\" = ?;",
                "SELECT COUNT(*)\nFROM \"account\"\nWHERE \"deleted_at\" IS NULL;",
            ]
        );
    }

    #[test]
    fn conditional_operations_need_a_filter() {
        let (db, recorders) = database(1);
        let brick = db.brick::<Account>().unwrap();
        assert!(brick.update_where([("email", text("x"))]).is_err());
        assert!(brick.delete_where().is_err());
        assert!(brick.hard_delete_where().is_err());
        assert!(recorders[0].statements().is_empty());

        let filtered = brick.filter(Condition::eq("nickname", "n")).unwrap();
        filtered.update_where([("email", text("x"))]).unwrap();
        filtered.delete_where().unwrap();
        let statements = recorders[0].statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("UPDATE \"account\" SET\n\"email\" = ?\nWHERE "));
        assert!(statements[0].contains("\"deleted_at\" IS NULL"));
        assert!(statements[1].starts_with("UPDATE \"account\" SET\n\"deleted_at\" = ?\nWHERE "));
        assert!(brick.update_where([("ghost", text("x"))]).is_err());
    }

    #[test]
    fn delete_where_leaves_deleted_rows_alone() {
        let (db, recorders) = database(1);
        let brick = db
            .brick::<Account>()
            .unwrap()
            .filter(Condition::eq("email", "a@b.c"))
            .unwrap()
            .or(Condition::eq("email", "d@e.f"))
            .unwrap();
        brick.delete_where().unwrap();
        let statements = recorders[0].statements();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].starts_with("UPDATE \"account\" SET\n\"deleted_at\" = ?\nWHERE "));
        assert!(
            statements[0]
                .ends_with("WHERE (\"email\" = ? OR \"email\" = ?) AND \"deleted_at\" IS NULL;")
        );
    }

    #[test]
    fn find_loads_children_and_many_to_many() {
        let (db, recorders) = database(1);
        let recorder = &recorders[0];
        recorder
            .respond(
                "FROM \"author\";",
                rows(
                    &["id", "name"],
                    vec![vec![int(1), text("A")], vec![int(2), text("B")]],
                ),
            )
            .respond(
                "FROM \"book\"",
                rows(
                    &["id", "author_id", "title", "publisher_id"],
                    vec![
                        vec![int(10), int(1), text("x"), Value::Int64(None)],
                        vec![int(11), int(2), text("y"), Value::Int64(None)],
                        vec![int(12), int(1), text("z"), Value::Int64(None)],
                    ],
                ),
            )
            .respond(
                "FROM \"author_tag\"",
                rows(
                    &["author_id", "tag_id"],
                    vec![
                        vec![int(1), int(5)],
                        vec![int(2), int(5)],
                        vec![int(1), int(6)],
                    ],
                ),
            )
            .respond(
                "FROM \"tag\"",
                rows(
                    &["id", "label"],
                    vec![vec![int(5), text("sf")], vec![int(6), text("classic")]],
                ),
            );
        let authors = db
            .brick::<Author>()
            .unwrap()
            .preload("books")
            .unwrap()
            .preload("tags")
            .unwrap()
            .find::<Author>()
            .unwrap();
        assert_eq!(
            recorder.statements(),
            [
                "SELECT \"id\", \"name\"\nFROM \"author\";",
                "SELECT \"id\", \"author_id\", \"title\", \"publisher_id\"\nFROM \"book\"\nWHERE \"author_id\" IN (?, ?);",
                "SELECT \"author_id\", \"tag_id\"\nFROM \"author_tag\"\nWHERE \"author_id\" IN (?, ?);",
                "SELECT \"id\", \"label\"\nFROM \"tag\"\nWHERE \"id\" IN (?, ?);",
            ]
        );
        let books = |a: &Author| a.books.iter().map(|b| b.id).collect::<Vec<_>>();
        let tags = |a: &Author| a.tags.iter().map(|t| t.label.clone()).collect::<Vec<_>>();
        assert_eq!(books(&authors[0]), [10, 12]);
        assert_eq!(books(&authors[1]), [11]);
        assert_eq!(tags(&authors[0]), ["sf", "classic"]);
        assert_eq!(tags(&authors[1]), ["sf"]);
    }

    #[test]
    fn preloads_skip_missing_keys_and_empty_lists() {
        let (db, recorders) = database(1);
        let found = db
            .brick::<Author>()
            .unwrap()
            .preload("books")
            .unwrap()
            .find::<Author>()
            .unwrap();
        assert!(found.is_empty());
        assert_eq!(recorders[0].statements().len(), 1);

        let empty: [i64; 0] = [];
        db.brick::<Book>()
            .unwrap()
            .filter(Condition::is_in("id", empty))
            .unwrap()
            .find::<Book>()
            .unwrap();
        assert!(recorders[0].statements()[1].ends_with("WHERE 1 = 0;"));
    }

    #[test]
    fn hard_delete_cascades_over_preloads() {
        let (db, recorders) = database(1);
        recorders[0].respond(
            "FROM \"book\"",
            rows(
                &["id", "author_id", "title", "publisher_id"],
                vec![vec![int(10), int(1), text("x"), Value::Int64(None)]],
            ),
        );
        let brick = db
            .brick::<Author>()
            .unwrap()
            .preload("notes")
            .unwrap()
            .preload("books")
            .unwrap()
            .preload("tags")
            .unwrap();
        assert_eq!(brick.delete_operation(), operation::HARD_DELETE);
        let mut author = Author {
            id: 1,
            ..Default::default()
        };
        brick.delete_one(&mut author).unwrap();
        let statements = recorders[0].statements();
        assert_statements(
            &statements,
            &[
                "UPDATE \"note\" SET\n\"author_id\" = ?,\n\"deleted_at\" = ?,\n\"updated_at\" = ?\nWHERE ",
                "SELECT \"id\", \"author_id\", \"title\", \"publisher_id\"\nFROM \"book\"\nWHERE \"author_id\" IN (?);",
                "DELETE FROM \"book\"\nWHERE \"id\" = ?;",
                "DELETE FROM \"author_tag\"\nWHERE \"author_id\" IN (?);",
                "DELETE FROM \"author\"\nWHERE \"id\" = ?;",
            ],
        );
        assert!(statements[0].contains("\"author_id\" IN (?)"));
    }

    #[test]
    fn save_keeps_the_creation_stamp() {
        let (db, recorders) = database(1);
        let created = datetime!(2024-01-02 03:04:05);
        recorders[0].respond(
            "FROM \"note\"",
            rows(
                &["id", "created_at"],
                vec![vec![int(4), Value::Timestamp(Some(created))]],
            ),
        );
        let mut note = Note {
            id: 4,
            body: "hello".into(),
            ..Default::default()
        };
        db.brick::<Note>().unwrap().save_one(&mut note).unwrap();
        assert_eq!(note.created_at, Some(created));
        let updated: Option<PrimitiveDateTime> = note.updated_at;
        assert!(updated.is_some_and(|v| v > created));
        let statements = recorders[0].statements();
        assert_eq!(
            statements[0],
            "SELECT \"id\", \"created_at\"\nFROM \"note\"\nWHERE \"id\" IN (?);"
        );
        assert!(statements[1].starts_with("INSERT INTO \"note\""));
        assert!(statements[1].contains("ON CONFLICT (\"id\") DO UPDATE SET"));
    }

    #[test]
    fn records_are_routed_by_key() {
        let (db, recorders) = database(2);
        let brick = db.brick::<Author>().unwrap();
        let mut authors = vec![
            Author {
                id: 1,
                name: "odd".into(),
                ..Default::default()
            },
            Author {
                id: 2,
                name: "even".into(),
                ..Default::default()
            },
        ];
        let outcome = brick.save(&mut authors).unwrap();
        assert_eq!(authors.iter().map(|a| a.id).collect::<Vec<_>>(), [1, 2]);
        assert_eq!(recorders[0].queries()[0].args[0], int(2));
        assert_eq!(recorders[1].queries()[0].args[0], int(1));
        assert_eq!(outcome.actions_of(0).next().and_then(|a| a.shard), Some(1));

        recorders[1].fail_on("INSERT");
        let error = brick.save(&mut authors).unwrap_err();
        let shards = find_error::<ShardErrors>(&error).unwrap();
        assert_eq!(shards.errors.len(), 1);
        assert_eq!(shards.errors[0].0, 1);
        assert_eq!(recorders[0].statements().len(), 2);
        assert_eq!(authors.len(), 2);
    }

    #[test]
    fn reads_fan_out_unless_pinned() {
        let (db, recorders) = database(2);
        recorders[0].respond("FROM \"tag\"", rows(&["id", "label"], vec![vec![int(2), text("a")]]));
        recorders[1].respond("FROM \"tag\"", rows(&["id", "label"], vec![vec![int(1), text("b")]]));
        let brick = db.brick::<Tag>().unwrap();
        let tags = brick.find::<Tag>().unwrap();
        assert_eq!(tags.iter().map(|t| t.id).collect::<Vec<_>>(), [2, 1]);
        brick.shard(1).unwrap().find::<Tag>().unwrap();
        assert_eq!(recorders[0].statements().len(), 1);
        assert_eq!(recorders[1].statements().len(), 2);
    }

    #[test]
    fn unknown_operation() {
        let (db, _) = database(1);
        let brick = db.brick::<Tag>().unwrap();
        let error = brick
            .run("Merge", RecordSet::empty(brick.model().clone(), RecordKind::Named))
            .unwrap_err();
        assert!(matches!(
            find_error::<ConfigError>(&error),
            Some(ConfigError::UnknownOperation { .. })
        ));
    }
}
