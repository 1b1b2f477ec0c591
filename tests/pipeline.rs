#[cfg(test)]
mod tests {
    use masonry::{
        Context, Database, Entity, Executor, OperationError, Query, Result, RowLabeled,
        RowsAffected, Sequence, Stage, Value, find_error, operation,
    };
    use std::sync::{Arc, Mutex};

    #[derive(Entity, Debug, Clone, Default, PartialEq)]
    struct Ticket {
        #[masonry(primary_key)]
        id: i64,
        email: String,
    }

    /// Keeps every statement, answers queries with no rows.
    #[derive(Default)]
    struct Log {
        queries: Mutex<Vec<Query>>,
    }

    impl Log {
        fn take(&self) -> Vec<Query> {
            std::mem::take(&mut *self.queries.lock().unwrap())
        }
    }

    impl Executor for Log {
        fn exec(&self, query: &Query) -> Result<RowsAffected> {
            self.queries.lock().unwrap().push(query.clone());
            Ok(RowsAffected {
                rows_affected: 1,
                last_affected_id: None,
            })
        }
        fn query(&self, query: &Query) -> Result<Vec<RowLabeled>> {
            self.queries.lock().unwrap().push(query.clone());
            Ok(Vec::new())
        }
    }

    fn lowercase(ctx: &mut Context<'_>) -> Result<()> {
        for record in ctx.records_mut().iter_mut() {
            if let Some(Value::Varchar(Some(email))) = record.field("email") {
                record.set_field("email", Value::Varchar(Some(email.to_lowercase())))?;
            }
        }
        Ok(())
    }

    fn reject(ctx: &mut Context<'_>) -> Result<()> {
        if ctx.records().len() > 1 {
            return Err(masonry::Error::msg("one ticket at a time"));
        }
        Ok(())
    }

    fn database() -> (Database, Arc<Log>) {
        let log = Arc::new(Log::default());
        let database = Database::builder()
            .shared_shard(log.clone())
            .id_generator("ticket", Sequence::new(100))
            .build()
            .expect("Failed to build the database");
        (database, log)
    }

    #[test]
    fn custom_stages_run_before_the_defaults() {
        let (database, log) = database();
        let defaults = database.pipelines().get(operation::INSERT).unwrap();
        let mut stages = vec![Stage::new("lowercase", lowercase)];
        stages.extend(defaults.iter().copied());
        database.pipelines().set(operation::INSERT, stages);

        let brick = database.brick::<Ticket>().unwrap();
        let mut tickets = vec![
            Ticket {
                email: "Ann@Mail.com".into(),
                ..Default::default()
            },
            Ticket {
                id: 7,
                email: "BOB@MAIL.COM".into(),
            },
        ];
        let outcome = brick.insert(&mut tickets).unwrap();
        assert_eq!(
            tickets,
            [
                Ticket {
                    id: 100,
                    email: "ann@mail.com".into()
                },
                Ticket {
                    id: 7,
                    email: "bob@mail.com".into()
                },
            ]
        );
        let queries = log.take();
        assert_eq!(queries.len(), 2);
        assert_eq!(
            queries[0].sql,
            r#"INSERT INTO "ticket" ("id", "email") VALUES (?, ?);"#
        );
        assert_eq!(
            queries[0].args,
            [
                Value::Int64(Some(100)),
                Value::Varchar(Some("ann@mail.com".into()))
            ]
        );
        assert_eq!(outcome.total_actions(), 2);
        assert_eq!(outcome.actions_of(1).count(), 1);
    }

    #[test]
    fn failing_stage_reports_the_operation() {
        let (database, log) = database();
        database
            .pipelines()
            .set(operation::SAVE, vec![Stage::new("reject", reject)]);
        let brick = database.brick::<Ticket>().unwrap();
        let mut tickets = vec![Ticket::default(), Ticket::default()];
        let error = brick.save(&mut tickets).unwrap_err();
        let failed = find_error::<OperationError>(&error).unwrap();
        assert_eq!(failed.operation, operation::SAVE);
        assert!(format!("{error:#}").contains("one ticket at a time"));
        assert_eq!(tickets.len(), 2, "Records come back on failure");
        assert!(log.take().is_empty());

        assert!(brick.run("Archive", brick_records(&database)).is_err());
    }

    fn brick_records(database: &Database) -> masonry::RecordSet {
        masonry::RecordSet::empty(
            database.model::<Ticket>().unwrap(),
            masonry::RecordKind::Named,
        )
    }
}
