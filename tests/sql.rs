#[cfg(test)]
mod tests {
    use indoc::indoc;
    use masonry::{
        Condition, Dialect, Entity, Fragment, GenericDialect, Model, Order, Ordered, SearchList,
        Select, Value, compile,
    };
    use time::PrimitiveDateTime;

    const DIALECT: GenericDialect = GenericDialect;

    #[derive(Entity, Debug, Clone, Default)]
    #[table_name("my_table")]
    struct Table {
        #[masonry(primary_key, auto_increment)]
        id: i64,
        #[masonry(column = "special_column")]
        first_column: Option<String>,
        second_column: f64,
        #[masonry(unique)]
        third_column: i32,
        #[masonry(index)]
        created: Option<PrimitiveDateTime>,
    }

    #[derive(Entity, Debug, Clone, Default)]
    #[primary_key("owner", "item")]
    struct Pair {
        owner: i64,
        item: i64,
        amount: u8,
    }

    fn table() -> Model {
        Model::of::<Table>().expect("Table should describe a valid model")
    }

    #[test]
    fn create_and_drop() {
        let model = table();
        let queries = DIALECT.create_table(&model, false);
        assert_eq!(queries.len(), 2);
        assert_eq!(
            queries[0].sql,
            indoc! {r#"
                CREATE TABLE "my_table" (
                "id" BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
                "special_column" VARCHAR,
                "second_column" DOUBLE NOT NULL,
                "third_column" INTEGER NOT NULL UNIQUE,
                "created" TIMESTAMP
                );
            "#}
            .trim()
        );
        assert_eq!(
            queries[1].sql,
            r#"CREATE INDEX "idx_my_table_created" ON "my_table" ("created");"#
        );
        let queries = DIALECT.create_table(&model, true);
        assert!(queries[0].sql.starts_with(r#"CREATE TABLE IF NOT EXISTS "my_table" ("#));
        assert!(queries[1].sql.starts_with(r#"CREATE INDEX IF NOT EXISTS "#));

        assert_eq!(
            DIALECT.drop_table(&model, true).sql,
            r#"DROP TABLE IF EXISTS "my_table";"#
        );
        assert_eq!(DIALECT.drop_table(&model, false).sql, r#"DROP TABLE "my_table";"#);
    }

    #[test]
    fn composite_key() {
        let model = Model::of::<Pair>().unwrap();
        let queries = DIALECT.create_table(&model, false);
        assert_eq!(queries.len(), 1);
        assert_eq!(
            queries[0].sql,
            indoc! {r#"
                CREATE TABLE "pair" (
                "owner" BIGINT NOT NULL,
                "item" BIGINT NOT NULL,
                "amount" UTINYINT NOT NULL,
                PRIMARY KEY ("owner", "item")
                );
            "#}
            .trim()
        );
        let fields: Vec<_> = model.sql_fields().collect();
        let row = [
            (fields[0], Value::Int64(Some(1))),
            (fields[1], Value::Int64(Some(2))),
            (fields[2], Value::UInt8(Some(3))),
        ];
        assert_eq!(
            DIALECT.save(&model, &row).sql,
            indoc! {r#"
                INSERT INTO "pair" ("owner", "item", "amount") VALUES (?, ?, ?)
                ON CONFLICT ("owner", "item") DO UPDATE SET
                "amount" = EXCLUDED."amount";
            "#}
            .trim()
        );
        assert_eq!(
            DIALECT.save(&model, &row[..2]).sql,
            indoc! {r#"
                INSERT INTO "pair" ("owner", "item") VALUES (?, ?)
                ON CONFLICT ("owner", "item") DO NOTHING;
            "#}
            .trim()
        );
    }

    #[test]
    fn writes() {
        let model = table();
        let first = model.field("first_column").unwrap();
        let second = model.field("second_column").unwrap();
        let row = [
            (first, Value::Varchar(Some("OK".into()))),
            (second, Value::Float64(Some(2.5))),
        ];
        let insert = DIALECT.insert(&model, &row);
        assert_eq!(
            insert.sql,
            r#"INSERT INTO "my_table" ("special_column", "second_column") VALUES (?, ?);"#
        );
        assert_eq!(insert.args, [row[0].1.clone(), row[1].1.clone()]);
        assert_eq!(
            DIALECT.insert(&model, &[]).sql,
            r#"INSERT INTO "my_table" DEFAULT VALUES;"#
        );

        let condition = compile(&SearchList::from(Condition::eq("id", 7i64)), &model).unwrap();
        let update = DIALECT.update(&model, &row, &condition);
        assert_eq!(
            update.sql,
            indoc! {r#"
                UPDATE "my_table" SET
                "special_column" = ?,
                "second_column" = ?
                WHERE "id" = ?;
            "#}
            .trim()
        );
        assert_eq!(update.args.len(), 3);
        assert_eq!(update.args[2], Value::Int64(Some(7)));

        let delete = DIALECT.delete(&model, &condition);
        assert_eq!(
            delete.sql,
            indoc! {r#"
                DELETE FROM "my_table"
                WHERE "id" = ?;
            "#}
            .trim()
        );
    }

    #[test]
    fn reads() {
        let model = table();
        let search = SearchList::new()
            .and(Condition::lt("second_column", 100))
            .and(Condition::eq("first_column", "OK"));
        let condition = compile(&search, &model).unwrap();
        assert_eq!(
            condition.sql,
            r#""second_column" < ? AND "special_column" = ?"#
        );
        assert_eq!(
            condition.args,
            [Value::Float64(Some(100.0)), Value::Varchar(Some("OK".into()))]
        );
        let columns: Vec<_> = model.sql_fields().take(3).collect();
        let order_by = [Ordered {
            column: "second_column".into(),
            order: Order::Desc,
        }];
        let find = DIALECT.find(
            &model,
            Select {
                columns: &columns,
                condition: &condition,
                order_by: &order_by,
                limit: Some(10),
                offset: Some(20),
            },
        );
        assert_eq!(
            find.sql,
            indoc! {r#"
                SELECT "id", "special_column", "second_column"
                FROM "my_table"
                WHERE "second_column" < ? AND "special_column" = ?
                ORDER BY "second_column" DESC
                LIMIT 10
                OFFSET 20;
            "#}
            .trim()
        );
        assert_eq!(find.args, condition.args);

        let count = DIALECT.count(&model, &Fragment::default());
        assert_eq!(
            count.sql,
            indoc! {r#"
                SELECT COUNT(*)
                FROM "my_table";
            "#}
            .trim()
        );
    }

    #[test]
    fn conditions() {
        let model = table();
        let sql = |search: SearchList| compile(&search, &model).unwrap().sql;
        assert_eq!(sql(SearchList::new()), "");
        assert_eq!(
            sql(SearchList::from(Condition::is_in("id", Vec::<i64>::new()))),
            "1 = 0"
        );
        assert_eq!(
            sql(SearchList::from(Condition::not_in("id", Vec::<i64>::new()))),
            "1 = 1"
        );
        assert_eq!(
            sql(SearchList::from(Condition::is_in("id", [1i64, 2, 3]))),
            r#""id" IN (?, ?, ?)"#
        );
        assert_eq!(
            sql(SearchList::from(Condition::between("third_column", 1, 9))
                .and(Condition::not_null("created"))),
            r#""third_column" BETWEEN ? AND ? AND "created" IS NOT NULL"#
        );
        assert_eq!(
            sql(SearchList::from(Condition::like("first_column", "a%"))
                .or(Condition::is_null("first_column"))
                .not()),
            r#"NOT (("special_column" LIKE ? OR "special_column" IS NULL))"#
        );
        assert_eq!(
            sql(SearchList::from(Condition::ne("id", 1i64)).and_group(
                SearchList::from(Condition::gt("id", 5i64)).or(Condition::le("id", 2i64))
            )),
            r#""id" <> ? AND ("id" > ? OR "id" <= ?)"#
        );

        // Values are bound with the field type
        let fragment = compile(
            &SearchList::from(Condition::eq("third_column", 3i64)),
            &model,
        )
        .unwrap();
        assert_eq!(fragment.args, [Value::Int32(Some(3))]);
        assert!(
            compile(&SearchList::from(Condition::eq("third_column", "x")), &model).is_err()
        );
        assert!(compile(&SearchList::from(Condition::eq("missing", 1)), &model).is_err());
        assert!(
            compile(
                &SearchList::from(Condition::eq("first_column", Value::Varchar(None))),
                &model
            )
            .is_err()
        );
    }
}
