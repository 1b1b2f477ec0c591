use masonry::{Condition, Database, Entity, Order, SearchList, Value};

#[derive(Entity, Debug, Clone, Default, PartialEq)]
struct Measure {
    #[masonry(primary_key, auto_increment)]
    id: i64,
    label: String,
    amount: f64,
    tag: Option<String>,
}

fn labels(measures: &[Measure]) -> Vec<&str> {
    measures.iter().map(|v| v.label.as_str()).collect()
}

pub fn conditions(database: &Database) {
    let brick = database
        .brick::<Measure>()
        .expect("Failed to get the Measure brick");
    brick
        .drop_table_if_exists()
        .expect("Failed to drop the Measure table");
    brick
        .create_table()
        .expect("Failed to create the Measure table");

    let mut measures: Vec<Measure> = [
        ("alpha", 1.5, Some("x")),
        ("bravo", 4.0, None),
        ("charlie", 2.5, Some("y")),
        ("delta", 8.0, None),
        ("echo", 6.0, Some("x")),
    ]
    .into_iter()
    .map(|(label, amount, tag)| Measure {
        label: label.into(),
        amount,
        tag: tag.map(Into::into),
        ..Default::default()
    })
    .collect();
    brick
        .insert(&mut measures)
        .expect("Failed to insert the measures");
    assert!(measures.iter().all(|v| v.id > 0));

    let top = brick
        .order_by("amount", Order::Desc)
        .unwrap()
        .limit(2)
        .find::<Measure>()
        .expect("Failed to find the largest measures");
    assert_eq!(labels(&top), ["delta", "echo"]);

    let page = brick
        .order_by("label", Order::Asc)
        .unwrap()
        .limit(2)
        .offset(1)
        .find::<Measure>()
        .expect("Failed to find the second page");
    assert_eq!(labels(&page), ["bravo", "charlie"]);

    let skipped = brick
        .order_by("label", Order::Asc)
        .unwrap()
        .offset(3)
        .find::<Measure>()
        .expect("Failed to skip the first measures");
    assert_eq!(labels(&skipped), ["delta", "echo"]);

    let none = brick
        .filter(Condition::is_in("id", Vec::<i64>::new()))
        .unwrap()
        .find::<Measure>()
        .expect("Failed to find with an empty list");
    assert!(none.is_empty());

    let between = brick
        .filter(Condition::between("amount", 2.0, 6.0))
        .unwrap()
        .order_by("amount", Order::Asc)
        .unwrap()
        .find::<Measure>()
        .expect("Failed to find between");
    assert_eq!(labels(&between), ["charlie", "bravo", "echo"]);

    let untagged = brick
        .filter(Condition::is_null("tag"))
        .unwrap()
        .count()
        .expect("Failed to count the untagged measures");
    assert_eq!(untagged, 2);

    let either = brick
        .filter(Condition::like("label", "a%"))
        .unwrap()
        .or(Condition::eq("amount", 8.0))
        .unwrap()
        .order_by("label", Order::Asc)
        .unwrap()
        .find::<Measure>()
        .expect("Failed to find with an alternative");
    assert_eq!(labels(&either), ["alpha", "delta"]);

    // (tag = 'x' OR tag = 'y') AND amount > 2
    let grouped = brick
        .filter(Condition::gt("amount", 2.0))
        .unwrap()
        .and_group(
            SearchList::from(Condition::eq("tag", "x")).or(Condition::eq("tag", "y")),
        )
        .unwrap()
        .order_by("label", Order::Asc)
        .unwrap()
        .find::<Measure>()
        .expect("Failed to find with a group");
    assert_eq!(labels(&grouped), ["charlie", "echo"]);

    let negated = brick
        .filter(Condition::not_null("tag"))
        .unwrap()
        .not()
        .count()
        .expect("Failed to count the negated filter");
    assert_eq!(negated, 2);

    brick
        .filter(Condition::is_null("tag"))
        .unwrap()
        .update_where([("tag", Value::from("z"))])
        .expect("Failed to tag the remaining measures");
    assert_eq!(
        brick
            .filter(Condition::eq("tag", "z"))
            .unwrap()
            .count()
            .unwrap(),
        2
    );

    let only_labels = brick
        .bind_fields(&["id", "label"])
        .unwrap()
        .order_by("label", Order::Asc)
        .unwrap()
        .find::<Measure>()
        .expect("Failed to find the bound fields");
    assert_eq!(only_labels.len(), 5);
    assert!(only_labels.iter().all(|v| v.amount == 0.0 && v.tag.is_none()));

    assert!(brick.update_where([("tag", Value::from("w"))]).is_err());
    brick
        .filter(Condition::lt("amount", 3.0))
        .unwrap()
        .delete_where()
        .expect("Failed to delete the small measures");
    assert_eq!(brick.count().unwrap(), 3);
}
