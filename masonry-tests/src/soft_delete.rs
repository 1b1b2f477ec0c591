use masonry::{Condition, Database, Entity, OperationError, Order, find_error};
use time::PrimitiveDateTime;

#[derive(Entity, Debug, Clone, Default, PartialEq)]
struct Member {
    #[masonry(primary_key, auto_increment)]
    id: i64,
    #[masonry(unique)]
    email: String,
    #[masonry(index)]
    nickname: Option<String>,
    #[masonry(deleted_at)]
    deleted_at: Option<PrimitiveDateTime>,
}

pub fn soft_delete(database: &Database) {
    let brick = database
        .brick::<Member>()
        .expect("Failed to get the Member brick");
    brick
        .drop_table_if_exists()
        .expect("Failed to drop the Member table");
    brick
        .create_table()
        .expect("Failed to create the Member table");

    let mut members: Vec<Member> = ["ann@mail.com", "bob@mail.com", "cid@mail.com", "dee@mail.com"]
        .into_iter()
        .map(|email| Member {
            email: email.into(),
            ..Default::default()
        })
        .collect();
    brick
        .insert(&mut members)
        .expect("Failed to insert the members");

    brick
        .delete_one(&mut members[0])
        .expect("Failed to delete a member");
    assert!(members[0].deleted_at.is_some());
    assert_eq!(brick.count().unwrap(), 3);
    assert_eq!(brick.unscoped().count().unwrap(), 4);
    let visible = brick
        .order_by("email", Order::Asc)
        .unwrap()
        .find::<Member>()
        .expect("Failed to find the members");
    assert_eq!(visible.len(), 3);
    assert!(visible.iter().all(|v| v.deleted_at.is_none()));
    let all = brick
        .unscoped()
        .order_by("email", Order::Asc)
        .unwrap()
        .find::<Member>()
        .expect("Failed to find every member");
    assert_eq!(all.len(), 4);
    assert_eq!(all[0].deleted_at, members[0].deleted_at);

    // Soft deleted rows are not updated
    let mut gone = members[0].clone();
    gone.nickname = Some("ghost".into());
    brick
        .update_one(&mut gone)
        .expect("Failed to run the update");
    assert_eq!(
        brick
            .unscoped()
            .filter(Condition::eq("nickname", "ghost"))
            .unwrap()
            .count()
            .unwrap(),
        0
    );

    assert!(brick.delete_where().is_err());
    // Ann is already deleted, only Bob gets stamped
    brick
        .filter(Condition::eq("email", "ann@mail.com"))
        .unwrap()
        .or(Condition::like("email", "b%"))
        .unwrap()
        .delete_where()
        .expect("Failed to delete by filter");
    assert_eq!(brick.count().unwrap(), 2);
    assert_eq!(brick.unscoped().count().unwrap(), 4);
    let ann = brick
        .unscoped()
        .filter(Condition::eq("email", "ann@mail.com"))
        .unwrap()
        .find_one::<Member>()
        .expect("Failed to query Ann")
        .expect("Failed to find Ann");
    assert_eq!(ann.deleted_at, members[0].deleted_at);

    brick
        .unscoped()
        .filter(Condition::not_null("deleted_at"))
        .unwrap()
        .hard_delete_where()
        .expect("Failed to purge the deleted members");
    assert_eq!(brick.unscoped().count().unwrap(), 2);

    brick
        .hard_delete_one(&mut members[2])
        .expect("Failed to hard delete a member");
    assert_eq!(brick.unscoped().count().unwrap(), 1);

    // The unique email is enforced by the table
    let mut duplicate = Member {
        email: "dee@mail.com".into(),
        ..Default::default()
    };
    let error = brick
        .insert_one(&mut duplicate)
        .expect_err("Inserting a duplicate email should fail");
    let failed =
        find_error::<OperationError>(&error).expect("The error should be an OperationError");
    assert_eq!(failed.operation, "Insert");
    assert_eq!(brick.count().unwrap(), 1);
}
