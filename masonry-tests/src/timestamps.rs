use masonry::{Condition, Database, Entity};
use time::PrimitiveDateTime;

#[derive(Entity, Debug, Clone, Default, PartialEq)]
#[table_name("journal_entry")]
struct Entry {
    #[masonry(primary_key, auto_increment)]
    id: i64,
    body: String,
    #[masonry(created_at)]
    created_at: Option<PrimitiveDateTime>,
    #[masonry(updated_at)]
    updated_at: Option<PrimitiveDateTime>,
}

pub fn timestamps(database: &Database) {
    let brick = database
        .brick::<Entry>()
        .expect("Failed to get the Entry brick");
    assert_eq!(brick.model().name(), "journal_entry");
    brick
        .drop_table_if_exists()
        .expect("Failed to drop the Entry table");
    brick
        .create_table()
        .expect("Failed to create the Entry table");

    let mut entry = Entry {
        body: "first".into(),
        ..Default::default()
    };
    brick
        .insert_one(&mut entry)
        .expect("Failed to insert the entry");
    assert!(entry.id > 0);
    assert!(entry.created_at.is_some());
    assert!(entry.updated_at.is_some());

    let by_id = brick
        .filter(Condition::eq("id", entry.id))
        .expect("Failed to filter by id");
    let stored = by_id
        .find_one::<Entry>()
        .expect("Failed to query the entry")
        .expect("Failed to find the entry");
    assert_eq!(stored, entry);

    // Saving without the creation stamp keeps the stored one
    let mut changed = Entry {
        body: "second".into(),
        created_at: None,
        ..stored.clone()
    };
    brick
        .save_one(&mut changed)
        .expect("Failed to save the entry");
    assert_eq!(changed.created_at, stored.created_at);
    assert!(changed.updated_at.is_some());
    let saved = by_id
        .find_one::<Entry>()
        .expect("Failed to query the saved entry")
        .expect("Failed to find the saved entry");
    assert_eq!(saved.body, "second");
    assert_eq!(saved.created_at, stored.created_at);

    // An empty body is a zero value, it is not written by an update
    let mut touch = Entry {
        id: entry.id,
        ..Default::default()
    };
    brick
        .update_one(&mut touch)
        .expect("Failed to update the entry");
    assert!(touch.updated_at.is_some());
    let touched = by_id
        .find_one::<Entry>()
        .expect("Failed to query the updated entry")
        .expect("Failed to find the updated entry");
    assert_eq!(touched.body, "second");
    assert_eq!(touched.created_at, stored.created_at);
    assert_eq!(touched.updated_at, touch.updated_at);
}
