use masonry::{Condition, Database, Entity, Order};

#[derive(Entity, Debug, Clone, Default, PartialEq)]
struct Writer {
    #[masonry(primary_key, auto_increment)]
    id: i64,
    name: String,
    novels: Vec<Novel>,
    #[masonry(many_to_many)]
    genres: Vec<Genre>,
}

#[derive(Entity, Debug, Clone, Default, PartialEq)]
struct Novel {
    #[masonry(primary_key, auto_increment)]
    id: i64,
    writer_id: i64,
    title: String,
    house_id: Option<i64>,
    house: Option<House>,
}

#[derive(Entity, Debug, Clone, Default, PartialEq)]
struct House {
    #[masonry(primary_key, auto_increment)]
    id: i64,
    name: String,
}

#[derive(Entity, Debug, Clone, Default, PartialEq)]
struct Genre {
    #[masonry(primary_key, auto_increment)]
    id: i64,
    label: String,
}

fn novel(title: &str, house: Option<&str>) -> Novel {
    Novel {
        title: title.into(),
        house: house.map(|name| House {
            name: name.into(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn genre(label: &str) -> Genre {
    Genre {
        label: label.into(),
        ..Default::default()
    }
}

pub fn relations(database: &Database) {
    let brick = database
        .brick::<Writer>()
        .expect("Failed to get the Writer brick")
        .preload_with("novels", |novels| novels.preload("house"))
        .expect("Failed to preload the novels")
        .preload("genres")
        .expect("Failed to preload the genres");
    brick
        .drop_table_if_exists()
        .expect("Failed to drop the Writer tables");
    brick
        .create_table()
        .expect("Failed to create the Writer tables");

    let mut writers = vec![
        Writer {
            name: "Austen".into(),
            novels: vec![novel("Emma", Some("Murray")), novel("Persuasion", None)],
            genres: vec![genre("romance"), genre("satire")],
            ..Default::default()
        },
        Writer {
            name: "Melville".into(),
            novels: vec![novel("Moby Dick", Some("Bentley"))],
            ..Default::default()
        },
    ];
    brick
        .insert(&mut writers)
        .expect("Failed to insert the writers");
    for writer in &writers {
        assert!(writer.id > 0);
        for novel in &writer.novels {
            assert!(novel.id > 0);
            assert_eq!(novel.writer_id, writer.id);
            assert_eq!(novel.house_id, novel.house.as_ref().map(|v| v.id));
        }
    }
    assert!(writers[0].genres.iter().all(|v| v.id > 0));

    let novels = database.brick::<Novel>().unwrap();
    let houses = database.brick::<House>().unwrap();
    let genres = database.brick::<Genre>().unwrap();
    assert_eq!(novels.count().unwrap(), 3);
    assert_eq!(houses.count().unwrap(), 2);
    assert_eq!(genres.count().unwrap(), 2);

    let mut found = brick
        .order_by("name", Order::Asc)
        .unwrap()
        .find::<Writer>()
        .expect("Failed to find the writers");
    assert_eq!(found.len(), 2);
    for writer in &mut found {
        writer.novels.sort_by(|a, b| a.title.cmp(&b.title));
        writer.genres.sort_by(|a, b| a.label.cmp(&b.label));
    }
    let austen = &found[0];
    assert_eq!(austen.name, "Austen");
    assert_eq!(austen.novels.len(), 2);
    assert_eq!(austen.novels[0].title, "Emma");
    assert_eq!(
        austen.novels[0].house.as_ref().map(|v| v.name.as_str()),
        Some("Murray")
    );
    assert_eq!(austen.novels[1].house, None);
    assert_eq!(
        austen.genres.iter().map(|v| v.label.as_str()).collect::<Vec<_>>(),
        ["romance", "satire"]
    );
    let melville = &found[1];
    assert_eq!(melville.novels.len(), 1);
    assert!(melville.genres.is_empty());

    // A plain brick leaves the relation fields empty
    let bare = database
        .brick::<Writer>()
        .unwrap()
        .filter(Condition::eq("name", "Austen"))
        .unwrap()
        .find_one::<Writer>()
        .expect("Failed to query Austen")
        .expect("Failed to find Austen");
    assert!(bare.novels.is_empty());

    // Inserting never takes over a novel that already exists
    let emma = found[0].novels[0].clone();
    let mut thief = Writer {
        name: "Thief".into(),
        novels: vec![Novel {
            title: "Stolen".into(),
            house: None,
            ..emma.clone()
        }],
        ..Default::default()
    };
    assert!(brick.insert_one(&mut thief).is_err());
    let stored = novels
        .filter(Condition::eq("id", emma.id))
        .unwrap()
        .find_one::<Novel>()
        .expect("Failed to query Emma")
        .expect("Failed to find Emma");
    assert_eq!(stored.title, "Emma");
    assert_eq!(stored.writer_id, found[0].id);
    assert!(thief.id > 0, "The writer went in before its novels");
    database
        .brick::<Writer>()
        .unwrap()
        .hard_delete_one(&mut thief)
        .expect("Failed to delete the Thief writer");
    assert_eq!(brick.count().unwrap(), 2);
    assert_eq!(novels.count().unwrap(), 3);

    // Saving again adds the new novel and keeps the existing links
    let mut austen = found[0].clone();
    austen.novels.push(novel("Sanditon", None));
    brick
        .save_one(&mut austen)
        .expect("Failed to save Austen");
    assert_eq!(novels.count().unwrap(), 4);
    assert_eq!(genres.count().unwrap(), 2);

    // Deleting a writer removes their novels, the novels houses and the genre links
    brick
        .hard_delete_one(&mut austen)
        .expect("Failed to delete Austen");
    assert_eq!(brick.count().unwrap(), 1);
    assert_eq!(novels.count().unwrap(), 1);
    assert_eq!(houses.count().unwrap(), 1);
    assert_eq!(genres.count().unwrap(), 2);
    let remaining = brick
        .find::<Writer>()
        .expect("Failed to find the remaining writers");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].novels[0].title, "Moby Dick");

    brick
        .drop_table()
        .expect("Failed to drop the Writer tables");
    assert!(!novels.has_table().unwrap());
}
