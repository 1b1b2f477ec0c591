use masonry::{Condition, Database, Entity};

#[derive(Entity, Debug, Clone, Default, PartialEq)]
struct Person {
    #[masonry(primary_key, auto_increment)]
    id: i64,
    name: String,
    #[masonry(many_to_many)]
    friends: Vec<Person>,
}

fn names(people: &[Person]) -> Vec<&str> {
    people.iter().map(|v| v.name.as_str()).collect()
}

pub fn friends(database: &Database) {
    let brick = database
        .brick::<Person>()
        .expect("Failed to get the Person brick")
        .preload("friends")
        .expect("Failed to preload the friends");
    brick
        .drop_table_if_exists()
        .expect("Failed to drop the Person tables");
    brick
        .create_table()
        .expect("Failed to create the Person tables");
    let links = database
        .brick_named("person_person")
        .expect("The junction should be registered");

    let mut ada = Person {
        name: "Ada".into(),
        friends: vec![Person {
            name: "Bea".into(),
            ..Default::default()
        }],
        ..Default::default()
    };
    brick.insert_one(&mut ada).expect("Failed to insert Ada");
    let bea_id = ada.friends[0].id;
    assert!(ada.id > 0 && bea_id > 0 && ada.id != bea_id);
    assert_eq!(brick.count().unwrap(), 2);
    assert_eq!(links.count().unwrap(), 1);

    let by_name = |name: &str| Condition::eq("name", name);
    let found = brick
        .filter(by_name("Ada"))
        .unwrap()
        .find_one::<Person>()
        .expect("Failed to query Ada")
        .expect("Failed to find Ada");
    assert_eq!(names(&found.friends), ["Bea"]);
    let bea = brick
        .filter(by_name("Bea"))
        .unwrap()
        .find_one::<Person>()
        .expect("Failed to query Bea")
        .expect("Failed to find Bea");
    assert!(bea.friends.is_empty(), "The link goes from Ada to Bea");

    // From the other side of the junction Bea sees Ada
    let befriended = database
        .brick::<Person>()
        .unwrap()
        .right_preload("friends")
        .expect("Failed to preload the friends from the right")
        .filter(by_name("Bea"))
        .unwrap()
        .find_one::<Person>()
        .expect("Failed to query Bea")
        .expect("Failed to find Bea");
    assert_eq!(names(&befriended.friends), ["Ada"]);

    // Deleting Ada drops the link, Bea stays
    brick
        .hard_delete_one(&mut ada)
        .expect("Failed to delete Ada");
    assert_eq!(links.count().unwrap(), 0);
    let left = brick.find::<Person>().expect("Failed to find the people");
    assert_eq!(names(&left), ["Bea"]);
    assert!(left[0].friends.is_empty());

    brick
        .drop_table()
        .expect("Failed to drop the Person tables");
    assert!(!links.has_table().unwrap());
}
