use masonry::{Condition, Database, Entity};
use rust_decimal::Decimal;
use std::str::FromStr;
use time::{Date, Month, Time};
use uuid::Uuid;

#[derive(Entity, Debug, Clone, Default, PartialEq)]
struct Gadget {
    #[masonry(primary_key)]
    id: Uuid,
    name: String,
    weight: Option<f64>,
    price: Decimal,
    released: Option<Date>,
    alarm: Option<Time>,
    active: bool,
    payload: Vec<u8>,
    stock: u32,
    delta: i16,
}

pub fn simple(database: &Database) {
    let brick = database
        .brick::<Gadget>()
        .expect("Failed to get the Gadget brick");
    brick
        .drop_table_if_exists()
        .expect("Failed to drop the Gadget table");
    brick
        .create_table()
        .expect("Failed to create the Gadget table");
    assert!(brick.has_table().expect("Failed to look for the Gadget table"));

    let mut gadgets = vec![
        Gadget {
            id: Uuid::new_v4(),
            name: "Lamp".into(),
            weight: Some(1.25),
            price: Decimal::from_str("12.50").unwrap(),
            released: Some(Date::from_calendar_date(2021, Month::June, 3).unwrap()),
            alarm: Some(Time::from_hms(7, 30, 0).unwrap()),
            active: true,
            payload: vec![1, 2, 3],
            stock: 40,
            delta: -3,
        },
        Gadget {
            id: Uuid::new_v4(),
            name: "Kettle".into(),
            weight: None,
            price: Decimal::from_str("30").unwrap(),
            released: None,
            alarm: None,
            active: false,
            payload: vec![255],
            stock: 0,
            delta: 0,
        },
    ];
    let expected = gadgets.clone();
    brick
        .insert(&mut gadgets)
        .expect("Failed to insert the gadgets");
    assert_eq!(gadgets, expected);
    assert_eq!(brick.count().expect("Failed to count the gadgets"), 2);

    let lamp = brick
        .filter(Condition::eq("id", expected[0].id))
        .expect("Failed to filter by id")
        .find_one::<Gadget>()
        .expect("Failed to query the lamp")
        .expect("Failed to find the lamp");
    assert_eq!(lamp, expected[0]);
    let kettle = brick
        .filter(Condition::eq("name", "Kettle"))
        .expect("Failed to filter by name")
        .find_one::<Gadget>()
        .expect("Failed to query the kettle")
        .expect("Failed to find the kettle");
    assert_eq!(kettle, expected[1]);

    // Save replaces the whole row
    let mut changed = Gadget {
        name: "Brass lamp".into(),
        weight: None,
        ..lamp.clone()
    };
    brick
        .save_one(&mut changed)
        .expect("Failed to save the lamp");
    let lamp = brick
        .filter(Condition::eq("id", expected[0].id))
        .unwrap()
        .find_one::<Gadget>()
        .expect("Failed to query the saved lamp")
        .expect("Failed to find the saved lamp");
    assert_eq!(lamp.name, "Brass lamp");
    assert_eq!(lamp.weight, None);
    assert_eq!(brick.count().unwrap(), 2);

    // Update leaves zero values alone
    let mut partial = Gadget {
        id: expected[1].id,
        stock: 15,
        ..Default::default()
    };
    brick
        .update_one(&mut partial)
        .expect("Failed to update the kettle");
    let kettle = brick
        .filter(Condition::eq("name", "Kettle"))
        .unwrap()
        .find_one::<Gadget>()
        .expect("Failed to query the updated kettle")
        .expect("Failed to find the updated kettle");
    assert_eq!(kettle.stock, 15);
    assert_eq!(kettle.price, expected[1].price);
    assert_eq!(kettle.payload, expected[1].payload);

    let mut lamp = lamp;
    brick
        .delete_one(&mut lamp)
        .expect("Failed to delete the lamp");
    assert_eq!(brick.count().unwrap(), 1);

    brick.drop_table().expect("Failed to drop the Gadget table");
    assert!(!brick.has_table().unwrap());
}
