use crate::listings::NewListing;
use crate::models::UserRow;
use crate::Database;

pub fn user(id: &str, email: &str) -> UserRow {
    UserRow {
        id: id.to_string(),
        email: email.to_string(),
        password: "hash".to_string(),
        display_name: "Owner".to_string(),
        photo_url: None,
        business_name: Some("Shop".to_string()),
        created_at: "2024-01-01T00:00:00.000Z".to_string(),
    }
}

/// In-memory database with categories seeded and two users, `u1` and `u2`.
pub fn seeded_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.seed_categories().unwrap();
    db.create_user(&user("u1", "one@example.com")).unwrap();
    db.create_user(&user("u2", "two@example.com")).unwrap();
    db
}

/// Listing owned by `u1`, created `minute` minutes past the epoch hour.
pub fn listing(id: &str, category: &str, minute: u32) -> NewListing {
    NewListing {
        id: id.to_string(),
        owner_id: "u1".to_string(),
        owner_name: "Owner".to_string(),
        business_name: format!("Business {id}"),
        description: "A neighbourhood business".to_string(),
        category: category.to_string(),
        address: "1 Main St".to_string(),
        lat: 40.0,
        lng: -74.0,
        offers_delivery: false,
        is_special_offer: false,
        created_at: format!("2024-01-01T10:{minute:02}:00.000Z"),
    }
}
