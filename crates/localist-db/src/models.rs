//! Database row types. These map directly to SQLite rows and stay separate
//! from the `localist-types` API models; `into_*` converts at the boundary.

use localist_types::models::{Category, Coordinates, Listing, Location, User};
use tracing::warn;
use uuid::Uuid;

use crate::parse_timestamp;

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub business_name: Option<String>,
    pub created_at: String,
}

pub struct CategoryRow {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
}

pub struct ImageRow {
    pub listing_id: String,
    pub position: i64,
    /// Object storage key; `None` for images hosted elsewhere (seed data).
    pub blob_key: Option<String>,
    pub url: String,
}

pub struct ListingRow {
    pub id: String,
    pub owner_id: String,
    pub owner_name: String,
    pub business_name: String,
    pub description: String,
    pub category: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub offers_delivery: bool,
    pub is_special_offer: bool,
    pub likes: i64,
    pub saves: i64,
    pub created_at: String,
    pub updated_at: String,
    pub images: Vec<ImageRow>,
}

pub struct InteractionRow {
    pub user_id: String,
    pub listing_id: String,
    pub liked: bool,
    pub saved: bool,
    pub created_at: String,
    pub updated_at: String,
}

fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

impl UserRow {
    pub fn into_user(self) -> User {
        User {
            id: parse_id(&self.id, "user id"),
            email: self.email,
            display_name: self.display_name,
            photo_url: self.photo_url,
            business_name: self.business_name,
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

impl CategoryRow {
    pub fn into_category(self) -> Category {
        Category {
            id: self.id,
            name: self.name,
            icon: self.icon,
        }
    }
}

impl ListingRow {
    pub fn into_listing(self) -> Listing {
        Listing {
            id: parse_id(&self.id, "listing id"),
            owner_id: parse_id(&self.owner_id, "owner id"),
            owner_name: self.owner_name,
            business_name: self.business_name,
            description: self.description,
            category: self.category,
            location: Location {
                address: self.address,
                coordinates: Coordinates {
                    lat: self.lat,
                    lng: self.lng,
                },
            },
            images: self.images.into_iter().map(|img| img.url).collect(),
            offers_delivery: self.offers_delivery,
            is_special_offer: self.is_special_offer,
            likes: self.likes,
            saves: self.saves,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        }
    }
}
