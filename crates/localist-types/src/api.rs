use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Coordinates, Listing, User};

// -- JWT Claims --

/// Bearer token claims issued on sign-up/sign-in and checked by the API
/// middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

// -- Listings --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateListingRequest {
    pub business_name: String,
    pub description: String,
    pub category: String,
    pub address: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub offers_delivery: bool,
    #[serde(default)]
    pub is_special_offer: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateListingRequest {
    pub business_name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub address: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub offers_delivery: Option<bool>,
    pub is_special_offer: Option<bool>,
}

/// One page of the browse feed.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListingPage {
    pub listings: Vec<Listing>,
    /// Pass back as `cursor` to continue after the last fetched record.
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapMarker {
    pub id: Uuid,
    pub business_name: String,
    pub category: String,
    pub lat: f64,
    pub lng: f64,
}

// -- Interactions --

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionState {
    pub liked: bool,
    pub saved: bool,
}

/// Result of a like/save toggle: the caller's flags plus the listing's
/// counters after the write.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ToggleResponse {
    pub liked: bool,
    pub saved: bool,
    pub likes: i64,
    pub saves: i64,
}

// -- Seed --

#[derive(Debug, Serialize, Deserialize)]
pub struct SeedListingsResponse {
    pub created: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
