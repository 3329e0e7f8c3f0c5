use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use localist_db::models::ListingRow;
use localist_db::{ListingChanges, ListingFilter, NewListing, PageCursor};
use localist_types::api::{Claims, CreateListingRequest, ListingPage, MapMarker, UpdateListingRequest};
use localist_types::models::{Coordinates, Listing};

use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::geocode::valid_coordinates;
use crate::{AppState, cursor, db_call};

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 50;
const DEFAULT_SPECIAL_OFFERS: u32 = 5;
const MAX_SPECIAL_OFFERS: u32 = 20;

const MIN_NAME_LEN: usize = 2;
const MIN_ADDRESS_LEN: usize = 5;
const MIN_DESCRIPTION_LEN: usize = 10;
const MAX_DESCRIPTION_LEN: usize = 500;

#[derive(Debug, Deserialize)]
pub struct ListingQuery {
    pub category: Option<String>,
    pub location: Option<String>,
    /// Free text matched against business name and description.
    pub q: Option<String>,
    #[serde(default = "default_page_size")]
    pub limit: u32,
    pub cursor: Option<String>,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct MarkerQuery {
    pub category: Option<String>,
}

/// GET /listings: One page of the feed, newest first.
///
/// Category and location are matched by the store. The text query only
/// narrows the fetched page; the cursor still advances past every row the
/// store returned, so a page may come back empty while `has_more` is true.
pub async fn list_listings(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<ListingPage>, ApiError> {
    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
    let after = query.cursor.as_deref().map(cursor::decode).transpose()?;
    let filter = ListingFilter {
        category: non_blank(query.category),
        location: non_blank(query.location),
    };

    let rows = db_call(&state, move |db| db.list_listings(&filter, after.as_ref(), limit)).await?;

    let has_more = rows.len() == limit as usize;
    let next_cursor = if has_more {
        rows.last().map(|row| cursor::encode(&PageCursor::after(row)))
    } else {
        None
    };

    let needle = non_blank(query.q).map(|q| q.to_lowercase());
    let listings = rows
        .into_iter()
        .filter(|row| needle.as_deref().is_none_or(|n| matches_text(row, n)))
        .map(ListingRow::into_listing)
        .collect();

    Ok(Json(ListingPage {
        listings,
        next_cursor,
        has_more,
    }))
}

/// GET /listings/special-offers
pub async fn special_offers(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Listing>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_SPECIAL_OFFERS).clamp(1, MAX_SPECIAL_OFFERS);
    let rows = db_call(&state, move |db| db.list_special_offers(limit)).await?;
    Ok(Json(into_listings(rows)))
}

pub async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Listing>, ApiError> {
    let row = fetch_listing(&state, id).await?;
    Ok(Json(row.into_listing()))
}

/// GET /users/{owner_id}/listings: An owner's dashboard.
pub async fn owner_listings(
    State(state): State<AppState>,
    Path(owner_id): Path<Uuid>,
) -> Result<Json<Vec<Listing>>, ApiError> {
    let owner_id = owner_id.to_string();
    let rows = db_call(&state, move |db| db.list_listings_by_owner(&owner_id)).await?;
    Ok(Json(into_listings(rows)))
}

/// GET /map/markers
pub async fn map_markers(
    State(state): State<AppState>,
    Query(query): Query<MarkerQuery>,
) -> Result<Json<Vec<MapMarker>>, ApiError> {
    let category = non_blank(query.category);
    let rows = db_call(&state, move |db| db.list_located_listings(category.as_deref())).await?;

    let markers = rows
        .into_iter()
        .map(|row| {
            let listing = row.into_listing();
            MapMarker {
                id: listing.id,
                business_name: listing.business_name,
                category: listing.category,
                lat: listing.location.coordinates.lat,
                lng: listing.location.coordinates.lng,
            }
        })
        .collect();

    Ok(Json(markers))
}

pub async fn create_listing(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateListingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let business_name = validate_business_name(&req.business_name)?;
    let address = validate_address(&req.address)?;
    let description = validate_description(&req.description)?;
    let explicit = req.coordinates.map(checked_coordinates).transpose()?;
    ensure_category(&state, &req.category).await?;

    let owner_id = claims.sub.to_string();
    let lookup = owner_id.clone();
    let owner = db_call(&state, move |db| db.get_user_by_id(&lookup))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let coords = match explicit {
        Some(c) => c,
        None => resolve(&state, &address).await,
    };

    let id = Uuid::new_v4();
    let new = NewListing {
        id: id.to_string(),
        owner_id,
        owner_name: owner.display_name,
        business_name,
        description,
        category: req.category,
        address,
        lat: coords.lat,
        lng: coords.lng,
        offers_delivery: req.offers_delivery,
        is_special_offer: req.is_special_offer,
        created_at: localist_db::timestamp_now(),
    };

    let row = db_call(&state, move |db| {
        db.insert_listing(&new)?;
        db.get_listing(&new.id)?
            .ok_or_else(|| anyhow::anyhow!("listing {} vanished after insert", new.id))
    })
    .await?;

    info!("Listing {} created by {}", id, claims.sub);
    Ok((StatusCode::CREATED, Json(row.into_listing())))
}

pub async fn update_listing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateListingRequest>,
) -> Result<Json<Listing>, ApiError> {
    let current = fetch_owned_listing(&state, id, &claims).await?;

    let mut changes = ListingChanges {
        business_name: req.business_name.as_deref().map(validate_business_name).transpose()?,
        address: req.address.as_deref().map(validate_address).transpose()?,
        description: req.description.as_deref().map(validate_description).transpose()?,
        coordinates: req
            .coordinates
            .map(checked_coordinates)
            .transpose()?
            .map(|c| (c.lat, c.lng)),
        offers_delivery: req.offers_delivery,
        is_special_offer: req.is_special_offer,
        category: None,
    };
    if let Some(category) = req.category {
        ensure_category(&state, &category).await?;
        changes.category = Some(category);
    }

    // A moved business needs fresh coordinates unless the owner supplied them
    if changes.coordinates.is_none()
        && let Some(address) = changes.address.as_deref().filter(|a| *a != current.address)
    {
        let c = resolve(&state, address).await;
        changes.coordinates = Some((c.lat, c.lng));
    }

    let key = id.to_string();
    let row = db_call(&state, move |db| {
        if !db.update_listing(&key, &changes, &localist_db::timestamp_now())? {
            return Ok(None);
        }
        db.get_listing(&key)
    })
    .await?
    .ok_or(ApiError::NotFound)?;

    Ok(Json(row.into_listing()))
}

pub async fn delete_listing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    fetch_owned_listing(&state, id, &claims).await?;

    let key = id.to_string();
    let blob_keys = db_call(&state, move |db| db.delete_listing(&key))
        .await?
        .ok_or(ApiError::NotFound)?;

    for blob in &blob_keys {
        if let Err(e) = state.storage.delete(blob).await {
            warn!("Failed to delete image {} of listing {}: {}", blob, id, e);
        }
    }

    info!("Listing {} deleted by {}", id, claims.sub);
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn fetch_listing(state: &AppState, id: Uuid) -> Result<ListingRow, ApiError> {
    let key = id.to_string();
    db_call(state, move |db| db.get_listing(&key))
        .await?
        .ok_or(ApiError::NotFound)
}

/// Fetch a listing the caller owns: 404 if missing, 403 if someone else's.
pub(crate) async fn fetch_owned_listing(
    state: &AppState,
    id: Uuid,
    claims: &Claims,
) -> Result<ListingRow, ApiError> {
    let row = fetch_listing(state, id).await?;
    if row.owner_id != claims.sub.to_string() {
        return Err(ApiError::Forbidden);
    }
    Ok(row)
}

pub(crate) fn into_listings(rows: Vec<ListingRow>) -> Vec<Listing> {
    rows.into_iter().map(ListingRow::into_listing).collect()
}

async fn ensure_category(state: &AppState, category: &str) -> Result<(), ApiError> {
    let id = category.to_string();
    if db_call(state, move |db| db.category_exists(&id)).await? {
        Ok(())
    } else {
        Err(ApiError::bad_request("Please select a category."))
    }
}

/// Geocode an address, falling back to the unknown location.
async fn resolve(state: &AppState, address: &str) -> Coordinates {
    state.geocoder.lookup(address).await.unwrap_or(Coordinates::UNKNOWN)
}

/// Case-insensitive substring match on name or description. `needle` must
/// already be lowercase.
fn matches_text(row: &ListingRow, needle: &str) -> bool {
    row.business_name.to_lowercase().contains(needle) || row.description.to_lowercase().contains(needle)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn checked_coordinates(c: Coordinates) -> Result<Coordinates, ApiError> {
    valid_coordinates(c).ok_or_else(|| ApiError::bad_request("Coordinates are out of range."))
}

fn validate_business_name(raw: &str) -> Result<String, ApiError> {
    let name = raw.trim();
    if name.chars().count() < MIN_NAME_LEN {
        return Err(ApiError::bad_request("Business name must be at least 2 characters."));
    }
    Ok(name.to_string())
}

fn validate_address(raw: &str) -> Result<String, ApiError> {
    let address = raw.trim();
    if address.chars().count() < MIN_ADDRESS_LEN {
        return Err(ApiError::bad_request("Address must be at least 5 characters."));
    }
    Ok(address.to_string())
}

fn validate_description(raw: &str) -> Result<String, ApiError> {
    let description = raw.trim();
    let len = description.chars().count();
    if len < MIN_DESCRIPTION_LEN {
        return Err(ApiError::bad_request("Description must be at least 10 characters."));
    }
    if len > MAX_DESCRIPTION_LEN {
        return Err(ApiError::bad_request("Description must not exceed 500 characters."));
    }
    Ok(description.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, description: &str) -> ListingRow {
        ListingRow {
            id: Uuid::new_v4().to_string(),
            owner_id: Uuid::new_v4().to_string(),
            owner_name: "Owner".into(),
            business_name: name.into(),
            description: description.into(),
            category: "cafes".into(),
            address: "1 Main St".into(),
            lat: 0.0,
            lng: 0.0,
            offers_delivery: false,
            is_special_offer: false,
            likes: 0,
            saves: 0,
            created_at: "2024-01-01T00:00:00.000Z".into(),
            updated_at: "2024-01-01T00:00:00.000Z".into(),
            images: vec![],
        }
    }

    #[test]
    fn text_match_covers_name_and_description() {
        let cafe = row("The Coffee Spot", "Freshly brewed espresso");
        assert!(matches_text(&cafe, "coffee"));
        assert!(matches_text(&cafe, "espresso"));
        assert!(matches_text(&cafe, "spot"));
        assert!(!matches_text(&cafe, "pizza"));
    }

    #[test]
    fn validation_bounds() {
        assert!(validate_business_name(" A ").is_err());
        assert_eq!(validate_business_name(" Ab ").unwrap(), "Ab");
        assert!(validate_address("1 Ma").is_err());
        assert!(validate_description("too short").is_err());
        assert!(validate_description(&"x".repeat(500)).is_ok());
        assert!(validate_description(&"x".repeat(501)).is_err());
    }

    #[test]
    fn coordinates_must_be_on_the_globe() {
        assert!(checked_coordinates(Coordinates { lat: 40.7, lng: -74.0 }).is_ok());
        assert!(checked_coordinates(Coordinates { lat: 100.0, lng: 0.0 }).is_err());
        assert!(checked_coordinates(Coordinates { lat: 0.0, lng: -181.0 }).is_err());
    }

    #[test]
    fn blank_filters_are_ignored() {
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(Some(" cafes ".into())), Some("cafes".into()));
    }
}
