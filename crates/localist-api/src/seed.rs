//! Development data: default categories and two sample listings.

use axum::{Extension, extract::State};
use chrono::Duration;
use tracing::info;
use uuid::Uuid;

use localist_db::models::CategoryRow;
use localist_db::{ImageAppend, NewListing, format_timestamp};
use localist_types::api::{Claims, SeedListingsResponse};
use localist_types::models::Category;

use crate::error::ApiError;
use crate::extract::Json;
use crate::{AppState, db_call};

struct Sample {
    business_name: &'static str,
    address: &'static str,
    lat: f64,
    lng: f64,
    category: &'static str,
    description: &'static str,
    image: &'static str,
}

const SAMPLES: &[Sample] = &[
    Sample {
        business_name: "Delicious Bites",
        address: "123 Main St, New York, NY",
        lat: 40.7128,
        lng: -74.0060,
        category: "restaurants",
        description: "A cozy restaurant serving delicious homemade meals with fresh, locally-sourced \
                      ingredients. Our menu changes seasonally to offer the best flavors year-round.",
        image: "https://images.unsplash.com/photo-1517248135467-4c7edcad34c4?auto=format&fit=crop&w=800&q=60",
    },
    Sample {
        business_name: "The Coffee Spot",
        address: "456 Elm St, Los Angeles, CA",
        lat: 34.0522,
        lng: -118.2437,
        category: "cafes",
        description: "A welcoming café offering a wide selection of freshly brewed coffee, artisanal \
                      pastries, and a cozy environment for work or relaxation.",
        image: "https://images.unsplash.com/photo-1495474472287-4d71bcdd2085?auto=format&fit=crop&w=800&q=60",
    },
];

/// POST /seed/categories
pub async fn seed_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    let rows = db_call(&state, |db| {
        let added = db.seed_categories()?;
        info!("Seed: {} categories added", added);
        db.list_categories()
    })
    .await?;

    Ok(Json(rows.into_iter().map(CategoryRow::into_category).collect()))
}

/// POST /seed/listings: Sample listings for the caller, once.
pub async fn seed_listings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<SeedListingsResponse>, ApiError> {
    let owner_id = claims.sub.to_string();

    let created = db_call(&state, move |db| {
        if db.count_listings_by_owner(&owner_id)? > 0 {
            info!("Seed: {} already owns listings, skipping", owner_id);
            return Ok(0);
        }
        let owner = db
            .get_user_by_id(&owner_id)?
            .ok_or_else(|| anyhow::anyhow!("seeding for unknown user {}", owner_id))?;
        db.seed_categories()?;

        let base = chrono::Utc::now();
        for (i, sample) in SAMPLES.iter().enumerate() {
            let listing = NewListing {
                id: Uuid::new_v4().to_string(),
                owner_id: owner_id.clone(),
                owner_name: owner.display_name.clone(),
                business_name: sample.business_name.to_string(),
                description: sample.description.to_string(),
                category: sample.category.to_string(),
                address: sample.address.to_string(),
                lat: sample.lat,
                lng: sample.lng,
                offers_delivery: false,
                is_special_offer: false,
                // Later samples sort first, as if created after the earlier ones
                created_at: format_timestamp(base + Duration::milliseconds(i as i64)),
            };
            db.insert_listing(&listing)?;
            let appended =
                db.append_listing_images(&listing.id, &[(None, sample.image.to_string())], &listing.created_at)?;
            if appended != ImageAppend::Appended {
                anyhow::bail!("seed listing {} rejected its image: {:?}", listing.id, appended);
            }
        }
        Ok(SAMPLES.len())
    })
    .await?;

    Ok(Json(SeedListingsResponse { created }))
}
