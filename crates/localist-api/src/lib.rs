pub mod auth;
pub mod categories;
pub mod cursor;
pub mod error;
pub mod extract;
pub mod geocode;
pub mod images;
pub mod interactions;
pub mod listings;
pub mod middleware;
pub mod seed;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tracing::error;

use localist_db::Database;
use localist_storage::Storage;

use crate::error::ApiError;
use crate::geocode::Geocoder;
use crate::middleware::require_auth;

pub use localist_db::MAX_IMAGES_PER_LISTING;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub storage: Storage,
    pub geocoder: Geocoder,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub max_image_bytes: usize,
}

pub fn router(state: AppState) -> Router {
    // Multipart framing overhead on top of the raw image bytes
    let upload_limit = state.max_image_bytes * MAX_IMAGES_PER_LISTING + 64 * 1024;

    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/signup", post(auth::sign_up))
        .route("/auth/signin", post(auth::sign_in))
        .route("/categories", get(categories::list_categories))
        .route("/listings", get(listings::list_listings))
        .route("/listings/special-offers", get(listings::special_offers))
        .route("/listings/{id}", get(listings::get_listing))
        .route("/users/{owner_id}/listings", get(listings::owner_listings))
        .route("/map/markers", get(listings::map_markers))
        .route("/images/{key}", get(images::get_image))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/listings", post(listings::create_listing))
        .route(
            "/listings/{id}",
            axum::routing::patch(listings::update_listing).delete(listings::delete_listing),
        )
        .route(
            "/listings/{id}/images",
            post(images::upload_images).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/listings/{id}/like", post(interactions::toggle_like))
        .route("/listings/{id}/save", post(interactions::toggle_save))
        .route("/listings/{id}/interaction", get(interactions::get_interaction))
        .route("/users/me/saved", get(interactions::saved_listings))
        .route("/seed/categories", post(seed::seed_categories))
        .route("/seed/listings", post(seed::seed_listings))
        .layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

async fn health() -> &'static str {
    "ok"
}

/// Run blocking SQLite work off the async runtime.
pub(crate) async fn db_call<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })?
        .map_err(ApiError::Internal)
}
