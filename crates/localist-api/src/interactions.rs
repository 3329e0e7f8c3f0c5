use axum::{Extension, extract::State};
use tracing::debug;
use uuid::Uuid;

use localist_db::InteractionKind;
use localist_types::api::{Claims, InteractionState, ToggleResponse};
use localist_types::models::Listing;

use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::listings::into_listings;
use crate::{AppState, db_call};

pub async fn toggle_like(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ToggleResponse>, ApiError> {
    toggle(&state, id, &claims, InteractionKind::Like).await
}

pub async fn toggle_save(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ToggleResponse>, ApiError> {
    toggle(&state, id, &claims, InteractionKind::Save).await
}

async fn toggle(
    state: &AppState,
    listing_id: Uuid,
    claims: &Claims,
    kind: InteractionKind,
) -> Result<Json<ToggleResponse>, ApiError> {
    let user_id = claims.sub.to_string();
    let listing = listing_id.to_string();
    let outcome = db_call(state, move |db| {
        db.toggle_interaction(&user_id, &listing, kind, &localist_db::timestamp_now())
    })
    .await?
    .ok_or(ApiError::NotFound)?;

    debug!("{:?} toggled on {} by {}: {:?}", kind, listing_id, claims.sub, outcome);
    Ok(Json(ToggleResponse {
        liked: outcome.liked,
        saved: outcome.saved,
        likes: outcome.likes,
        saves: outcome.saves,
    }))
}

/// GET /listings/{id}/interaction: The caller's flags; both false before
/// the first like/save.
pub async fn get_interaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<InteractionState>, ApiError> {
    let user_id = claims.sub.to_string();
    let listing = id.to_string();
    let record = db_call(&state, move |db| db.get_interaction(&user_id, &listing)).await?;

    Ok(Json(
        record
            .map(|r| InteractionState {
                liked: r.liked,
                saved: r.saved,
            })
            .unwrap_or_default(),
    ))
}

/// GET /users/me/saved
pub async fn saved_listings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Listing>>, ApiError> {
    let user_id = claims.sub.to_string();
    let rows = db_call(&state, move |db| db.list_saved_listings(&user_id)).await?;
    Ok(Json(into_listings(rows)))
}
