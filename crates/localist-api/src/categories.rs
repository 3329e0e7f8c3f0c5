use axum::extract::State;
use tracing::info;

use localist_db::models::CategoryRow;
use localist_types::models::Category;

use crate::error::ApiError;
use crate::extract::Json;
use crate::{AppState, db_call};

/// GET /categories: Seeds the reference set on first use.
pub async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    let rows = db_call(&state, |db| {
        let rows = db.list_categories()?;
        if !rows.is_empty() {
            return Ok(rows);
        }
        let added = db.seed_categories()?;
        info!("Seeded {} default categories", added);
        db.list_categories()
    })
    .await?;

    Ok(Json(rows.into_iter().map(CategoryRow::into_category).collect()))
}
