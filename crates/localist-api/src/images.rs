use axum::{
    Extension,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;
use tracing::{error, info, warn};
use uuid::Uuid;

use localist_db::ImageAppend;
use localist_types::api::Claims;
use localist_types::models::Listing;

use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::listings::fetch_owned_listing;
use crate::{AppState, MAX_IMAGES_PER_LISTING, db_call};

struct Upload {
    filename: String,
    data: Bytes,
}

/// POST /listings/{id}/images: Multipart upload. Every file part is stored
/// and its URL appended to the listing's images.
pub async fn upload_images(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Listing>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let listing = fetch_owned_listing(&state, id, &claims).await?;
    let room = MAX_IMAGES_PER_LISTING.saturating_sub(listing.images.len());

    let mut uploads = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(filename) = field.file_name().map(str::to_string) else {
            // Plain form fields carry nothing to store
            continue;
        };

        let content_type = field.content_type().unwrap_or_default().to_ascii_lowercase();
        if !content_type.starts_with("image/") {
            return Err(ApiError::bad_request(format!("{filename} is not an image.")));
        }
        // SVG can carry script that would run on our origin
        if content_type.starts_with("image/svg") || filename.to_ascii_lowercase().ends_with(".svg") {
            return Err(ApiError::bad_request("SVG images are not supported."));
        }

        let data = field.bytes().await.map_err(multipart_error)?;
        if data.is_empty() {
            return Err(ApiError::bad_request(format!("{filename} is empty.")));
        }
        if data.len() > state.max_image_bytes {
            return Err(ApiError::PayloadTooLarge);
        }

        uploads.push(Upload { filename, data });
        if uploads.len() > room {
            return Err(too_many_images());
        }
    }

    if uploads.is_empty() {
        return Err(ApiError::bad_request("No images were uploaded."));
    }

    let mut stored: Vec<(Option<String>, String)> = Vec::with_capacity(uploads.len());
    for upload in &uploads {
        match state.storage.put(&upload.filename, &upload.data).await {
            Ok(key) => {
                let url = state.storage.public_url(&key);
                stored.push((Some(key), url));
            }
            Err(e) => {
                discard(&state, &stored).await;
                return Err(ApiError::Internal(e));
            }
        }
    }

    let key = id.to_string();
    let records = stored.clone();
    let result = db_call(&state, move |db| {
        let outcome = db.append_listing_images(&key, &records, &localist_db::timestamp_now())?;
        let row = match outcome {
            ImageAppend::Appended => db.get_listing(&key)?,
            ImageAppend::ListingMissing | ImageAppend::TooMany => None,
        };
        Ok((outcome, row))
    })
    .await;

    let row = match result {
        Ok((ImageAppend::Appended, Some(row))) => row,
        Ok((ImageAppend::TooMany, _)) => {
            // Another upload filled the listing since the check above
            discard(&state, &stored).await;
            return Err(too_many_images());
        }
        Ok(_) => {
            // Deleted while we were uploading
            discard(&state, &stored).await;
            return Err(ApiError::NotFound);
        }
        Err(e) => {
            discard(&state, &stored).await;
            return Err(e);
        }
    };

    info!("Listing {}: {} image(s) uploaded", id, stored.len());
    Ok(Json(row.into_listing()))
}

/// GET /images/{key}: Serve a stored blob.
pub async fn get_image(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    localist_storage::validate_key(&key).map_err(|_| ApiError::bad_request("Invalid image key."))?;

    let bytes = state.storage.read(&key).await.map_err(|e| {
        let missing = e
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound);
        if missing {
            ApiError::NotFound
        } else {
            error!("Failed to read image {}: {}", key, e);
            ApiError::Internal(e)
        }
    })?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type_for(&key)),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        bytes,
    ))
}

fn too_many_images() -> ApiError {
    ApiError::bad_request(format!("A listing can have at most {MAX_IMAGES_PER_LISTING} images."))
}

/// Remove blobs stored for a request that did not complete.
async fn discard(state: &AppState, stored: &[(Option<String>, String)]) {
    for key in stored.iter().filter_map(|(key, _)| key.as_deref()) {
        if let Err(e) = state.storage.delete(key).await {
            warn!("Failed to clean up image {}: {}", key, e);
        }
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(e.body_text())
    }
}

fn content_type_for(key: &str) -> &'static str {
    let ext = key.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        _ => "application/octet-stream",
    }
}
