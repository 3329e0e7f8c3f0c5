use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{info, warn};
use uuid::Uuid;

use localist_db::models::UserRow;
use localist_types::api::{AuthResponse, Claims, SignInRequest, SignUpRequest};

use crate::error::ApiError;
use crate::extract::Json;
use crate::{AppState, db_call};

const MIN_PASSWORD_LEN: usize = 6;
const MAX_DISPLAY_NAME_LEN: usize = 64;

pub async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email)?;
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request("Password must be at least 6 characters."));
    }
    let display_name = req.display_name.trim().to_string();
    if display_name.is_empty() || display_name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(ApiError::bad_request("Display name must be 1 to 64 characters."));
    }

    let lookup = email.clone();
    if db_call(&state, move |db| db.get_user_by_email(&lookup)).await?.is_some() {
        return Err(duplicate_email());
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4();
    let row = UserRow {
        id: user_id.to_string(),
        email,
        password: password_hash,
        display_name,
        photo_url: non_empty(req.photo_url),
        business_name: non_empty(req.business_name),
        created_at: localist_db::timestamp_now(),
    };

    // A concurrent sign-up may have claimed the email since the lookup above
    let (created, row) = db_call(&state, move |db| {
        let created = db.create_user(&row)?;
        Ok((created, row))
    })
    .await?;
    if !created {
        return Err(duplicate_email());
    }

    let token = create_token(&state.jwt_secret, state.token_ttl_days, user_id, &row.display_name)?;
    info!("New account {} ({})", user_id, row.email);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: row.into_user(),
            token,
        }),
    ))
}

pub async fn sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = req.email.trim().to_lowercase();
    let user = db_call(&state, move |db| db.get_user_by_email(&email))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let parsed_hash =
        PasswordHash::new(&user.password).map_err(|e| anyhow::anyhow!("stored hash unreadable: {}", e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| {
            warn!("Failed sign-in for {}", user.email);
            ApiError::Unauthorized
        })?;

    let user = user.into_user();
    let token = create_token(&state.jwt_secret, state.token_ttl_days, user.id, &user.display_name)?;

    Ok(Json(AuthResponse { user, token }))
}

/// The signed-in user's profile.
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let id = claims.sub.to_string();
    let user = db_call(&state, move |db| db.get_user_by_id(&id))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    Ok(Json(user.into_user()))
}

pub fn create_token(secret: &str, ttl_days: i64, user_id: Uuid, name: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        name: name.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(ttl_days)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn verify_token(secret: &str, token: &str) -> anyhow::Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

fn duplicate_email() -> ApiError {
    ApiError::Conflict("An account with this email already exists.".into())
}

fn normalize_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(email)
        }
        _ => Err(ApiError::bad_request("Please enter a valid email address.")),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
