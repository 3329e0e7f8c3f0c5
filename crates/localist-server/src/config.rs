use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Placeholder JWT secrets that are fine for local development only.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "change-me-to-a-random-string"];

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub storage_dir: PathBuf,
    pub public_url: String,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub max_image_bytes: usize,
    pub geocoder_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port: u16 = try_load("LOCALIST_PORT", "3000")?;

        let config = Self {
            host: try_load("LOCALIST_HOST", "0.0.0.0")?,
            port,
            db_path: try_load("LOCALIST_DB_PATH", "localist.db")?,
            storage_dir: try_load("LOCALIST_STORAGE_DIR", "./uploads")?,
            public_url: try_load("LOCALIST_PUBLIC_URL", &format!("http://localhost:{port}"))?,
            jwt_secret: try_load("LOCALIST_JWT_SECRET", PLACEHOLDER_SECRETS[0])?,
            token_ttl_days: try_load("LOCALIST_TOKEN_TTL_DAYS", "30")?,
            max_image_bytes: try_load("LOCALIST_MAX_IMAGE_BYTES", "10485760")?,
            geocoder_url: env::var("LOCALIST_GEOCODER_URL").ok().filter(|v| !v.trim().is_empty()),
        };

        if PLACEHOLDER_SECRETS.contains(&config.jwt_secret.as_str()) {
            warn!("LOCALIST_JWT_SECRET is a placeholder; tokens are forgeable. Set it before deploying.");
        }
        match &config.geocoder_url {
            Some(url) => info!("Geocoding via {}", url),
            None => info!("LOCALIST_GEOCODER_URL not set, geocoding disabled"),
        }

        Ok(config)
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("Invalid {key} value: {raw:?}"))
}
