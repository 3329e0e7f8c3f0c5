use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use localist_types::models::Coordinates;

/// Address lookup against a Nominatim-compatible search endpoint.
pub struct Geocoder {
    client: reqwest::Client,
    base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

impl Geocoder {
    pub fn new(base_url: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("localist/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
        })
    }

    /// A geocoder that never resolves anything.
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.base_url.is_some()
    }

    /// Resolve an address to coordinates. Failures are logged and yield `None`.
    pub async fn lookup(&self, address: &str) -> Option<Coordinates> {
        let base = self.base_url.as_deref()?;

        let resp = self
            .client
            .get(format!("{base}/search"))
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .and_then(|r| r.error_for_status());

        let places: Vec<Place> = match resp {
            Ok(r) => match r.json().await {
                Ok(places) => places,
                Err(e) => {
                    warn!("Geocoder returned unreadable body for {:?}: {}", address, e);
                    return None;
                }
            },
            Err(e) => {
                warn!("Geocoding {:?} failed: {}", address, e);
                return None;
            }
        };

        let coords = first_coordinates(&places);
        debug!("Geocoded {:?} -> {:?}", address, coords);
        coords
    }
}

fn first_coordinates(places: &[Place]) -> Option<Coordinates> {
    let place = places.first()?;
    let lat: f64 = place.lat.parse().ok()?;
    let lng: f64 = place.lon.parse().ok()?;
    valid_coordinates(Coordinates { lat, lng })
}

/// `Some` when the pair lies on the globe.
pub fn valid_coordinates(c: Coordinates) -> Option<Coordinates> {
    ((-90.0..=90.0).contains(&c.lat) && (-180.0..=180.0).contains(&c.lng)).then_some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn places(json: &str) -> Vec<Place> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn takes_first_result() {
        let found = first_coordinates(&places(
            r#"[{"lat":"40.7128","lon":"-74.0060","display_name":"NYC"},{"lat":"1","lon":"2"}]"#,
        ));
        assert_eq!(found, Some(Coordinates { lat: 40.7128, lng: -74.0060 }));
    }

    #[test]
    fn empty_or_malformed_results() {
        assert_eq!(first_coordinates(&places("[]")), None);
        assert_eq!(first_coordinates(&places(r#"[{"lat":"north","lon":"2"}]"#)), None);
        assert_eq!(first_coordinates(&places(r#"[{"lat":"91","lon":"2"}]"#)), None);
    }

    #[tokio::test]
    async fn disabled_geocoder_resolves_nothing() {
        let geocoder = Geocoder::disabled();
        assert!(!geocoder.is_enabled());
        assert_eq!(geocoder.lookup("1 Main St").await, None);
    }
}
