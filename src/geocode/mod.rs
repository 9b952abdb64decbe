//! Geocoding collaborator: resolves a free-form address to a coordinate.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::GeocodingConfig;
use crate::geo::Coord;

#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("no match for address \"{0}\"")]
    NoMatch(String),

    #[error("geocoding service error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve(&self, address: &str) -> Result<Coord, GeocodeError>;
}

/// Build the production geocoder from config.
pub fn build_geocoder(config: &GeocodingConfig) -> Arc<dyn Geocoder> {
    Arc::new(NominatimGeocoder::new(config.clone()))
}

/// Geocoder backed by a Nominatim-compatible search endpoint.
pub struct NominatimGeocoder {
    config: GeocodingConfig,
    client: reqwest::Client,
}

/// One hit from the Nominatim search response. Coordinates come back as
/// strings in that API.
#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    pub fn new(config: GeocodingConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn resolve(&self, address: &str) -> Result<Coord, GeocodeError> {
        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .header("User-Agent", &self.config.user_agent)
            .send()
            .await
            .map_err(|e| GeocodeError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GeocodeError::Transport(format!(
                "geocoding service returned {}",
                response.status()
            )));
        }

        let hits: Vec<SearchHit> = response
            .json()
            .await
            .map_err(|e| GeocodeError::Transport(e.to_string()))?;

        let hit = hits
            .into_iter()
            .next()
            .ok_or_else(|| GeocodeError::NoMatch(address.to_string()))?;

        let lat: f64 = hit
            .lat
            .parse()
            .map_err(|_| GeocodeError::Transport(format!("bad latitude: {}", hit.lat)))?;
        let lng: f64 = hit
            .lon
            .parse()
            .map_err(|_| GeocodeError::Transport(format!("bad longitude: {}", hit.lon)))?;

        debug!(address, lat, lng, "Resolved address");

        Coord::new(lat, lng).map_err(|e| GeocodeError::Transport(e.to_string()))
    }
}
