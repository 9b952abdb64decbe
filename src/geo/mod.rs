//! Coordinate parsing and bounding-box geometry for the area search.

use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum GeoError {
    #[error("expected \"lat,lng\", got \"{0}\"")]
    Malformed(String),

    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),
}

/// A validated (latitude, longitude) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub lat: f64,
    pub lng: f64,
}

impl Coord {
    pub fn new(lat: f64, lng: f64) -> Result<Self, GeoError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(GeoError::LatitudeOutOfRange(lat));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(GeoError::LongitudeOutOfRange(lng));
        }
        Ok(Self { lat, lng })
    }
}

impl FromStr for Coord {
    type Err = GeoError;

    /// Parse a `"lat,lng"` string. Both bounding-box corners use this one
    /// convention; there is no per-corner axis order.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| GeoError::Malformed(s.to_string()))?;
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|_| GeoError::Malformed(s.to_string()))?;
        let lng: f64 = lng
            .trim()
            .parse()
            .map_err(|_| GeoError::Malformed(s.to_string()))?;
        Coord::new(lat, lng)
    }
}

/// Axis-aligned rectangle normalized with min/max per axis, so the two
/// corners may be given in either diagonal order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn from_corners(a: Coord, b: Coord) -> Self {
        Self {
            min_lat: a.lat.min(b.lat),
            max_lat: a.lat.max(b.lat),
            min_lng: a.lng.min(b.lng),
            max_lng: a.lng.max(b.lng),
        }
    }

    /// Containment with inclusive bounds.
    pub fn contains(&self, point: Coord) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lng..=self.max_lng).contains(&point.lng)
    }
}
