//! Geocoding abstractions and core types

use crate::core::holding::LocationKey;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeocodeCandidate {
    pub geometry: Geometry,
}

/// Response of a geocoding lookup. Only the first candidate is ever used.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GeocodeResponse {
    #[serde(default)]
    pub results: Vec<GeocodeCandidate>,
}

impl GeocodeResponse {
    pub fn first_coordinates(&self) -> Option<LatLng> {
        self.results.first().map(|c| c.geometry.location)
    }
}

/// A location with resolved coordinates, as stored in the location cache.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GeocodedLocation {
    #[serde(rename = "City")]
    pub city: Option<String>,
    #[serde(rename = "State")]
    pub state: Option<String>,
    #[serde(rename = "Country")]
    pub country: Option<String>,
    pub full_location: String,
    pub lat: f64,
    pub lon: f64,
}

impl GeocodedLocation {
    pub fn key(&self) -> LocationKey {
        LocationKey::new(self.city.clone(), self.state.clone(), self.country.clone())
    }
}

/// Resolves free-text locations to coordinates. An `Err` is a transient
/// failure; an empty `results` list is a miss.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, location: &str) -> Result<GeocodeResponse>;
}
