//! Core business logic abstractions

pub mod cache;
pub mod config;
pub mod geocode;
pub mod holding;
pub mod log;

// Re-export main types for cleaner imports
pub use geocode::{GeocodeResponse, GeocodedLocation, Geocoder};
pub use holding::{Holding, LocationKey, parse_numeric};
