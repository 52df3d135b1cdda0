use super::{read_csv, write_csv};
use crate::core::GeocodedLocation;
use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const LOCATION_COLUMNS: [&str; 6] = ["City", "State", "Country", "full_location", "lat", "lon"];

/// Durable full-location → coordinates mapping backed by a CSV file.
#[derive(Debug, Clone)]
pub struct LocationCache {
    path: PathBuf,
}

impl LocationCache {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted cache. A cache that was never saved is empty.
    pub fn load(&self) -> Result<Vec<GeocodedLocation>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No location cache yet");
            return Ok(Vec::new());
        }
        read_csv(&self.path)
    }

    /// Replaces the persisted cache with `locations`.
    pub fn save(&self, locations: &[GeocodedLocation]) -> Result<()> {
        write_csv(&self.path, &LOCATION_COLUMNS, locations)
    }

    /// Builds the lookup used during a resolution pass, keyed by the trimmed
    /// full location. The first entry for a location wins.
    pub fn index(locations: &[GeocodedLocation]) -> HashMap<String, (f64, f64)> {
        let mut index = HashMap::with_capacity(locations.len());
        for location in locations {
            index
                .entry(location.full_location.trim().to_string())
                .or_insert((location.lat, location.lon));
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn boston() -> GeocodedLocation {
        GeocodedLocation {
            city: Some("Boston".into()),
            state: Some("MA".into()),
            country: Some("USA".into()),
            full_location: "Boston, MA, USA".into(),
            lat: 42.36,
            lon: -71.05,
        }
    }

    #[test]
    fn test_load_missing_cache_is_empty() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = LocationCache::new(dir.path().join("locations_geocoded.csv"));

        assert!(cache.load()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_save_overwrites_and_reloads() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = LocationCache::new(dir.path().join("locations_geocoded.csv"));

        let london = GeocodedLocation {
            city: Some("London".into()),
            state: None,
            country: Some("UK".into()),
            full_location: "London, , UK".into(),
            lat: 51.5,
            lon: -0.12,
        };
        cache.save(&[boston(), london.clone()])?;
        assert_eq!(cache.load()?, vec![boston(), london.clone()]);

        cache.save(&[london.clone()])?;
        assert_eq!(cache.load()?, vec![london]);
        Ok(())
    }

    #[test]
    fn test_empty_cache_file_has_header() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = LocationCache::new(dir.path().join("locations_geocoded.csv"));

        cache.save(&[])?;

        let content = fs::read_to_string(cache.path())?;
        assert_eq!(content, "City,State,Country,full_location,lat,lon\n");
        assert!(cache.load()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_malformed_cache_is_an_error() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = LocationCache::new(dir.path().join("locations_geocoded.csv"));
        fs::write(
            cache.path(),
            "City,State,Country,full_location,lat,lon\nBoston,MA,USA,\"Boston, MA, USA\",north,west\n",
        )?;

        assert!(cache.load().is_err());
        Ok(())
    }

    #[test]
    fn test_index_keeps_first_entry() {
        let mut duplicate = boston();
        duplicate.lat = 0.0;

        let index = LocationCache::index(&[boston(), duplicate]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("Boston, MA, USA"), Some(&(42.36, -71.05)));
    }
}
