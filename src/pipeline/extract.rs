//! Extraction stage: raw holdings, top locations by market cap, and geocode
//! resolution against the location cache.

use crate::core::{GeocodedLocation, Geocoder, Holding, LocationKey, parse_numeric};
use crate::store::location_cache::LocationCache;
use crate::store::{parse_csv, write_atomic};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// A location with the summed market cap of the holdings headquartered there.
#[derive(Debug, Clone, PartialEq)]
pub struct TopCity {
    pub key: LocationKey,
    pub total_marketcap: f64,
    pub full_location: String,
}

/// Reads the source holdings, stores an untouched copy at `raw_path` and
/// returns the parsed rows.
pub fn extract(source: &Path, raw_path: &Path) -> Result<Vec<Holding>> {
    let bytes = fs::read(source)
        .with_context(|| format!("Failed to read source file: {}", source.display()))?;
    let holdings: Vec<Holding> = parse_csv(&bytes)
        .with_context(|| format!("Failed to parse source file: {}", source.display()))?;

    write_atomic(raw_path, |file| Ok(file.write_all(&bytes)?))
        .with_context(|| format!("Failed to write raw cache: {}", raw_path.display()))?;

    info!(
        holdings = holdings.len(),
        raw = %raw_path.display(),
        "Extracted holdings"
    );
    Ok(holdings)
}

/// Reads the raw copy written by [`extract`].
pub fn load_raw(raw_path: &Path) -> Result<Vec<Holding>> {
    let bytes = fs::read(raw_path)
        .with_context(|| format!("Failed to read raw holdings: {}", raw_path.display()))?;
    parse_csv(&bytes).with_context(|| format!("Failed to load raw holdings: {}", raw_path.display()))
}

/// Returns the `n` locations with the largest total market cap, largest first.
///
/// Holdings without a numeric market cap do not contribute. Groups are formed
/// in order of first appearance and the sort is stable, so equal totals keep
/// that order.
pub fn select_top_cities(holdings: &[Holding], n: usize) -> Vec<TopCity> {
    let mut positions: HashMap<LocationKey, usize> = HashMap::new();
    let mut groups: Vec<(LocationKey, f64)> = Vec::new();

    for holding in holdings {
        let Some(marketcap) = parse_numeric(holding.marketcap.as_deref()) else {
            continue;
        };
        let key = holding.location_key();
        match positions.get(&key) {
            Some(&i) => groups[i].1 += marketcap,
            None => {
                positions.insert(key.clone(), groups.len());
                groups.push((key, marketcap));
            }
        }
    }

    groups.sort_by(|a, b| b.1.total_cmp(&a.1));
    groups.truncate(n);

    groups
        .into_iter()
        .map(|(key, total_marketcap)| TopCity {
            full_location: key.full_location(),
            key,
            total_marketcap,
        })
        .collect()
}

/// Geocodes the top cities that are not yet in `cache`, then saves the cache.
///
/// At most `max_new_requests` lookups may complete; once the budget is spent
/// the remaining cities are left for a later run. A lookup that errors does
/// not count against the budget. Misses and failed lookups are logged and
/// skipped. Returns the full cache contents after the run.
pub async fn resolve_locations(
    top_cities: &[TopCity],
    cache: &LocationCache,
    geocoder: &(dyn Geocoder + Send + Sync),
    max_new_requests: usize,
    on_progress: &(dyn Fn()),
) -> Result<Vec<GeocodedLocation>> {
    let mut locations = cache
        .load()
        .with_context(|| format!("Failed to load location cache: {}", cache.path().display()))?;
    let mut index = LocationCache::index(&locations);

    let mut added = 0;
    let mut new_calls = 0;

    for city in top_cities {
        on_progress();
        let full_location = city.full_location.trim();

        if full_location.is_empty() {
            continue;
        }
        if index.contains_key(full_location) {
            debug!(location = full_location, "Already geocoded");
            continue;
        }
        if new_calls >= max_new_requests {
            info!(max_new_requests, "Reached request budget, stopping");
            break;
        }

        let response = match geocoder.geocode(full_location).await {
            Ok(response) => {
                new_calls += 1;
                response
            }
            Err(e) => {
                error!(location = full_location, error = %e, "Geocode failed");
                continue;
            }
        };

        let Some(coords) = response.first_coordinates() else {
            warn!(location = full_location, "No geocode results");
            continue;
        };

        index.insert(full_location.to_string(), (coords.lat, coords.lng));
        locations.push(GeocodedLocation {
            city: city.key.city.clone(),
            state: city.key.state.clone(),
            country: city.key.country.clone(),
            full_location: full_location.to_string(),
            lat: coords.lat,
            lon: coords.lng,
        });
        added += 1;
    }

    cache.save(&locations)?;
    info!(
        total = locations.len(),
        added,
        lookups = new_calls,
        "Location cache updated"
    );
    Ok(locations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GeocodeResponse;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Answers from a fixed table; unknown locations are misses and
    /// locations listed in `failing` return an error.
    struct MockGeocoder {
        call_count: AtomicUsize,
        requested: Mutex<Vec<String>>,
        known: HashMap<String, (f64, f64)>,
        failing: Vec<String>,
    }

    impl MockGeocoder {
        fn new(known: &[(&str, f64, f64)]) -> Self {
            Self {
                call_count: AtomicUsize::new(0),
                requested: Mutex::new(Vec::new()),
                known: known
                    .iter()
                    .map(|(loc, lat, lng)| (loc.to_string(), (*lat, *lng)))
                    .collect(),
                failing: Vec::new(),
            }
        }

        fn failing_on(mut self, location: &str) -> Self {
            self.failing.push(location.to_string());
            self
        }

        fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Geocoder for MockGeocoder {
        async fn geocode(&self, location: &str) -> Result<GeocodeResponse> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().unwrap().push(location.to_string());
            if self.failing.iter().any(|l| l == location) {
                return Err(anyhow!("HTTP 503 for {location}"));
            }
            let body = match self.known.get(location) {
                Some((lat, lng)) => format!(
                    r#"{{"results": [{{"geometry": {{"location": {{"lat": {lat}, "lng": {lng}}}}}}}]}}"#
                ),
                None => r#"{"results": []}"#.to_string(),
            };
            Ok(serde_json::from_str(&body)?)
        }
    }

    fn holding(symbol: &str, city: &str, state: &str, country: &str, marketcap: &str) -> Holding {
        let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Holding {
            symbol: Some(symbol.into()),
            city: opt(city),
            state: opt(state),
            country: opt(country),
            marketcap: opt(marketcap),
            ..Default::default()
        }
    }

    fn top_city(city: &str, state: &str, country: &str) -> TopCity {
        let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
        let key = LocationKey::new(opt(city), opt(state), opt(country));
        TopCity {
            full_location: key.full_location(),
            key,
            total_marketcap: 1.0,
        }
    }

    fn boston_cache(dir: &TempDir) -> Result<LocationCache> {
        let cache = LocationCache::new(dir.path().join("locations_geocoded.csv"));
        cache.save(&[GeocodedLocation {
            city: Some("Boston".into()),
            state: Some("MA".into()),
            country: Some("USA".into()),
            full_location: "Boston, MA, USA".into(),
            lat: 42.36,
            lon: -71.05,
        }])?;
        Ok(cache)
    }

    #[test]
    fn test_extract_writes_verbatim_raw_copy() -> Result<()> {
        let dir = TempDir::new()?;
        let source = dir.path().join("stocks_data.csv");
        let raw = dir.path().join("stocks_raw.csv");
        let content = "Symbol,Marketcap,Extra\nAAA,10,keep me\nBBB,oops,\n";
        fs::write(&source, content)?;

        let holdings = extract(&source, &raw)?;

        assert_eq!(fs::read_to_string(&raw)?, content);
        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings[0].symbol.as_deref(), Some("AAA"));
        assert_eq!(holdings[1].marketcap.as_deref(), Some("oops"));
        assert!(holdings[1].city.is_none());
        assert_eq!(load_raw(&raw)?, holdings);
        Ok(())
    }

    #[test]
    fn test_extract_accepts_short_rows() -> Result<()> {
        let dir = TempDir::new()?;
        let source = dir.path().join("stocks_data.csv");
        let raw = dir.path().join("stocks_raw.csv");
        fs::write(&source, "Symbol,Marketcap,City\nAAA,10\nBBB,20,Boston\n")?;

        let holdings = extract(&source, &raw)?;

        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings[0].marketcap.as_deref(), Some("10"));
        assert!(holdings[0].city.is_none());
        assert_eq!(holdings[1].city.as_deref(), Some("Boston"));
        assert_eq!(load_raw(&raw)?, holdings);
        Ok(())
    }

    #[test]
    fn test_extract_missing_source_produces_no_output() -> Result<()> {
        let dir = TempDir::new()?;
        let raw = dir.path().join("stocks_raw.csv");

        let result = extract(&dir.path().join("missing.csv"), &raw);

        assert!(result.is_err());
        assert!(!raw.exists());
        Ok(())
    }

    #[test]
    fn test_select_top_cities_sums_and_sorts() {
        let holdings = vec![
            holding("A", "Boston", "MA", "USA", "100"),
            holding("B", "Austin", "TX", "USA", "250"),
            holding("C", "Boston", "MA", "USA", "200"),
            holding("D", "London", "", "UK", "50"),
            holding("E", "Boston", "MA", "USA", "not a number"),
        ];

        let top = select_top_cities(&holdings, 20);

        assert_eq!(top.len(), 3);
        assert_eq!(top[0].full_location, "Boston, MA, USA");
        assert_eq!(top[0].total_marketcap, 300.0);
        assert_eq!(top[1].full_location, "Austin, TX, USA");
        assert_eq!(top[1].total_marketcap, 250.0);
        assert_eq!(top[2].full_location, "London, , UK");
        assert!(top.windows(2).all(|w| w[0].total_marketcap >= w[1].total_marketcap));
    }

    #[test]
    fn test_select_top_cities_truncates_to_n() {
        let holdings: Vec<Holding> = (0..10)
            .map(|i| holding(&format!("S{i}"), &format!("City{i}"), "", "X", &format!("{i}")))
            .collect();

        for n in [0, 1, 3, 10, 15] {
            let top = select_top_cities(&holdings, n);
            assert_eq!(top.len(), n.min(10));
        }
        let top = select_top_cities(&holdings, 3);
        assert_eq!(top[0].total_marketcap, 9.0);
        assert_eq!(top[2].total_marketcap, 7.0);
    }

    #[test]
    fn test_select_top_cities_keeps_missing_key_group() {
        let holdings = vec![
            holding("A", "", "", "", "500"),
            holding("B", "", "", "", "500"),
            holding("C", "Paris", "", "France", "10"),
        ];

        let top = select_top_cities(&holdings, 5);

        assert_eq!(top.len(), 2);
        assert_eq!(top[0].key, LocationKey::default());
        assert_eq!(top[0].full_location, ", , ");
        assert_eq!(top[0].total_marketcap, 1000.0);
    }

    #[test]
    fn test_select_top_cities_ties_keep_first_appearance() {
        let holdings = vec![
            holding("A", "Zurich", "", "CH", "10"),
            holding("B", "Austin", "TX", "USA", "10"),
            holding("C", "Boston", "MA", "USA", "10"),
        ];

        let top = select_top_cities(&holdings, 3);
        let order: Vec<_> = top.iter().map(|c| c.key.city.as_deref().unwrap()).collect();
        assert_eq!(order, vec!["Zurich", "Austin", "Boston"]);
    }

    #[tokio::test]
    async fn test_cached_location_is_not_requested() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = boston_cache(&dir)?;
        let geocoder = MockGeocoder::new(&[("Boston, MA, USA", 0.0, 0.0)]);

        let locations = resolve_locations(
            &[top_city("Boston", "MA", "USA")],
            &cache,
            &geocoder,
            50,
            &|| {},
        )
        .await?;

        assert_eq!(geocoder.calls(), 0);
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].lat, 42.36);
        Ok(())
    }

    #[tokio::test]
    async fn test_second_run_makes_no_requests() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = LocationCache::new(dir.path().join("locations_geocoded.csv"));
        let geocoder = MockGeocoder::new(&[
            ("Austin, TX, USA", 30.27, -97.74),
            ("London, , UK", 51.5, -0.12),
        ]);
        let top = vec![top_city("Austin", "TX", "USA"), top_city("London", "", "UK")];

        let first = resolve_locations(&top, &cache, &geocoder, 50, &|| {}).await?;
        assert_eq!(geocoder.calls(), 2);
        assert_eq!(first.len(), 2);

        let second = resolve_locations(&top, &cache, &geocoder, 50, &|| {}).await?;
        assert_eq!(geocoder.calls(), 2);
        assert_eq!(second, first);

        let london = &cache.load()?[1];
        assert_eq!(london.city.as_deref(), Some("London"));
        assert!(london.state.is_none());
        assert_eq!(london.full_location, "London, , UK");
        Ok(())
    }

    #[tokio::test]
    async fn test_budget_stops_the_run() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = boston_cache(&dir)?;
        let geocoder = MockGeocoder::new(&[
            ("Austin, TX, USA", 30.27, -97.74),
            ("Denver, CO, USA", 39.74, -104.99),
            ("Seattle, WA, USA", 47.61, -122.33),
        ]);
        let top = vec![
            top_city("Boston", "MA", "USA"),
            top_city("Austin", "TX", "USA"),
            top_city("Denver", "CO", "USA"),
            top_city("Seattle", "WA", "USA"),
        ];

        let locations = resolve_locations(&top, &cache, &geocoder, 1, &|| {}).await?;

        assert_eq!(geocoder.calls(), 1);
        assert_eq!(*geocoder.requested.lock().unwrap(), vec!["Austin, TX, USA"]);
        assert_eq!(locations.len(), 2);
        assert_eq!(cache.load()?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_miss_and_failure_are_skipped() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = LocationCache::new(dir.path().join("locations_geocoded.csv"));
        let geocoder = MockGeocoder::new(&[
            ("Denver, CO, USA", 39.74, -104.99),
            ("Austin, TX, USA", 30.27, -97.74),
        ])
        .failing_on("Austin, TX, USA");
        let top = vec![
            top_city("Nowhere", "", "ZZ"),
            top_city("Austin", "TX", "USA"),
            top_city("Denver", "CO", "USA"),
        ];

        let locations = resolve_locations(&top, &cache, &geocoder, 50, &|| {}).await?;

        assert_eq!(geocoder.calls(), 3);
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].full_location, "Denver, CO, USA");
        assert_eq!(cache.load()?, locations);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_lookup_does_not_spend_budget() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = LocationCache::new(dir.path().join("locations_geocoded.csv"));
        let geocoder = MockGeocoder::new(&[
            ("Austin, TX, USA", 30.27, -97.74),
            ("Denver, CO, USA", 39.74, -104.99),
            ("Miami, FL, USA", 25.76, -80.19),
        ])
        .failing_on("Austin, TX, USA");
        let top = vec![
            top_city("Austin", "TX", "USA"),
            top_city("Denver", "CO", "USA"),
            top_city("Miami", "FL", "USA"),
        ];

        let locations = resolve_locations(&top, &cache, &geocoder, 1, &|| {}).await?;

        assert_eq!(geocoder.calls(), 2);
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].full_location, "Denver, CO, USA");
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_result_spends_budget() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = LocationCache::new(dir.path().join("locations_geocoded.csv"));
        let geocoder = MockGeocoder::new(&[("Denver, CO, USA", 39.74, -104.99)]);
        let top = vec![top_city("Nowhere", "", "ZZ"), top_city("Denver", "CO", "USA")];

        let locations = resolve_locations(&top, &cache, &geocoder, 1, &|| {}).await?;

        assert_eq!(geocoder.calls(), 1);
        assert!(locations.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_blank_location_is_skipped() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = LocationCache::new(dir.path().join("locations_geocoded.csv"));
        let geocoder = MockGeocoder::new(&[]);
        let blank = TopCity {
            key: LocationKey::default(),
            total_marketcap: 1.0,
            full_location: "   ".into(),
        };

        let locations = resolve_locations(&[blank], &cache, &geocoder, 50, &|| {}).await?;

        assert_eq!(geocoder.calls(), 0);
        assert!(locations.is_empty());
        assert!(cache.path().exists());
        Ok(())
    }
}
