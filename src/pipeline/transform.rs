//! Transform stage: enrichment with derived fields and coordinates, plus the
//! sector and country summaries.

use crate::core::{GeocodedLocation, Holding, LocationKey, parse_numeric};
use crate::store::{read_csv, write_csv};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

pub const ENRICHED_COLUMNS: [&str; 18] = [
    "Symbol",
    "Sector",
    "Industry",
    "Country",
    "City",
    "State",
    "Marketcap",
    "Weight",
    "Revenuegrowth",
    "Fulltimeemployees",
    "Currentprice",
    "Ebitda",
    "Longname",
    "Longbusinesssummary",
    "MarketcapBillions",
    "WeightPercent",
    "lat",
    "lon",
];

pub const SECTOR_COLUMNS: [&str; 5] = [
    "Sector",
    "total_weight",
    "avg_revenue_growth",
    "avg_marketcap_bil",
    "num_companies",
];

pub const COUNTRY_COLUMNS: [&str; 3] = ["Country", "total_weight", "num_companies"];

/// A holding with numeric columns coerced, derived metrics and coordinates.
/// Field order matches [`ENRICHED_COLUMNS`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EnrichedHolding {
    #[serde(rename = "Symbol")]
    pub symbol: Option<String>,
    #[serde(rename = "Sector")]
    pub sector: Option<String>,
    #[serde(rename = "Industry")]
    pub industry: Option<String>,
    #[serde(rename = "Country")]
    pub country: Option<String>,
    #[serde(rename = "City")]
    pub city: Option<String>,
    #[serde(rename = "State")]
    pub state: Option<String>,
    #[serde(rename = "Marketcap")]
    pub marketcap: Option<f64>,
    #[serde(rename = "Weight")]
    pub weight: Option<f64>,
    #[serde(rename = "Revenuegrowth")]
    pub revenue_growth: Option<f64>,
    #[serde(rename = "Fulltimeemployees")]
    pub fulltime_employees: Option<f64>,
    #[serde(rename = "Currentprice")]
    pub current_price: Option<f64>,
    #[serde(rename = "Ebitda")]
    pub ebitda: Option<f64>,
    #[serde(rename = "Longname")]
    pub long_name: Option<String>,
    #[serde(rename = "Longbusinesssummary")]
    pub long_business_summary: Option<String>,
    #[serde(rename = "MarketcapBillions")]
    pub marketcap_billions: Option<f64>,
    #[serde(rename = "WeightPercent")]
    pub weight_percent: Option<f64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl EnrichedHolding {
    pub fn location_key(&self) -> LocationKey {
        LocationKey::new(self.city.clone(), self.state.clone(), self.country.clone())
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lon)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SectorSummary {
    #[serde(rename = "Sector")]
    pub sector: Option<String>,
    pub total_weight: f64,
    pub avg_revenue_growth: Option<f64>,
    pub avg_marketcap_bil: Option<f64>,
    pub num_companies: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CountrySummary {
    #[serde(rename = "Country")]
    pub country: Option<String>,
    pub total_weight: f64,
    pub num_companies: usize,
}

/// Coerces numeric columns, derives market cap in billions and weight in
/// percent, and left joins coordinates on (City, State, Country).
///
/// Every input holding yields exactly one output row.
pub fn enrich(holdings: &[Holding], locations: &[GeocodedLocation]) -> Vec<EnrichedHolding> {
    let mut coordinates: HashMap<LocationKey, (f64, f64)> = HashMap::new();
    for location in locations {
        coordinates
            .entry(location.key())
            .or_insert((location.lat, location.lon));
    }

    let enriched: Vec<EnrichedHolding> = holdings
        .iter()
        .map(|h| {
            let marketcap = parse_numeric(h.marketcap.as_deref());
            let weight = parse_numeric(h.weight.as_deref());
            let coords = coordinates.get(&h.location_key()).copied();

            EnrichedHolding {
                symbol: h.symbol.clone(),
                sector: h.sector.clone(),
                industry: h.industry.clone(),
                country: h.country.clone(),
                city: h.city.clone(),
                state: h.state.clone(),
                marketcap,
                weight,
                revenue_growth: parse_numeric(h.revenue_growth.as_deref()),
                fulltime_employees: parse_numeric(h.fulltime_employees.as_deref()),
                current_price: parse_numeric(h.current_price.as_deref()),
                ebitda: parse_numeric(h.ebitda.as_deref()),
                long_name: h.long_name.clone(),
                long_business_summary: h.long_business_summary.clone(),
                marketcap_billions: marketcap.map(|m| m / 1e9),
                weight_percent: weight.map(|w| w * 100.0),
                lat: coords.map(|c| c.0),
                lon: coords.map(|c| c.1),
            }
        })
        .collect();

    let matched = enriched.iter().filter(|e| e.coordinates().is_some()).count();
    info!(
        holdings = enriched.len(),
        geocoded = matched,
        "Enriched holdings"
    );
    enriched
}

/// Groups rows by `key`. Present keys come out in ascending order, followed by
/// the group of rows without a key.
fn group_by<'a, F>(rows: &'a [EnrichedHolding], key: F) -> Vec<(Option<String>, Vec<&'a EnrichedHolding>)>
where
    F: Fn(&EnrichedHolding) -> Option<&str>,
{
    let mut groups: BTreeMap<Option<&str>, Vec<&EnrichedHolding>> = BTreeMap::new();
    for row in rows {
        groups.entry(key(row)).or_default().push(row);
    }

    let missing = groups.remove(&None);
    groups
        .into_iter()
        .chain(missing.map(|rows| (None, rows)))
        .map(|(k, rows)| (k.map(str::to_string), rows))
        .collect()
}

fn mean(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

fn total_weight(rows: &[&EnrichedHolding]) -> f64 {
    rows.iter().filter_map(|r| r.weight).sum()
}

fn company_count(rows: &[&EnrichedHolding]) -> usize {
    rows.iter().filter(|r| r.symbol.is_some()).count()
}

pub fn summarize_by_sector(enriched: &[EnrichedHolding]) -> Vec<SectorSummary> {
    let summaries: Vec<SectorSummary> = group_by(enriched, |r| r.sector.as_deref())
        .into_iter()
        .map(|(sector, rows)| SectorSummary {
            sector,
            total_weight: total_weight(&rows),
            avg_revenue_growth: mean(rows.iter().map(|r| r.revenue_growth)),
            avg_marketcap_bil: mean(rows.iter().map(|r| r.marketcap_billions)),
            num_companies: company_count(&rows),
        })
        .collect();
    debug!(sectors = summaries.len(), "Summarized by sector");
    summaries
}

pub fn summarize_by_country(enriched: &[EnrichedHolding]) -> Vec<CountrySummary> {
    let summaries: Vec<CountrySummary> = group_by(enriched, |r| r.country.as_deref())
        .into_iter()
        .map(|(country, rows)| CountrySummary {
            country,
            total_weight: total_weight(&rows),
            num_companies: company_count(&rows),
        })
        .collect();
    debug!(countries = summaries.len(), "Summarized by country");
    summaries
}

pub fn save_enriched(path: &Path, rows: &[EnrichedHolding]) -> Result<()> {
    write_csv(path, &ENRICHED_COLUMNS, rows)
}

pub fn load_enriched(path: &Path) -> Result<Vec<EnrichedHolding>> {
    read_csv(path)
}

pub fn save_sector_summary(path: &Path, rows: &[SectorSummary]) -> Result<()> {
    write_csv(path, &SECTOR_COLUMNS, rows)
}

pub fn load_sector_summary(path: &Path) -> Result<Vec<SectorSummary>> {
    read_csv(path)
}

pub fn save_country_summary(path: &Path, rows: &[CountrySummary]) -> Result<()> {
    write_csv(path, &COUNTRY_COLUMNS, rows)
}

pub fn load_country_summary(path: &Path) -> Result<Vec<CountrySummary>> {
    read_csv(path)
}
