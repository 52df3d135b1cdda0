//! Holding records and the location key they are grouped and joined on.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// One row of the source holdings file.
///
/// Every column is kept as optional text. Numeric columns are coerced on
/// demand with [`parse_numeric`], so a malformed value never fails a read.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Holding {
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
    pub marketcap: Option<String>,
    #[serde(rename = "Weight")]
    pub weight: Option<String>,
    #[serde(rename = "Revenuegrowth")]
    pub revenue_growth: Option<String>,
    #[serde(rename = "Fulltimeemployees")]
    pub fulltime_employees: Option<String>,
    #[serde(rename = "Currentprice")]
    pub current_price: Option<String>,
    #[serde(rename = "Ebitda")]
    pub ebitda: Option<String>,
    #[serde(rename = "Longname")]
    pub long_name: Option<String>,
    #[serde(rename = "Longbusinesssummary")]
    pub long_business_summary: Option<String>,
}

impl Holding {
    pub fn location_key(&self) -> LocationKey {
        LocationKey::new(self.city.clone(), self.state.clone(), self.country.clone())
    }
}

/// The (City, State, Country) triple used both as join key and as geocode
/// cache key. Missing components compare equal to each other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LocationKey {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

impl LocationKey {
    pub fn new(city: Option<String>, state: Option<String>, country: Option<String>) -> Self {
        Self {
            city,
            state,
            country,
        }
    }

    /// Renders `"City, State, Country"`, with missing parts as empty strings.
    pub fn full_location(&self) -> String {
        self.to_string()
    }
}

impl Display for LocationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}, {}",
            self.city.as_deref().unwrap_or(""),
            self.state.as_deref().unwrap_or(""),
            self.country.as_deref().unwrap_or("")
        )
    }
}

/// Coerces a raw cell to a number. Missing, blank, non-numeric and NaN values
/// all become `None`.
pub fn parse_numeric(raw: Option<&str>) -> Option<f64> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| !v.is_nan())
}
