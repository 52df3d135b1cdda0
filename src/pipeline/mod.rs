pub mod extract;
pub mod transform;

pub use extract::{TopCity, extract, load_raw, resolve_locations, select_top_cities};
pub use transform::{
    CountrySummary, EnrichedHolding, SectorSummary, enrich, summarize_by_country,
    summarize_by_sector,
};
