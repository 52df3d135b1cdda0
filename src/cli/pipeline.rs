//! Runs the pipeline stages against the configured data directory and prints
//! what each stage produced.

use super::ui;
use crate::core::config::{AppConfig, DataPaths};
use crate::core::{GeocodedLocation, Geocoder, Holding};
use crate::pipeline::{self, TopCity};
use crate::store::location_cache::LocationCache;
use anyhow::Result;
use std::path::Path;
use tracing::info;

/// Command-line overrides for the configured pipeline settings.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub source: Option<String>,
    pub top_n: Option<usize>,
    pub max_new_requests: Option<usize>,
}

impl PipelineOptions {
    fn top_n(&self, config: &AppConfig) -> usize {
        self.top_n.unwrap_or(config.top_n)
    }

    fn max_new_requests(&self, config: &AppConfig) -> usize {
        self.max_new_requests.unwrap_or(config.max_new_requests)
    }
}

pub fn display_top_cities(top_cities: &[TopCity]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("#"),
        ui::header_cell("City"),
        ui::header_cell("State"),
        ui::header_cell("Country"),
        ui::header_cell("Total Market Cap (B)"),
    ]);

    for (rank, city) in top_cities.iter().enumerate() {
        table.add_row(vec![
            ui::number_cell((rank + 1).to_string()),
            ui::key_cell(city.key.city.as_deref()),
            ui::key_cell(city.key.state.as_deref()),
            ui::key_cell(city.key.country.as_deref()),
            ui::number_cell(format!("{:.2}", city.total_marketcap / 1e9)),
        ]);
    }

    format!(
        "{}\n\n{}",
        ui::style_text(
            &format!("Top {} locations by total market cap", top_cities.len()),
            ui::StyleType::Title
        ),
        table
    )
}

/// Extract stage: copies the source to the raw cache and shows the top cities.
pub fn extract(config: &AppConfig, paths: &DataPaths, options: &PipelineOptions) -> Result<Vec<Holding>> {
    let source = options.source.as_deref().unwrap_or(&config.source_file);
    let holdings = pipeline::extract(Path::new(source), &paths.raw)?;

    let top_cities = pipeline::select_top_cities(&holdings, options.top_n(config));
    println!("{}", display_top_cities(&top_cities));
    Ok(holdings)
}

/// Geocode stage: resolves the top cities of `holdings` not yet cached.
pub async fn geocode(
    config: &AppConfig,
    paths: &DataPaths,
    options: &PipelineOptions,
    holdings: &[Holding],
    geocoder: &(dyn Geocoder + Send + Sync),
) -> Result<Vec<GeocodedLocation>> {
    let top_cities = pipeline::select_top_cities(holdings, options.top_n(config));
    let cache = LocationCache::new(&paths.locations);

    let pb = ui::new_progress_bar(top_cities.len() as u64, true);
    pb.set_message("Geocoding locations...");
    let locations = pipeline::resolve_locations(
        &top_cities,
        &cache,
        geocoder,
        options.max_new_requests(config),
        &|| pb.inc(1),
    )
    .await?;
    pb.finish_and_clear();

    let resolved = top_cities
        .iter()
        .filter(|c| {
            locations
                .iter()
                .any(|l| l.full_location == c.full_location.trim())
        })
        .count();
    println!(
        "Geocoded {} of {} top locations ({} cached in total)",
        ui::style_text(&resolved.to_string(), ui::StyleType::TotalValue),
        top_cities.len(),
        locations.len()
    );
    Ok(locations)
}

/// Transform stage: enriches the raw holdings and writes the three outputs.
pub fn transform(paths: &DataPaths) -> Result<()> {
    let holdings = pipeline::load_raw(&paths.raw)?;
    let locations = LocationCache::new(&paths.locations).load()?;

    let enriched = pipeline::enrich(&holdings, &locations);
    pipeline::transform::save_enriched(&paths.enriched, &enriched)?;

    let sectors = pipeline::summarize_by_sector(&enriched);
    pipeline::transform::save_sector_summary(&paths.sector_summary, &sectors)?;

    let countries = pipeline::summarize_by_country(&enriched);
    pipeline::transform::save_country_summary(&paths.country_summary, &countries)?;

    info!(
        enriched = %paths.enriched.display(),
        sectors = sectors.len(),
        countries = countries.len(),
        "Transform complete"
    );
    println!(
        "Wrote {} holdings, {} sectors and {} countries",
        ui::style_text(&enriched.len().to_string(), ui::StyleType::TotalValue),
        sectors.len(),
        countries.len()
    );
    Ok(())
}

/// Runs extract, geocode and transform in sequence.
pub async fn run_all(
    config: &AppConfig,
    paths: &DataPaths,
    options: &PipelineOptions,
    geocoder: &(dyn Geocoder + Send + Sync),
) -> Result<()> {
    let holdings = extract(config, paths, options)?;
    ui::print_separator();
    geocode(config, paths, options, &holdings, geocoder).await?;
    ui::print_separator();
    transform(paths)
}
