//! Terminal report over the persisted pipeline outputs. Read-only: nothing
//! here writes back to the data directory.

use super::ui;
use crate::core::cache::Cache;
use crate::core::config::DataPaths;
use crate::pipeline::transform::{
    CountrySummary, EnrichedHolding, SectorSummary, load_country_summary, load_enriched,
    load_sector_summary,
};
use anyhow::{Context, Result};
use comfy_table::Cell;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SectorSort {
    #[default]
    Weight,
    Marketcap,
    Companies,
}

impl Display for SectorSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                SectorSort::Weight => "Total Weight",
                SectorSort::Marketcap => "Average Market Cap (Billions)",
                SectorSort::Companies => "Number of Companies",
            }
        )
    }
}

impl FromStr for SectorSort {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weight" => Ok(SectorSort::Weight),
            "marketcap" => Ok(SectorSort::Marketcap),
            "companies" => Ok(SectorSort::Companies),
            _ => Err(anyhow::anyhow!("Invalid sector sort: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    pub sort: SectorSort,
    pub ascending: bool,
    pub country: Option<String>,
    pub sector: Option<String>,
    pub symbol: Option<String>,
}

/// Loaded datasets, memoised per file path for the life of the process.
#[derive(Debug, Default)]
pub struct Datasets {
    enriched: Cache<PathBuf, Vec<EnrichedHolding>>,
    sectors: Cache<PathBuf, Vec<SectorSummary>>,
    countries: Cache<PathBuf, Vec<CountrySummary>>,
}

/// Borrowed view of the three datasets a report renders.
#[derive(Debug, Clone, Copy)]
pub struct ReportData<'a> {
    pub enriched: &'a [EnrichedHolding],
    pub sectors: &'a [SectorSummary],
    pub countries: &'a [CountrySummary],
}

impl Datasets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, paths: &DataPaths) -> Result<ReportData<'_>> {
        let enriched = self
            .enriched
            .get_or_try_load(paths.enriched.clone(), |p| load_enriched(p))
            .context("Could not load enriched holdings; run `transform` first")?;
        let sectors = self
            .sectors
            .get_or_try_load(paths.sector_summary.clone(), |p| load_sector_summary(p))
            .context("Could not load sector summary; run `transform` first")?;
        let countries = self
            .countries
            .get_or_try_load(paths.country_summary.clone(), |p| load_country_summary(p))
            .context("Could not load country summary; run `transform` first")?;

        Ok(ReportData {
            enriched,
            sectors,
            countries,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub companies: usize,
    pub sectors: usize,
    pub countries: usize,
    pub total_weight: f64,
}

/// Headline counts; distinct counts ignore rows where the value is missing.
pub fn metrics(enriched: &[EnrichedHolding]) -> Metrics {
    fn distinct<'a>(values: impl Iterator<Item = Option<&'a str>>) -> usize {
        values.flatten().collect::<HashSet<_>>().len()
    }

    Metrics {
        companies: distinct(enriched.iter().map(|e| e.symbol.as_deref())),
        sectors: distinct(enriched.iter().map(|e| e.sector.as_deref())),
        countries: distinct(enriched.iter().map(|e| e.country.as_deref())),
        total_weight: enriched.iter().filter_map(|e| e.weight).sum(),
    }
}

/// Orders two optional values, always placing `None` last.
fn cmp_missing_last(a: Option<f64>, b: Option<f64>, ascending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if ascending => a.total_cmp(&b),
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn sorted_sectors(sectors: &[SectorSummary], sort: SectorSort, ascending: bool) -> Vec<&SectorSummary> {
    let value = |s: &SectorSummary| match sort {
        SectorSort::Weight => Some(s.total_weight),
        SectorSort::Marketcap => s.avg_marketcap_bil,
        SectorSort::Companies => Some(s.num_companies as f64),
    };
    let mut sorted: Vec<_> = sectors.iter().collect();
    sorted.sort_by(|a, b| cmp_missing_last(value(a), value(b), ascending));
    sorted
}

/// Number of locations listed in the map section.
pub const MAP_POINT_LIMIT: usize = 20;

/// A mappable location: only holdings with both coordinates contribute.
#[derive(Debug, Clone, PartialEq)]
pub struct MapPoint {
    pub location: String,
    pub lat: f64,
    pub lon: f64,
    pub companies: usize,
    pub total_marketcap: f64,
    pub total_weight: f64,
}

fn matches_filter(value: Option<&str>, filter: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(f) => value.is_some_and(|v| v.eq_ignore_ascii_case(f)),
    }
}

/// Groups geocoded holdings in `sector` (all sectors when `None`) by location
/// and keeps the [`MAP_POINT_LIMIT`] largest by total market cap.
pub fn map_points(enriched: &[EnrichedHolding], sector: Option<&str>) -> Vec<MapPoint> {
    let mut points: Vec<MapPoint> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for holding in enriched {
        if !matches_filter(holding.sector.as_deref(), sector) {
            continue;
        }
        let Some((lat, lon)) = holding.coordinates() else {
            continue;
        };
        let location = holding.location_key().full_location();
        let i = *positions.entry(location.clone()).or_insert_with(|| {
            points.push(MapPoint {
                location,
                lat,
                lon,
                companies: 0,
                total_marketcap: 0.0,
                total_weight: 0.0,
            });
            points.len() - 1
        });
        points[i].companies += 1;
        points[i].total_marketcap += holding.marketcap.unwrap_or(0.0);
        points[i].total_weight += holding.weight.unwrap_or(0.0);
    }

    points.sort_by(|a, b| b.total_marketcap.total_cmp(&a.total_marketcap));
    points.truncate(MAP_POINT_LIMIT);
    points
}

/// Holdings matching the optional country and sector filters (ASCII
/// case-insensitive), largest market cap first.
pub fn drilldown<'a>(
    enriched: &'a [EnrichedHolding],
    country: Option<&str>,
    sector: Option<&str>,
) -> Vec<&'a EnrichedHolding> {
    let mut rows: Vec<_> = enriched
        .iter()
        .filter(|e| {
            matches_filter(e.country.as_deref(), country)
                && matches_filter(e.sector.as_deref(), sector)
        })
        .collect();
    rows.sort_by(|a, b| cmp_missing_last(a.marketcap, b.marketcap, false));
    rows
}

/// First holding whose symbol matches, ignoring ASCII case.
pub fn find_company<'a>(enriched: &'a [EnrichedHolding], symbol: &str) -> Option<&'a EnrichedHolding> {
    enriched
        .iter()
        .find(|e| e.symbol.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(symbol)))
}

fn display_metrics(m: &Metrics) -> String {
    format!(
        "{}\n\nCompanies: {}   Sectors: {}   Countries: {}   {} {}",
        ui::style_text("Equity Portfolio Explorer", ui::StyleType::Title),
        m.companies,
        m.sectors,
        m.countries,
        ui::style_text("Total Portfolio Weight:", ui::StyleType::TotalLabel),
        ui::style_text(&format!("{:.2}", m.total_weight), ui::StyleType::TotalValue)
    )
}

fn display_sector_table(sectors: &[&SectorSummary], sort: SectorSort) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Sector"),
        ui::header_cell("Total Weight"),
        ui::header_cell("Avg Revenue Growth"),
        ui::header_cell("Avg Market Cap (B)"),
        ui::header_cell("Companies"),
    ]);

    for s in sectors {
        table.add_row(vec![
            ui::key_cell(s.sector.as_deref()),
            ui::number_cell(format!("{:.4}", s.total_weight)),
            ui::format_optional_cell(s.avg_revenue_growth, |g| format!("{:.2}%", g * 100.0)),
            ui::format_optional_cell(s.avg_marketcap_bil, |m| format!("{m:.2}")),
            ui::number_cell(s.num_companies.to_string()),
        ]);
    }

    format!(
        "{}\n\n{}",
        ui::style_text(&format!("Sector Allocation ({sort})"), ui::StyleType::Title),
        table
    )
}

fn display_country_table(countries: &[CountrySummary]) -> String {
    let mut sorted: Vec<_> = countries.iter().collect();
    sorted.sort_by(|a, b| b.total_weight.total_cmp(&a.total_weight));

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Country"),
        ui::header_cell("Total Weight"),
        ui::header_cell("Companies"),
    ]);
    for c in sorted {
        table.add_row(vec![
            ui::key_cell(c.country.as_deref()),
            ui::number_cell(format!("{:.4}", c.total_weight)),
            ui::number_cell(c.num_companies.to_string()),
        ]);
    }

    format!(
        "{}\n\n{}",
        ui::style_text("Country Allocation (Total Weight)", ui::StyleType::Title),
        table
    )
}

fn display_map_points(points: &[MapPoint], sector: Option<&str>, unmapped: usize) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Location"),
        ui::header_cell("Lat"),
        ui::header_cell("Lon"),
        ui::header_cell("Companies"),
        ui::header_cell("Market Cap (B)"),
        ui::header_cell("Total Weight"),
    ]);
    for p in points {
        table.add_row(vec![
            Cell::new(&p.location),
            ui::number_cell(format!("{:.4}", p.lat)),
            ui::number_cell(format!("{:.4}", p.lon)),
            ui::number_cell(p.companies.to_string()),
            ui::number_cell(format!("{:.2}", p.total_marketcap / 1e9)),
            ui::number_cell(format!("{:.4}", p.total_weight)),
        ]);
    }

    let title = format!(
        "Top Headquarter Cities ({})",
        sector.unwrap_or("All Sectors")
    );
    format!(
        "{}\n\n{}\n{}",
        ui::style_text(&title, ui::StyleType::Title),
        table,
        ui::style_text(
            &format!("{unmapped} holdings without coordinates are not shown"),
            ui::StyleType::Subtle
        )
    )
}

fn display_drilldown(rows: &[&EnrichedHolding], options: &ReportOptions) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Symbol"),
        ui::header_cell("Name"),
        ui::header_cell("Market Cap (B)"),
        ui::header_cell("Weight (%)"),
        ui::header_cell("Revenue Growth"),
    ]);
    for e in rows {
        table.add_row(vec![
            ui::key_cell(e.symbol.as_deref()),
            ui::key_cell(e.long_name.as_deref()),
            ui::format_optional_cell(e.marketcap_billions, |m| format!("{m:.2}")),
            ui::format_optional_cell(e.weight_percent, |w| format!("{w:.2}%")),
            ui::format_optional_cell(e.revenue_growth, |g| format!("{:.2}%", g * 100.0)),
        ]);
    }

    let title = format!(
        "Companies in {} / {}",
        options.country.as_deref().unwrap_or("All Countries"),
        options.sector.as_deref().unwrap_or("All Sectors")
    );
    format!(
        "{}\n\n{}",
        ui::style_text(&title, ui::StyleType::Title),
        table
    )
}

fn display_company(e: &EnrichedHolding) -> String {
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    let symbol = text(&e.symbol);
    let name = e.long_name.clone().unwrap_or_else(|| symbol.clone());

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Weight"),
        ui::header_cell("Market Cap (B)"),
        ui::header_cell("Revenue Growth"),
    ]);
    table.add_row(vec![
        ui::format_optional_cell(e.weight, |w| format!("{w:.2}")),
        ui::format_optional_cell(e.marketcap_billions, |m| format!("{m:.2}")),
        ui::format_optional_cell(e.revenue_growth, |g| format!("{:.2}%", g * 100.0)),
    ]);

    format!(
        "{}\n\n{}\nSector: {} | Industry: {}\nHeadquarters: {}, {}, {}\n\n{}\n{}",
        ui::style_text(&format!("{name} ({symbol})"), ui::StyleType::Title),
        table,
        text(&e.sector),
        text(&e.industry),
        text(&e.city),
        text(&e.state),
        text(&e.country),
        ui::style_text("Business Summary", ui::StyleType::TotalLabel),
        e.long_business_summary
            .as_deref()
            .unwrap_or("No summary available.")
    )
}

/// Renders the whole report as one string.
pub fn render(data: ReportData<'_>, options: &ReportOptions) -> String {
    let mut sections = vec![
        display_metrics(&metrics(data.enriched)),
        display_sector_table(
            &sorted_sectors(data.sectors, options.sort, options.ascending),
            options.sort,
        ),
        display_country_table(data.countries),
    ];

    let sector = options.sector.as_deref();
    let points = map_points(data.enriched, sector);
    let unmapped = data
        .enriched
        .iter()
        .filter(|e| matches_filter(e.sector.as_deref(), sector) && e.coordinates().is_none())
        .count();
    sections.push(display_map_points(&points, sector, unmapped));

    let mut company = None;
    if options.country.is_some() || options.sector.is_some() {
        let rows = drilldown(data.enriched, options.country.as_deref(), sector);
        debug!(rows = rows.len(), "Drilldown");
        sections.push(display_drilldown(&rows, options));
        if let [only] = rows.as_slice() {
            company = Some(*only);
        }
    }

    if let Some(symbol) = options.symbol.as_deref() {
        company = find_company(data.enriched, symbol);
        if company.is_none() {
            sections.push(ui::style_text(
                &format!("No holding with symbol {symbol}"),
                ui::StyleType::Subtle,
            ));
        }
    }
    if let Some(company) = company {
        sections.push(display_company(company));
    }

    sections.join("\n\n")
}

pub fn run(datasets: &mut Datasets, paths: &DataPaths, options: &ReportOptions) -> Result<()> {
    let data = datasets.load(paths)?;
    println!("{}", render(data, options));
    Ok(())
}
