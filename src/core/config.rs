use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

pub const RAW_FILE: &str = "stocks_raw.csv";
pub const LOCATIONS_FILE: &str = "locations_geocoded.csv";
pub const ENRICHED_FILE: &str = "stocks_enriched.csv";
pub const SECTOR_SUMMARY_FILE: &str = "sector_summary.csv";
pub const COUNTRY_SUMMARY_FILE: &str = "country_summary.csv";

fn default_top_n() -> usize {
    20
}

fn default_max_new_requests() -> usize {
    50
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub source_file: String,
    pub data_path: Option<String>,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_max_new_requests")]
    pub max_new_requests: usize,
    pub geocoder: GeocoderConfig,
}

/// Locations of every file the pipeline persists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub raw: PathBuf,
    pub locations: PathBuf,
    pub enriched: PathBuf,
    pub sector_summary: PathBuf,
    pub country_summary: PathBuf,
}

impl DataPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            raw: dir.join(RAW_FILE),
            locations: dir.join(LOCATIONS_FILE),
            enriched: dir.join(ENRICHED_FILE),
            sector_summary: dir.join(SECTOR_SUMMARY_FILE),
            country_summary: dir.join(COUNTRY_SUMMARY_FILE),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "holdmap", "holdmap")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("io", "holdmap", "holdmap")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    /// Resolves the data directory, creating it if needed.
    pub fn data_paths(&self) -> Result<DataPaths> {
        let dir = self.default_data_path()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
        Ok(DataPaths::in_dir(&dir))
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
