pub mod cli;
pub mod core;
pub mod pipeline;
pub mod providers;
pub mod store;

use crate::cli::pipeline::PipelineOptions;
use crate::cli::report::{Datasets, ReportOptions};
use crate::core::config::AppConfig;
use crate::providers::geocoding::HttpGeocoder;
use anyhow::Result;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub enum AppCommand {
    Extract(PipelineOptions),
    Geocode(PipelineOptions),
    Transform,
    Run(PipelineOptions),
    Report(ReportOptions),
}

fn geocoder(config: &AppConfig) -> Result<HttpGeocoder> {
    HttpGeocoder::new(
        &config.geocoder.base_url,
        config.geocoder.api_key.as_deref(),
    )
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("holdmap starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    let paths = config.data_paths()?;

    match command {
        AppCommand::Extract(options) => {
            cli::pipeline::extract(&config, &paths, &options)?;
            Ok(())
        }
        AppCommand::Geocode(options) => {
            let holdings = pipeline::load_raw(&paths.raw)?;
            cli::pipeline::geocode(&config, &paths, &options, &holdings, &geocoder(&config)?)
                .await?;
            Ok(())
        }
        AppCommand::Transform => cli::pipeline::transform(&paths),
        AppCommand::Run(options) => {
            cli::pipeline::run_all(&config, &paths, &options, &geocoder(&config)?).await
        }
        AppCommand::Report(options) => {
            let mut datasets = Datasets::new();
            cli::report::run(&mut datasets, &paths, &options)
        }
    }
}
