use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use holdmap::cli::pipeline::PipelineOptions;
use holdmap::cli::report::{ReportOptions, SectorSort};
use holdmap::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Clone, Default)]
struct StageArgs {
    /// Holdings CSV to extract (overrides `source_file`)
    #[arg(long)]
    source: Option<String>,

    /// Number of top locations by market cap to consider
    #[arg(long)]
    top_n: Option<usize>,

    /// Maximum geocoding requests for this run
    #[arg(long)]
    max_new_requests: Option<usize>,
}

impl From<StageArgs> for PipelineOptions {
    fn from(args: StageArgs) -> PipelineOptions {
        PipelineOptions {
            source: args.source,
            top_n: args.top_n,
            max_new_requests: args.max_new_requests,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Copy the source holdings to the raw cache and list the top locations
    Extract {
        /// Holdings CSV to extract (overrides `source_file`)
        #[arg(long)]
        source: Option<String>,
        /// Number of top locations by market cap to list
        #[arg(long)]
        top_n: Option<usize>,
    },
    /// Geocode the top locations missing from the location cache
    Geocode {
        /// Number of top locations by market cap to consider
        #[arg(long)]
        top_n: Option<usize>,
        /// Maximum geocoding requests for this run
        #[arg(long)]
        max_new_requests: Option<usize>,
    },
    /// Build the enriched dataset and the sector and country summaries
    Transform,
    /// Run extract, geocode and transform in sequence
    Run(StageArgs),
    /// Display the portfolio report from the transform outputs
    Report {
        /// Sector table ordering: weight, marketcap or companies
        #[arg(long, default_value = "weight")]
        sort: SectorSort,
        /// Sort sectors ascending instead of descending
        #[arg(long)]
        ascending: bool,
        /// Only list companies in this country
        #[arg(long)]
        country: Option<String>,
        /// Only list companies in this sector; also filters the map
        #[arg(long)]
        sector: Option<String>,
        /// Show the profile of one company
        #[arg(long)]
        symbol: Option<String>,
    },
}

impl From<Commands> for holdmap::AppCommand {
    fn from(cmd: Commands) -> holdmap::AppCommand {
        match cmd {
            Commands::Extract { source, top_n } => holdmap::AppCommand::Extract(PipelineOptions {
                source,
                top_n,
                ..Default::default()
            }),
            Commands::Geocode {
                top_n,
                max_new_requests,
            } => holdmap::AppCommand::Geocode(PipelineOptions {
                top_n,
                max_new_requests,
                ..Default::default()
            }),
            Commands::Transform => holdmap::AppCommand::Transform,
            Commands::Run(args) => holdmap::AppCommand::Run(args.into()),
            Commands::Report {
                sort,
                ascending,
                country,
                sector,
                symbol,
            } => holdmap::AppCommand::Report(ReportOptions {
                sort,
                ascending,
                country,
                sector,
                symbol,
            }),
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => holdmap::cli::setup::setup(),
        Some(cmd) => holdmap::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
