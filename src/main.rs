//! CLI entry point for the grid timeseries tool.
//!
//! Provides subcommands for merging all downloaded provider files into
//! per-resolution datasets, inspecting a single file through one reader, and
//! printing the parsed form parameters of a parameter file.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use grid_timeseries::aggregate::{Aggregator, Outcome, default_cutoff};
use grid_timeseries::config::SourceCatalog;
use grid_timeseries::output::{dataset_path, print_json, print_pretty, write_dataset};
use grid_timeseries::params::PostParameters;
use grid_timeseries::readers::{self, ReaderParams, Source};
use grid_timeseries::series::{LabelNames, Resolution};
use grid_timeseries::stats::DatasetSummary;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "grid_timeseries")]
#[command(about = "Normalize and merge European electricity market timeseries", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read every configured source and write one CSV per resolution
    Read {
        /// JSON source catalog
        #[arg(short, long, default_value = "sources.json")]
        sources: PathBuf,

        /// Download directory holding `<source>/<variable>/<container>/<file>`
        #[arg(short = 'i', long, default_value = "downloads")]
        input_dir: PathBuf,

        /// Directory to write `time_series_<resolution>.csv` files to
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// Only read these sources (repeatable)
        #[arg(long = "source")]
        subset: Vec<String>,

        /// Last UTC instant to keep (RFC 3339)
        #[arg(long)]
        cutoff: Option<DateTime<Utc>>,

        /// Keep every row regardless of the cutoff
        #[arg(long, default_value_t = false)]
        no_cutoff: bool,
    },
    /// Read a single file with one provider's reader and print its coverage
    Inspect {
        /// Provider name as used in the source catalog, e.g. "TenneT"
        #[arg(long)]
        source: String,

        /// Variable name, e.g. "wind" or "wind_forecast"
        #[arg(long)]
        variable: String,

        #[arg(long, default_value = "15min")]
        resolution: Resolution,

        #[arg(long, default_value = "")]
        web: String,

        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Parse a `key=value` form parameter file and print it as JSON
    PostParams {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long, default_value = "")]
        view_state: String,

        #[arg(long, default_value = "")]
        event_validation: String,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/grid_timeseries.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("grid_timeseries.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Read {
            sources,
            input_dir,
            output_dir,
            subset,
            cutoff,
            no_cutoff,
        } => {
            let cutoff = if no_cutoff {
                None
            } else {
                Some(cutoff.unwrap_or_else(default_cutoff))
            };
            run_read(&sources, &input_dir, &output_dir, subset, cutoff)?;
        }
        Commands::Inspect {
            source,
            variable,
            resolution,
            web,
            file,
        } => {
            let source =
                Source::from_name(&source).ok_or_else(|| anyhow!("no reader for source {source:?}"))?;
            let params = ReaderParams::new(variable, web, resolution);
            let series = readers::read(source, &file, &params, &LabelNames::default())
                .with_context(|| format!("reading {}", file.display()))?;
            let summary = DatasetSummary::from_series(resolution, &series);
            print_pretty(&summary);
            print_json(&summary)?;
        }
        Commands::PostParams {
            file,
            view_state,
            event_validation,
        } => {
            let params = PostParameters::load(&file, Utc::now().date_naive())?
                .with_form_state(&view_state, &event_validation);
            println!("{}", serde_json::to_string_pretty(&params.to_json())?);
        }
    }

    Ok(())
}

/// Runs the merge driver and writes one CSV per non-empty resolution.
#[tracing::instrument(skip(subset), fields(sources = %sources.display(), input_dir = %input_dir.display()))]
fn run_read(
    sources: &Path,
    input_dir: &Path,
    output_dir: &Path,
    subset: Vec<String>,
    cutoff: Option<DateTime<Utc>>,
) -> Result<()> {
    let catalog = SourceCatalog::load(sources)?;
    if catalog.is_empty() {
        warn!("source catalog is empty");
    }

    let mut aggregator = Aggregator::new(input_dir).with_cutoff(cutoff);
    if !subset.is_empty() {
        aggregator = aggregator.with_subset(subset);
    }
    let run = aggregator.run(&catalog);

    let merged = run.outcomes.iter().filter(|o| o.is_merged()).count();
    let failed = run
        .outcomes
        .iter()
        .filter(|o| matches!(o, Outcome::Failed { .. }))
        .count();
    info!(
        outcomes = run.outcomes.len(),
        merged,
        failed,
        "Read summary"
    );

    std::fs::create_dir_all(output_dir)?;
    for (resolution, series) in &run.datasets {
        let path = dataset_path(output_dir, *resolution);
        write_dataset(&path, series)?;
        let summary = DatasetSummary::from_series(*resolution, series);
        info!(
            %resolution,
            path = %path.display(),
            rows = summary.rows,
            empty_rows = summary.empty_rows,
            min_coverage_pct = summary.min_coverage_pct(),
            "Dataset written"
        );
        print_json(&summary)?;
    }

    Ok(())
}
