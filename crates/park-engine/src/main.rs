//! park-engine: dynamic parking-lot pricing.
//!
//! Usage:
//!   park-engine [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>       Config file path (default: config/park.toml)
//!   -i, --input <FILE>        Observation JSON lines, `-` for stdin (default: stdin)
//!   -m, --model <MODEL>       Default pricing model: baseline, demand, competitive
//!   -w, --workers <N>         Worker task count (overrides config)
//!   --log-level <LEVEL>       trace, debug, info, warn, error
//!
//! Priced events are written to stdout as JSON lines; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::broadcast;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use park_engine::{
    EngineConfig, GeoIndex, JsonLinesSink, JsonLinesSource, ObservationSource, PricingEngine,
    PricingService, pump,
};

/// CLI arguments for park-engine.
#[derive(Parser, Debug)]
#[command(name = "park-engine")]
#[command(about = "Dynamic pricing engine for parking lots")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config/park.toml")]
    config: PathBuf,

    /// Observation input (JSON lines). `-` reads stdin.
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Default pricing model: baseline, demand, competitive (or 1, 2, 3)
    #[arg(short, long)]
    model: Option<String>,

    /// Number of worker tasks
    #[arg(short, long)]
    workers: Option<usize>,

    /// Log level (overrides config file)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    // Load environment variables from .env file (if present)
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {}", e);
    }

    let args = Args::parse();

    let config_found = args.config.exists();
    let mut config = if config_found {
        EngineConfig::from_file(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?
    } else {
        EngineConfig::default()
    };

    config.apply_env_overrides();
    config.apply_cli_overrides(args.model.clone(), args.workers, args.log_level.clone());

    if let Some(model) = &args.model
        && model.parse::<park_common::PricingModelKind>().is_err()
    {
        bail!("Unknown pricing model: {}", model);
    }

    // Logs go to stderr; stdout carries priced events only.
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global tracing subscriber")?;

    if !config_found {
        warn!("Config file not found at {:?}, using defaults", args.config);
    }

    info!("Starting park-engine");
    info!("Default model: {}", config.default_model);
    info!("Lots: {}", config.lots.len());

    config.validate().context("Configuration validation failed")?;

    if config.lots.is_empty() {
        bail!("No lots configured; add [[lots]] entries to {:?}", args.config);
    }
    let geo = GeoIndex::build_with_radius(&config.lots, config.geo.earth_radius_km)
        .context("Failed to build geo index")?;

    let engine = Arc::new(
        PricingEngine::new(config, Arc::new(geo)).context("Failed to create pricing engine")?,
    );
    let service = PricingService::spawn(Arc::clone(&engine), JsonLinesSink::stdout());

    let mut source: Box<dyn ObservationSource> = if args.input == "-" {
        Box::new(JsonLinesSource::stdin())
    } else {
        let file = tokio::fs::File::open(&args.input)
            .await
            .with_context(|| format!("Failed to open input {}", args.input))?;
        Box::new(JsonLinesSource::new(BufReader::new(file)))
    };

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, draining");
            let _ = shutdown_tx.send(());
        }
    });

    let pumped = pump(source.as_mut(), &service, shutdown_rx).await;

    let drained = service.shutdown().await;
    let metrics = engine.metrics();
    info!(
        processed = metrics.observations_processed,
        late = metrics.late_observations,
        clamped = metrics.clamped_prices,
        lots = metrics.lots_created,
        rejected = metrics.rejected_observations,
        "Final metrics"
    );

    let pumped = pumped.context("Observation source failed")?;
    let report = drained.context("Pricing service failed")?;
    if pumped.skipped > 0 {
        warn!(skipped = pumped.skipped, "Some input records were skipped");
    }
    if report.undelivered > 0 {
        error!(undelivered = report.undelivered, "Priced events were not delivered");
    }

    Ok(())
}
