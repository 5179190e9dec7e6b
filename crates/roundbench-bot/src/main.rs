//! roundbench - Place/cancel round-trip latency harness
//!
//! Places one resting limit order, waits for its push confirmation, cancels
//! it, waits again, and prints the checkpoint record as one JSON line.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use roundbench_bot::{AppConfig, Application, RunReport};
use roundbench_telemetry::Metrics;
use tracing::{error, info};

/// Startup or configuration failure.
const EXIT_STARTUP: u8 = 2;

/// Place/cancel round-trip latency harness
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via ROUNDBENCH_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the order symbol
    #[arg(long)]
    symbol: Option<String>,

    /// Override the client order id
    #[arg(long)]
    client_order_id: Option<String>,

    /// Override the confirm timeout (ms)
    #[arg(long)]
    confirm_timeout_ms: Option<u64>,

    /// Print Prometheus metrics to stderr after the run
    #[arg(long)]
    dump_metrics: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize TLS crypto provider (must be before any WS connections)
    roundbench_ws::init_crypto();

    let args = Args::parse();
    let dump_metrics = args.dump_metrics;

    let report = match run(args).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = ?e, "Startup failed");
            eprintln!("roundbench: {e:#}");
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    match report.to_json() {
        Ok(line) => println!("{line}"),
        Err(e) => {
            error!(error = %e, "Failed to serialize run record");
            return ExitCode::from(EXIT_STARTUP);
        }
    }

    if dump_metrics {
        match Metrics::render() {
            Ok(text) => eprint!("{text}"),
            Err(e) => error!(error = %e, "Failed to render metrics"),
        }
    }

    report.exit_code()
}

async fn run(args: Args) -> Result<RunReport> {
    roundbench_telemetry::init_logging()?;

    info!("Starting roundbench v{}", env!("CARGO_PKG_VERSION"));

    // Config path: CLI arg > ROUNDBENCH_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("ROUNDBENCH_CONFIG").ok());

    let mut config = AppConfig::load(config_path.as_deref()).context("loading configuration")?;
    config.apply_overrides(args.symbol, args.client_order_id, args.confirm_timeout_ms);
    info!(
        rest_url = %config.rest_url,
        symbol = %config.order.symbol,
        "Configuration loaded"
    );

    let app = Application::new(config)?;
    let report = app.run().await?;
    Ok(report)
}
