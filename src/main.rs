#![forbid(unsafe_code)]

//! `relay-bench`: direct vs shared-daemon MCP server benchmark.
//!
//! Loads configuration, runs the experiment phases, prints the result
//! tables to stdout, and optionally exports the full report as JSON.
//! Logs go to stderr.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use relay_bench::orchestrator::Experiment;
use relay_bench::report::{export_json, ConsoleReport};
use relay_bench::{AppError, BenchConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "relay-bench",
    about = "Compare direct MCP servers with a shared daemon and relays",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML configuration file; built-in defaults otherwise.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the relay executable.
    #[arg(long)]
    relay: Option<PathBuf>,

    /// Override the session counts, e.g. `2,3,5`.
    #[arg(long, value_delimiter = ',')]
    counts: Option<Vec<usize>>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Also write the full report as JSON to this path.
    #[arg(long)]
    json: Option<PathBuf>,

    /// Skip the cache warmup before the first phase.
    #[arg(long)]
    no_warmup: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("relay-bench starting");

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = load_config(&args)?;
    info!(
        relay = %config.relay_binary.display(),
        server = ?config.server_command,
        counts = ?config.session_counts,
        "configuration loaded"
    );

    let server = config.server_command.join(" ");
    let experiment = Experiment::for_platform(config);
    let report = experiment.run().await.map_err(|err| {
        error!(%err, "experiment aborted");
        err
    })?;

    println!("{}", ConsoleReport::new(&report, &server));

    if let Some(path) = &args.json {
        export_json(&report, path)?;
    }
    Ok(())
}

fn load_config(args: &Cli) -> Result<BenchConfig> {
    let mut config = match &args.config {
        Some(path) => BenchConfig::load_from_path(path)?,
        None => BenchConfig::default(),
    };

    if let Some(relay) = &args.relay {
        config.relay_binary.clone_from(relay);
    }
    if let Some(counts) = &args.counts {
        config.session_counts.clone_from(counts);
    }
    if args.no_warmup {
        config.warmup = false;
    }

    config.validate()?;
    Ok(config)
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
