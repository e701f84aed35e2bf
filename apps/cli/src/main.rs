//! vidbatch - run batches of video generation jobs from a config file.
//!
//! Logs go to stderr so `--format json` leaves stdout as a single JSON
//! document.

mod commands;
mod output;

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use vidbatch_core::ConfigOverrides;

/// Batch video generation
///
/// Reads a JSON, YAML or TOML batch file, submits every job to the video API
/// under a concurrency cap, retries transient failures, and reports one
/// outcome per job.
#[derive(Parser, Debug)]
#[command(name = "vidbatch", author, version, about = "Batch video generation")]
struct Args {
    /// Batch configuration file (.json, .yaml, .yml or .toml)
    config: PathBuf,

    /// Directory for downloaded videos (overrides output_dir)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Batch deadline in milliseconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Maximum jobs running at once (1-5)
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Milliseconds between status checks of one job
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Status checks per job before it counts as timed out
    #[arg(long)]
    max_poll_attempts: Option<u32>,

    /// Print a cost estimate and exit without calling the API
    #[arg(long)]
    estimate_only: bool,

    /// Allow output paths outside the output directory
    #[arg(long)]
    allow_path_escape: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            output_dir: self.output_dir.clone(),
            timeout_ms: self.timeout,
            max_concurrent: self.max_concurrent,
            poll_interval_ms: self.poll_interval,
            max_poll_attempts: self.max_poll_attempts,
            allow_path_escape: self.allow_path_escape,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let overrides = args.overrides();
    let success = if args.estimate_only {
        commands::estimate::execute(&args.config, &overrides, args.format)?;
        true
    } else {
        commands::run::execute(&args.config, &overrides, args.format).await?
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
