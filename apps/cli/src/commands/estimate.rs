//! `--estimate-only`: price a batch without touching the network.

use crate::OutputFormat;
use crate::output::render_estimate;
use std::path::Path;
use tracing::info;
use vidbatch_core::{ConfigOverrides, estimate_cost};

/// Prints the cost band of the batch in `config`.
pub fn execute(config: &Path, overrides: &ConfigOverrides, format: OutputFormat) -> anyhow::Result<()> {
    let spec = super::load_spec(config, overrides)?;
    let estimate = estimate_cost(&spec);
    info!(jobs = estimate.total_jobs, nominal = estimate.nominal_cost, "Estimated batch cost");

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&estimate)?),
        OutputFormat::Text => render_estimate(&estimate),
    }
    Ok(())
}
