//! Batch run: submit every job and report the outcomes.

use crate::OutputFormat;
use crate::output::render_report;
use anyhow::Context;
use std::path::Path;
use vidbatch_core::{BatchCoordinator, ConfigOverrides};
use vidbatch_models::{ProviderConfig, VideoApiFactory};

/// Runs the batch in `config`. Returns true when every job completed.
pub async fn execute(config: &Path, overrides: &ConfigOverrides, format: OutputFormat) -> anyhow::Result<bool> {
    let spec = super::load_spec(config, overrides)?;

    let provider = ProviderConfig::from_env()?;
    let api = VideoApiFactory::create(provider).context("Failed to create video API client")?;

    let report = BatchCoordinator::new(api).run(&spec).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => render_report(&report),
    }
    Ok(report.is_success())
}
