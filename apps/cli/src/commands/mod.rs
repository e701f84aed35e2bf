//! Command implementations.

pub mod estimate;
pub mod run;

use anyhow::Context;
use std::path::Path;
use vidbatch_core::{BatchConfig, BatchSpec, ConfigOverrides};

/// Loads a batch file and applies command-line overrides.
pub(crate) fn load_spec(path: &Path, overrides: &ConfigOverrides) -> anyhow::Result<BatchSpec> {
    let config = BatchConfig::from_path(path)
        .with_context(|| format!("Failed to load batch file: {}", path.display()))?;
    let spec = config.into_spec(overrides)?;
    Ok(spec)
}
