//! Batch configuration files.
//!
//! A batch file is JSON, YAML or TOML, picked by extension. Every tunable
//! follows the same precedence: command-line override, then the file, then
//! the built-in default below.

use crate::error::{BatchError, Result};
use crate::retry::RetryPolicy;
use crate::types::{BatchDefaults, BatchSpec, JobSpec};
use crate::validate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use vidbatch_abstraction::{VideoModel, VideoSize};

/// Jobs executing at once when nothing else is configured.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;
/// Batch deadline: 30 minutes.
pub const DEFAULT_TIMEOUT_MS: u64 = 1_800_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 120;

pub const MAX_JOBS: usize = 100;
pub const MAX_CONCURRENT_LIMIT: usize = 5;
pub const MIN_TIMEOUT_MS: u64 = 60_000;
pub const MAX_TIMEOUT_MS: u64 = 3_600_000;
pub const MIN_POLL_INTERVAL_MS: u64 = 5_000;
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;
pub const MAX_POLL_ATTEMPTS_LIMIT: u32 = 1_000;
pub const MAX_RETRIES_LIMIT: u32 = 5;
pub const MIN_RETRY_DELAY_MS: u64 = 100;
pub const MAX_RETRY_DELAY_MS: u64 = 60_000;
pub const MAX_PROMPT_CHARS: usize = 32_000;

/// On-disk batch description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    /// Jobs in submission order.
    pub jobs: Vec<JobSpec>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub max_concurrent: Option<usize>,
    /// Batch deadline in milliseconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Poll interval in milliseconds.
    #[serde(default)]
    pub poll_interval: Option<u64>,
    #[serde(default)]
    pub max_poll_attempts: Option<u32>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicyConfig>,
    #[serde(default)]
    pub default_model: Option<VideoModel>,
    #[serde(default)]
    pub default_size: Option<VideoSize>,
    #[serde(default)]
    pub default_seconds: Option<u32>,
}

/// Retry settings as written in a batch file. Missing keys keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicyConfig {
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub retry_on_errors: Option<Vec<String>>,
}

impl RetryPolicyConfig {
    fn resolve(self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_delay_ms: self.retry_delay_ms.unwrap_or(defaults.retry_delay_ms),
            retry_patterns: self.retry_on_errors.unwrap_or(defaults.retry_patterns),
        }
    }
}

/// Values supplied on the command line. `Some` beats the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub output_dir: Option<PathBuf>,
    pub timeout_ms: Option<u64>,
    pub max_concurrent: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub max_poll_attempts: Option<u32>,
    pub allow_path_escape: bool,
}

/// Supported batch file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Picks the format from a file extension, defaulting to JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
            Some("yaml" | "yml") => Self::Yaml,
            Some("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

impl BatchConfig {
    /// Reads and parses a batch file.
    ///
    /// # Errors
    /// Returns `BatchError::Config` if the file is missing, unreadable or malformed.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BatchError::Config(format!("File not found: {}", path.display())));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| BatchError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let format = ConfigFormat::from_path(path);
        debug!(path = %path.display(), ?format, "Loading batch configuration");
        Self::parse(&content, format)
            .map_err(|e| BatchError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parses batch file content in the given format.
    ///
    /// # Errors
    /// Returns `BatchError::Config` with the parser's message.
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Json => serde_json::from_str(content)
                .map_err(|e| BatchError::Config(format!("Invalid JSON: {}", e))),
            ConfigFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| BatchError::Config(format!("Invalid YAML: {}", e))),
            ConfigFormat::Toml => toml::from_str(content)
                .map_err(|e| BatchError::Config(format!("Invalid TOML: {}", e))),
        }
    }

    /// Applies overrides and defaults, then validates the result.
    ///
    /// # Errors
    /// Returns `BatchError::Validation` listing every problem found.
    pub fn into_spec(self, overrides: &ConfigOverrides) -> Result<BatchSpec> {
        let base = BatchDefaults::default();
        let defaults = BatchDefaults {
            model: self.default_model.unwrap_or(base.model),
            size: self.default_size.unwrap_or(base.size),
            seconds: self.default_seconds.unwrap_or(base.seconds),
            output_dir: overrides.output_dir.clone().or(self.output_dir),
        };

        let timeout_ms = overrides.timeout_ms.or(self.timeout).unwrap_or(DEFAULT_TIMEOUT_MS);
        let poll_interval_ms =
            overrides.poll_interval_ms.or(self.poll_interval).unwrap_or(DEFAULT_POLL_INTERVAL_MS);

        let spec = BatchSpec {
            jobs: self.jobs,
            defaults,
            max_concurrent: overrides
                .max_concurrent
                .or(self.max_concurrent)
                .unwrap_or(DEFAULT_MAX_CONCURRENT),
            timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_poll_attempts: overrides
                .max_poll_attempts
                .or(self.max_poll_attempts)
                .unwrap_or(DEFAULT_MAX_POLL_ATTEMPTS),
            retry_policy: self.retry_policy.unwrap_or_default().resolve(),
            allow_path_escape: overrides.allow_path_escape,
        };

        validate::validate_config(&spec)?;
        Ok(spec)
    }
}
