//! Provider factory for creating `VideoApi` instances from configuration.
//!
//! This module handles provider selection and API key loading from
//! environment variables.

use crate::{MockVideoApi, OpenAIVideoClient};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;
use vidbatch_abstraction::{VideoApi, VideoError};

/// Environment variable selecting the provider.
pub const PROVIDER_ENV: &str = "VIDBATCH_PROVIDER";

/// Provider type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderType {
    /// Offline mock provider.
    Mock,
    /// OpenAI video API.
    #[default]
    OpenAI,
}

impl FromStr for ProviderType {
    type Err = VideoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "openai" | "" => Ok(Self::OpenAI),
            other => Err(VideoError::InvalidInput(format!(
                "unknown provider '{}' (expected 'openai' or 'mock')",
                other
            ))),
        }
    }
}

/// Provider configuration.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    /// Which provider to build.
    pub provider: ProviderType,
    /// Optional API key (if not provided, will be loaded from environment).
    pub api_key: Option<String>,
    /// Optional API root override.
    pub base_url: Option<String>,
}

impl ProviderConfig {
    /// Reads the provider choice from `VIDBATCH_PROVIDER`, defaulting to OpenAI.
    ///
    /// # Errors
    /// Returns `VideoError::InvalidInput` for an unknown provider name.
    #[allow(clippy::disallowed_methods)]
    pub fn from_env() -> Result<Self, VideoError> {
        let provider = match std::env::var(PROVIDER_ENV) {
            Ok(value) => value.parse()?,
            Err(_) => ProviderType::default(),
        };
        Ok(Self { provider, ..Self::default() })
    }
}

/// Factory for creating `VideoApi` instances.
pub struct VideoApiFactory;

impl VideoApiFactory {
    /// Creates a provider instance from the given configuration.
    ///
    /// # Errors
    /// Returns a `VideoError` if provider creation fails (e.g., missing API key).
    pub fn create(config: ProviderConfig) -> Result<Arc<dyn VideoApi>, VideoError> {
        debug!(provider = ?config.provider, "Creating video API client");

        match config.provider {
            ProviderType::Mock => Ok(Arc::new(MockVideoApi::new())),
            ProviderType::OpenAI => {
                let client = match config.api_key {
                    Some(api_key) => OpenAIVideoClient::with_api_key(api_key),
                    None => OpenAIVideoClient::new()?,
                };
                let client = match config.base_url {
                    Some(base_url) => client.with_base_url(base_url),
                    None => client,
                };
                Ok(Arc::new(client))
            }
        }
    }
}
