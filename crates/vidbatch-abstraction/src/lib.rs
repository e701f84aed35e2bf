//! Video generation abstraction layer for vidbatch.
//!
//! This module defines the contract between the batch engine and a remote
//! video generation service: the `VideoApi` trait, the remote job types it
//! exchanges, and the `VideoError` taxonomy.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Represents an error that can occur when talking to a video generation service.
///
/// The `Display` output of each variant is what retry classification matches
/// against, so messages keep the raw status codes and provider wording but
/// never remote ids or local paths.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoError {
    /// The API key was missing or rejected (401).
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The account may not use the requested resource (403).
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The referenced video or endpoint does not exist (404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The provider throttled the request (429).
    #[error("Rate limit exceeded (429): {0}")]
    RateLimited(String),

    /// Any other non-success HTTP status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Error body or message returned by the provider.
        message: String,
    },

    /// Polling exhausted its attempt budget before a terminal state.
    #[error("Polling timeout: {0}")]
    Timeout(String),

    /// The remote job reached the `failed` terminal state.
    #[error("Video generation failed: {reason}")]
    GenerationFailed {
        /// Remote video id.
        video_id: String,
        /// Failure reason reported by the provider.
        reason: String,
    },

    /// The request could not be sent (network issues, DNS, TLS).
    #[error("Request error: {0}")]
    Request(String),

    /// A response body could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Reading an input reference or writing a download failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// The request was rejected locally before being sent.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Video generation models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VideoModel {
    /// Standard model.
    #[serde(rename = "sora-2")]
    Sora2,
    /// Higher fidelity model, also unlocks the high resolution sizes.
    #[serde(rename = "sora-2-pro")]
    Sora2Pro,
}

impl VideoModel {
    /// Durations (in seconds) every model accepts.
    pub const ALLOWED_SECONDS: [u32; 3] = [4, 8, 12];

    /// Returns the wire name of the model.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sora2 => "sora-2",
            Self::Sora2Pro => "sora-2-pro",
        }
    }

    /// Returns the durations this model accepts.
    pub const fn allowed_seconds(self) -> &'static [u32] {
        &Self::ALLOWED_SECONDS
    }

    /// Returns true if the model can render at the given size.
    pub const fn supports_size(self, size: VideoSize) -> bool {
        match self {
            Self::Sora2 => !size.is_high_res(),
            Self::Sora2Pro => true,
        }
    }
}

impl fmt::Display for VideoModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoModel {
    type Err = VideoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sora-2" => Ok(Self::Sora2),
            "sora-2-pro" => Ok(Self::Sora2Pro),
            other => Err(VideoError::InvalidInput(format!("unknown model '{}'", other))),
        }
    }
}

/// Output resolutions, written as `WIDTHxHEIGHT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VideoSize {
    /// 720x1280 portrait.
    #[serde(rename = "720x1280")]
    Portrait720,
    /// 1280x720 landscape.
    #[serde(rename = "1280x720")]
    Landscape720,
    /// 1024x1792 portrait.
    #[serde(rename = "1024x1792")]
    PortraitHigh,
    /// 1792x1024 landscape.
    #[serde(rename = "1792x1024")]
    LandscapeHigh,
}

impl VideoSize {
    /// Returns the wire name of the size.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Portrait720 => "720x1280",
            Self::Landscape720 => "1280x720",
            Self::PortraitHigh => "1024x1792",
            Self::LandscapeHigh => "1792x1024",
        }
    }

    /// Returns true for sizes above the 720p tier.
    pub const fn is_high_res(self) -> bool {
        matches!(self, Self::PortraitHigh | Self::LandscapeHigh)
    }
}

impl fmt::Display for VideoSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoSize {
    type Err = VideoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "720x1280" => Ok(Self::Portrait720),
            "1280x720" => Ok(Self::Landscape720),
            "1024x1792" => Ok(Self::PortraitHigh),
            "1792x1024" => Ok(Self::LandscapeHigh),
            other => Err(VideoError::InvalidInput(format!("unknown size '{}'", other))),
        }
    }
}

/// Remote job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// Accepted, waiting for capacity.
    Queued,
    /// Rendering.
    InProgress,
    /// Finished; content can be downloaded.
    Completed,
    /// Finished without content.
    Failed,
}

/// Error details attached to a failed remote job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoJobError {
    /// Provider error code.
    #[serde(default)]
    pub code: Option<String>,
    /// Human readable message.
    #[serde(default)]
    pub message: Option<String>,
}

/// A remote video job as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoJob {
    /// Remote video id.
    pub id: String,
    /// Current lifecycle state.
    pub status: VideoStatus,
    /// Completion percentage, when reported.
    #[serde(default)]
    pub progress: Option<u32>,
    /// Model the provider rendered with.
    #[serde(default)]
    pub model: Option<String>,
    /// Size the provider rendered at.
    #[serde(default)]
    pub size: Option<String>,
    /// Measured clip length in seconds. Providers send this as a string.
    #[serde(default, deserialize_with = "deserialize_seconds")]
    pub seconds: Option<u32>,
    /// Source video when this job is a remix.
    #[serde(default)]
    pub remixed_from_video_id: Option<String>,
    /// Failure details for `failed` jobs.
    #[serde(default)]
    pub error: Option<VideoJobError>,
}

impl VideoJob {
    /// Creates a job record with only an id and a status.
    pub fn new(id: impl Into<String>, status: VideoStatus) -> Self {
        Self {
            id: id.into(),
            status,
            progress: None,
            model: None,
            size: None,
            seconds: None,
            remixed_from_video_id: None,
            error: None,
        }
    }

    /// Best available description of why the job failed.
    pub fn failure_reason(&self) -> String {
        self.error
            .as_ref()
            .and_then(|e| e.message.clone().or_else(|| e.code.clone()))
            .unwrap_or_else(|| "remote job failed without details".to_string())
    }

    /// Parsed model, if the provider reported a known one.
    pub fn parsed_model(&self) -> Option<VideoModel> {
        self.model.as_deref().and_then(|m| m.parse().ok())
    }

    /// Parsed size, if the provider reported a known one.
    pub fn parsed_size(&self) -> Option<VideoSize> {
        self.size.as_deref().and_then(|s| s.parse().ok())
    }
}

/// Accepts `"8"`, `8` or null.
fn deserialize_seconds<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u32),
        Text(String),
    }

    match Option::<Seconds>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Seconds::Number(n)) => Ok(Some(n)),
        Some(Seconds::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid seconds '{}': {}", s, e))),
    }
}

/// Parameters for a fresh text-to-video or image-to-video job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVideoRequest {
    /// Text prompt.
    pub prompt: String,
    /// Model to render with.
    pub model: VideoModel,
    /// Output size.
    pub size: VideoSize,
    /// Clip length in seconds.
    pub seconds: u32,
    /// Optional first-frame image.
    pub input_reference: Option<PathBuf>,
}

/// A submission to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoRequest {
    /// Render a new video.
    Create(CreateVideoRequest),
    /// Re-render an existing video with a new prompt.
    Remix {
        /// Video to remix.
        video_id: String,
        /// Prompt describing the change.
        prompt: String,
    },
}

impl VideoRequest {
    /// The prompt carried by either request shape.
    pub fn prompt(&self) -> &str {
        match self {
            Self::Create(request) => &request.prompt,
            Self::Remix { prompt, .. } => prompt,
        }
    }
}

/// Final state returned by `poll_until_terminal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalStatus {
    /// The job finished and its content is available.
    Completed(VideoJob),
    /// The job finished without content.
    Failed {
        /// Remote video id.
        video_id: String,
        /// Failure reason reported by the provider.
        reason: String,
    },
}

/// Attempt-bounded polling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Wait between two non-terminal retrieves.
    pub interval: Duration,
    /// Maximum number of retrieves.
    pub max_attempts: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self { interval: Duration::from_secs(10), max_attempts: 120 }
    }
}

/// Observer invoked with the job status seen on each poll attempt.
pub type ProgressObserver = dyn Fn(&VideoJob) + Send + Sync;

/// A trait for talking to a remote video generation service.
///
/// All implementations must be `Send + Sync` so one client can serve every
/// job of a batch concurrently.
#[async_trait]
pub trait VideoApi: Send + Sync {
    /// Submits a new job and returns the provider's initial record for it.
    ///
    /// # Errors
    /// Returns a `VideoError` if the provider rejects the request or cannot be reached.
    async fn submit(&self, request: &VideoRequest) -> Result<VideoJob, VideoError>;

    /// Retrieves the current state of a job.
    ///
    /// # Errors
    /// Returns a `VideoError` if the provider cannot be reached or the job is unknown.
    async fn retrieve(&self, video_id: &str) -> Result<VideoJob, VideoError>;

    /// Downloads the rendered content of a completed job to `destination`,
    /// returning the number of bytes written.
    ///
    /// # Errors
    /// Returns a `VideoError` if the content cannot be fetched or written.
    async fn download(&self, video_id: &str, destination: &Path) -> Result<u64, VideoError>;

    /// Polls `retrieve` until the job reaches a terminal state.
    ///
    /// Makes at most `options.max_attempts` retrieves, sleeping
    /// `options.interval` after every non-terminal one. The observer is called
    /// once per attempt with that attempt's job record.
    ///
    /// # Errors
    /// Returns `VideoError::Timeout` when the attempts run out, or whatever
    /// error `retrieve` produced.
    async fn poll_until_terminal(
        &self,
        video_id: &str,
        options: PollOptions,
        on_progress: Option<&ProgressObserver>,
    ) -> Result<TerminalStatus, VideoError> {
        for attempt in 1..=options.max_attempts {
            let job = self.retrieve(video_id).await?;
            if let Some(observer) = on_progress {
                observer(&job);
            }

            match job.status {
                VideoStatus::Completed => return Ok(TerminalStatus::Completed(job)),
                VideoStatus::Failed => {
                    let reason = job.failure_reason();
                    return Ok(TerminalStatus::Failed { video_id: job.id, reason });
                }
                VideoStatus::Queued | VideoStatus::InProgress => {
                    debug!(
                        video_id = %video_id,
                        attempt = attempt,
                        progress = ?job.progress,
                        "Video not ready, waiting"
                    );
                    if attempt < options.max_attempts {
                        tokio::time::sleep(options.interval).await;
                    }
                }
            }
        }

        debug!(video_id = %video_id, attempts = options.max_attempts, "Polling attempts exhausted");
        Err(VideoError::Timeout(format!("video not finished after {} attempts", options.max_attempts)))
    }

    /// Short provider name used in logs.
    fn provider(&self) -> &str;
}
