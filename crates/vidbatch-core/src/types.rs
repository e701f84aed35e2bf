//! Data types for batch execution.

use crate::config::{
    DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS,
};
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use vidbatch_abstraction::{VideoModel, VideoSize};

/// One requested video.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    /// Text prompt. Must not be empty.
    pub prompt: String,
    /// Desired save location, relative to the output directory.
    pub output_path: Option<PathBuf>,
    /// Model override.
    pub model: Option<VideoModel>,
    /// Size override.
    pub size: Option<VideoSize>,
    /// Duration override in seconds.
    pub seconds: Option<u32>,
    /// First-frame image. Excludes `remix_video_id`.
    pub input_reference: Option<PathBuf>,
    /// Remix a previously generated video instead of rendering from scratch.
    pub remix_video_id: Option<String>,
}

impl JobSpec {
    /// Creates a text-to-video job with batch defaults for everything else.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), ..Self::default() }
    }

    #[must_use]
    pub fn with_model(mut self, model: VideoModel) -> Self {
        self.model = Some(model);
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: VideoSize) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn with_seconds(mut self, seconds: u32) -> Self {
        self.seconds = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_input_reference(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_reference = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_remix(mut self, video_id: impl Into<String>) -> Self {
        self.remix_video_id = Some(video_id.into());
        self
    }

    /// Classifies the job. A remix wins over an image reference.
    pub fn kind(&self) -> JobKind {
        if self.remix_video_id.is_some() {
            JobKind::Remix
        } else if self.input_reference.is_some() {
            JobKind::ImageToVideo
        } else {
            JobKind::TextToVideo
        }
    }

    /// Resolves model, size and duration: job override, then batch default.
    pub fn effective(&self, defaults: &BatchDefaults) -> EffectiveParams {
        EffectiveParams {
            model: self.model.unwrap_or(defaults.model),
            size: self.size.unwrap_or(defaults.size),
            seconds: self.seconds.unwrap_or(defaults.seconds),
        }
    }
}

/// The three ways a job can produce a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    TextToVideo,
    ImageToVideo,
    Remix,
}

impl JobKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TextToVideo => "text_to_video",
            Self::ImageToVideo => "image_to_video",
            Self::Remix => "remix",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model, size and duration after defaults are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveParams {
    pub model: VideoModel,
    pub size: VideoSize,
    pub seconds: u32,
}

/// Batch-wide defaults for jobs that leave a parameter unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDefaults {
    /// Default model.
    pub model: VideoModel,
    /// Default size.
    pub size: VideoSize,
    /// Default duration in seconds.
    pub seconds: u32,
    /// Directory downloads are written to. Without it, jobs lacking an
    /// `output_path` are not downloaded.
    pub output_dir: Option<PathBuf>,
}

impl Default for BatchDefaults {
    fn default() -> Self {
        Self { model: VideoModel::Sora2, size: VideoSize::Portrait720, seconds: 4, output_dir: None }
    }
}

/// A validated, ready-to-run batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSpec {
    /// Jobs in submission order. Position `i` becomes job index `i + 1`.
    pub jobs: Vec<JobSpec>,
    /// Defaults applied to every job.
    pub defaults: BatchDefaults,
    /// Maximum number of jobs executing at once.
    pub max_concurrent: usize,
    /// Wall-clock deadline for the whole batch, measured from its start.
    pub timeout: Duration,
    /// Wait between two status checks of one remote job.
    pub poll_interval: Duration,
    /// Status checks allowed per remote job before it counts as timed out.
    pub max_poll_attempts: u32,
    /// Per-job retry behaviour.
    pub retry_policy: RetryPolicy,
    /// Permit output paths outside the output directory.
    pub allow_path_escape: bool,
}

impl BatchSpec {
    /// Creates a batch with built-in defaults for every setting.
    pub fn new(jobs: Vec<JobSpec>) -> Self {
        Self {
            jobs,
            defaults: BatchDefaults::default(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            retry_policy: RetryPolicy::default(),
            allow_path_escape: false,
        }
    }
}

/// Terminal result of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    /// 1-based position of the job in the batch.
    pub index: usize,
    /// The job's prompt, verbatim.
    pub prompt: String,
    pub kind: JobKind,
    pub is_remix: bool,
    pub is_image_to_video: bool,
    /// When the job was admitted. Absent for jobs that never ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed {
        /// Remote video id.
        video_id: String,
        /// Where the video was saved. Absent when no download was requested.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output_path: Option<PathBuf>,
        model: VideoModel,
        size: VideoSize,
        /// Measured clip length.
        seconds: u32,
        /// From the first attempt's start to completion.
        elapsed_ms: u64,
        attempts: u32,
        /// Priced from the measured duration.
        cost: f64,
    },
    Failed {
        /// Raw error message of the last attempt.
        error: String,
        elapsed_ms: u64,
        attempts: u32,
    },
    Cancelled {
        reason: String,
    },
}

impl JobOutcome {
    /// Creates an outcome for the job at `index` (1-based).
    pub fn new(index: usize, spec: &JobSpec, status: OutcomeStatus) -> Self {
        let kind = spec.kind();
        Self {
            index,
            prompt: spec.prompt.clone(),
            kind,
            is_remix: kind == JobKind::Remix,
            is_image_to_video: kind == JobKind::ImageToVideo,
            started_at: None,
            finished_at: None,
            status,
        }
    }

    /// Creates a cancellation outcome for a job that never produced a result.
    pub fn cancelled(index: usize, spec: &JobSpec, reason: impl Into<String>) -> Self {
        Self::new(index, spec, OutcomeStatus::Cancelled { reason: reason.into() })
    }

    #[must_use]
    pub fn with_timing(mut self, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self.finished_at = Some(finished_at);
        self
    }

    pub const fn is_completed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Completed { .. })
    }

    pub const fn is_failed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed { .. })
    }

    pub const fn is_cancelled(&self) -> bool {
        matches!(self.status, OutcomeStatus::Cancelled { .. })
    }

    /// Cost of a completed job, zero otherwise.
    pub fn cost(&self) -> f64 {
        match self.status {
            OutcomeStatus::Completed { cost, .. } => cost,
            _ => 0.0,
        }
    }
}

/// Aggregate result of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// One outcome per job, ordered by index.
    pub results: Vec<JobOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_elapsed_ms: u64,
    /// Sum of completed jobs' costs, priced from their measured durations.
    pub total_estimated_cost: f64,
}

impl BatchReport {
    /// Builds the report, sorting outcomes by index and totalling counts and cost.
    pub fn from_outcomes(
        mut results: Vec<JobOutcome>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        results.sort_by_key(|outcome| outcome.index);

        let succeeded = results.iter().filter(|o| o.is_completed()).count();
        let failed = results.iter().filter(|o| o.is_failed()).count();
        let cancelled = results.iter().filter(|o| o.is_cancelled()).count();
        let total_cost: f64 = results.iter().map(JobOutcome::cost).sum();

        Self {
            total: results.len(),
            succeeded,
            failed,
            cancelled,
            results,
            started_at,
            finished_at,
            total_elapsed_ms: elapsed.as_millis() as u64,
            total_estimated_cost: round_cost(total_cost),
        }
    }

    /// True when every job completed.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }
}

/// Rounds a dollar amount to four decimal places.
pub(crate) fn round_cost(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
