//! Video API implementations for vidbatch.
//!
//! This crate provides concrete implementations of the `VideoApi` trait.
//!
//! # Supported Providers
//!
//! - **Mock**: Offline runs and testing
//! - **OpenAI**: The `/v1/videos` API (API key required)

pub mod factory;
pub mod openai;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;
use vidbatch_abstraction::{VideoApi, VideoError, VideoJob, VideoJobError, VideoRequest, VideoStatus};

pub use factory::{ProviderConfig, ProviderType, VideoApiFactory};
pub use openai::OpenAIVideoClient;

/// Prompts containing this marker make the mock report a failed generation.
pub const MOCK_FAIL_MARKER: &str = "[mock-fail]";

/// A mock implementation of the `VideoApi` trait for offline runs and testing.
///
/// Every job completes on its first retrieve. Downloads write a small
/// placeholder file instead of real video content.
#[derive(Debug, Default)]
pub struct MockVideoApi {
    next_id: AtomicU64,
    jobs: Mutex<HashMap<String, VideoJob>>,
}

impl MockVideoApi {
    /// Creates a new `MockVideoApi` that answers immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VideoApi for MockVideoApi {
    async fn submit(&self, request: &VideoRequest) -> Result<VideoJob, VideoError> {
        let id = format!("video_mock_{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        debug!(video_id = %id, prompt = %request.prompt(), "MockVideoApi accepted job");

        let mut job = VideoJob::new(id.clone(), VideoStatus::Queued);
        match request {
            VideoRequest::Create(create) => {
                job.model = Some(create.model.to_string());
                job.size = Some(create.size.to_string());
                job.seconds = Some(create.seconds);
            }
            VideoRequest::Remix { video_id, .. } => {
                let jobs = self.jobs.lock().await;
                let source = jobs.get(video_id);
                job.model = source.and_then(|s| s.model.clone());
                job.size = source.and_then(|s| s.size.clone());
                job.seconds = source.and_then(|s| s.seconds);
                job.remixed_from_video_id = Some(video_id.clone());
            }
        }

        if request.prompt().contains(MOCK_FAIL_MARKER) {
            job.error = Some(VideoJobError {
                code: Some("mock_failure".to_string()),
                message: Some("mock generation failed".to_string()),
            });
        }

        self.jobs.lock().await.insert(id, job.clone());
        Ok(job)
    }

    async fn retrieve(&self, video_id: &str) -> Result<VideoJob, VideoError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(video_id)
            .ok_or_else(|| {
                debug!(video_id = %video_id, "MockVideoApi has no such job");
                VideoError::NotFound("retrieve video: unknown video".to_string())
            })?;

        if job.error.is_some() {
            job.status = VideoStatus::Failed;
        } else {
            job.status = VideoStatus::Completed;
            job.progress = Some(100);
        }
        Ok(job.clone())
    }

    async fn download(&self, video_id: &str, destination: &Path) -> Result<u64, VideoError> {
        if !self.jobs.lock().await.contains_key(video_id) {
            debug!(video_id = %video_id, "MockVideoApi has no such job");
            return Err(VideoError::NotFound("download video: unknown video".to_string()));
        }

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| VideoError::Io(format!("Failed to create download directory: {}", e)))?;
        }

        let content = format!("mock video content for {}\n", video_id);
        tokio::fs::write(destination, content.as_bytes()).await.map_err(|e| {
            VideoError::Io(format!("Failed to write download: {}", e))
        })?;
        Ok(content.len() as u64)
    }

    fn provider(&self) -> &str {
        "mock"
    }
}
