//! Single-job execution: submit, poll to a terminal state, download.
//!
//! Owns no concurrency or retry logic. A remote `failed` state comes back as
//! `VideoError::GenerationFailed` so the retry layer can classify it like any
//! other error.

use crate::types::{BatchDefaults, EffectiveParams, JobKind, JobSpec};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vidbatch_abstraction::{
    CreateVideoRequest, PollOptions, TerminalStatus, VideoApi, VideoError, VideoJob, VideoModel,
    VideoRequest, VideoSize,
};

/// A job with its index, parameters and destination settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedJob {
    /// 1-based position in the batch.
    pub index: usize,
    pub spec: JobSpec,
    pub params: EffectiveParams,
    pub kind: JobKind,
    /// Download destination. `None` skips the download.
    pub output_path: Option<PathBuf>,
}

impl PreparedJob {
    pub fn new(index: usize, spec: JobSpec, defaults: &BatchDefaults, output_path: Option<PathBuf>) -> Self {
        let params = spec.effective(defaults);
        let kind = spec.kind();
        Self { index, spec, params, kind, output_path }
    }

    /// The request this job sends to the remote service.
    pub fn request(&self) -> VideoRequest {
        match &self.spec.remix_video_id {
            Some(video_id) => {
                VideoRequest::Remix { video_id: video_id.clone(), prompt: self.spec.prompt.clone() }
            }
            None => VideoRequest::Create(CreateVideoRequest {
                prompt: self.spec.prompt.clone(),
                model: self.params.model,
                size: self.params.size,
                seconds: self.params.seconds,
                input_reference: self.spec.input_reference.clone(),
            }),
        }
    }
}

/// What a successful job produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobArtifact {
    pub video_id: String,
    /// Where the content was saved, if it was downloaded.
    pub output_path: Option<PathBuf>,
    /// Parameters as reported by the remote job, falling back to the request.
    pub model: VideoModel,
    pub size: VideoSize,
    pub seconds: u32,
    /// Size of the downloaded file, if any.
    pub bytes_written: Option<u64>,
}

/// Runs one job against a `VideoApi`.
#[derive(Clone)]
pub struct JobExecutor {
    api: Arc<dyn VideoApi>,
    poll: PollOptions,
}

impl JobExecutor {
    pub fn new(api: Arc<dyn VideoApi>, poll: PollOptions) -> Self {
        Self { api, poll }
    }

    /// Executes one attempt of `job`.
    ///
    /// # Errors
    /// Returns the first `VideoError` from submission, polling or download,
    /// or `VideoError::GenerationFailed` when the remote job fails.
    pub async fn execute(&self, job: &PreparedJob) -> Result<JobArtifact, VideoError> {
        let submitted = self.api.submit(&job.request()).await?;
        info!(
            index = job.index,
            video_id = %submitted.id,
            kind = %job.kind,
            provider = self.api.provider(),
            "Job submitted"
        );

        let index = job.index;
        let observer = move |status: &VideoJob| {
            debug!(index, video_id = %status.id, status = ?status.status, progress = ?status.progress, "Poll");
        };

        let remote = match self.api.poll_until_terminal(&submitted.id, self.poll, Some(&observer)).await? {
            TerminalStatus::Completed(remote) => remote,
            TerminalStatus::Failed { video_id, reason } => {
                info!(index, video_id = %video_id, reason = %reason, "Remote job failed");
                return Err(VideoError::GenerationFailed { video_id, reason });
            }
        };

        let bytes_written = match &job.output_path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        warn!(index, path = %parent.display(), error = %e, "Failed to create output directory");
                        VideoError::Io(format!("Failed to create output directory: {}", e))
                    })?;
                }
                let bytes = self.api.download(&remote.id, path).await?;
                debug!(index, video_id = %remote.id, path = %path.display(), bytes, "Downloaded video");
                Some(bytes)
            }
            None => None,
        };

        Ok(JobArtifact {
            model: remote.parsed_model().unwrap_or(job.params.model),
            size: remote.parsed_size().unwrap_or(job.params.size),
            seconds: remote.seconds.unwrap_or(job.params.seconds),
            video_id: remote.id,
            output_path: job.output_path.clone(),
            bytes_written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use vidbatch_abstraction::VideoStatus;

    /// Completes immediately, reporting a fixed measured duration.
    #[derive(Default)]
    struct RecordingApi {
        requests: Mutex<Vec<VideoRequest>>,
        fail_reason: Option<String>,
    }

    #[async_trait]
    impl VideoApi for RecordingApi {
        async fn submit(&self, request: &VideoRequest) -> Result<VideoJob, VideoError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(VideoJob::new("video_1", VideoStatus::Queued))
        }

        async fn retrieve(&self, video_id: &str) -> Result<VideoJob, VideoError> {
            let mut job = VideoJob::new(video_id, VideoStatus::Completed);
            if let Some(reason) = &self.fail_reason {
                job.status = VideoStatus::Failed;
                job.error = Some(vidbatch_abstraction::VideoJobError { code: None, message: Some(reason.clone()) });
            }
            job.seconds = Some(12);
            Ok(job)
        }

        async fn download(&self, _video_id: &str, destination: &Path) -> Result<u64, VideoError> {
            std::fs::write(destination, b"mp4").map_err(|e| VideoError::Io(e.to_string()))?;
            Ok(3)
        }

        fn provider(&self) -> &str {
            "recording"
        }
    }

    fn prepared(spec: JobSpec, output_path: Option<PathBuf>) -> PreparedJob {
        PreparedJob::new(1, spec, &BatchDefaults::default(), output_path)
    }

    #[test]
    fn test_request_shape_follows_job_kind() {
        let text = prepared(JobSpec::new("a").with_seconds(8), None).request();
        let VideoRequest::Create(create) = text else { panic!("expected create") };
        assert_eq!(create.seconds, 8);
        assert_eq!(create.size, VideoSize::Portrait720);
        assert!(create.input_reference.is_none());

        let remix = prepared(JobSpec::new("b").with_remix("video_9"), None).request();
        assert_eq!(remix, VideoRequest::Remix { video_id: "video_9".to_string(), prompt: "b".to_string() });
    }

    #[tokio::test]
    async fn test_execute_downloads_and_reports_measured_seconds() {
        let api = Arc::new(RecordingApi::default());
        let executor = JobExecutor::new(api.clone(), PollOptions::default());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.mp4");

        let artifact = executor.execute(&prepared(JobSpec::new("a"), Some(path.clone()))).await.unwrap();

        assert_eq!(artifact.video_id, "video_1");
        assert_eq!(artifact.seconds, 12);
        assert_eq!(artifact.model, VideoModel::Sora2);
        assert_eq!(artifact.bytes_written, Some(3));
        assert!(path.exists());
        assert_eq!(api.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remote_failure_is_a_typed_error() {
        let api = Arc::new(RecordingApi { fail_reason: Some("moderation blocked".to_string()), ..Default::default() });
        let executor = JobExecutor::new(api, PollOptions::default());

        let err = executor.execute(&prepared(JobSpec::new("a"), None)).await.unwrap_err();
        assert_eq!(
            err,
            VideoError::GenerationFailed { video_id: "video_1".to_string(), reason: "moderation blocked".to_string() }
        );
    }
}
