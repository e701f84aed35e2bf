//! Integration tests for the batch engine.
//!
//! Tests index coverage, the concurrency cap, retry behaviour, the batch
//! deadline, sequential execution, failure containment, validation, cost
//! accounting and downloads.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vidbatch_abstraction::{VideoApi, VideoError, VideoJob, VideoJobError, VideoRequest, VideoStatus};
use vidbatch_core::{
    BatchCoordinator, BatchError, BatchSpec, CANCELLED_REASON, JobKind, JobSpec, OutcomeStatus, RetryPolicy,
};

/// Prompts containing this make the remote job end in `failed`.
const REMOTE_FAIL: &str = "[remote-fail]";

/// Instrumented video API stub.
///
/// A job counts as active from `submit` until its download, remote failure or
/// submission error, so `peak` covers the whole executor invocation when the
/// batch has an output directory.
#[derive(Default)]
struct StubApi {
    latency: Duration,
    measured_seconds: Option<u32>,
    submit_errors: Mutex<VecDeque<VideoError>>,
    video_ids: Mutex<VecDeque<String>>,
    jobs: Mutex<HashMap<String, VideoJob>>,
    submits: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl StubApi {
    fn new() -> Self {
        Self::default()
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn with_measured_seconds(mut self, seconds: u32) -> Self {
        self.measured_seconds = Some(seconds);
        self
    }

    fn with_submit_errors(self, errors: Vec<VideoError>) -> Self {
        *self.submit_errors.lock().unwrap() = errors.into();
        self
    }

    fn with_video_ids(self, ids: &[&str]) -> Self {
        *self.video_ids.lock().unwrap() = ids.iter().map(ToString::to_string).collect();
        self
    }

    fn finish_job(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl VideoApi for StubApi {
    async fn submit(&self, request: &VideoRequest) -> Result<VideoJob, VideoError> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(error) = self.submit_errors.lock().unwrap().pop_front() {
            self.finish_job();
            return Err(error);
        }

        let id = self.video_ids.lock().unwrap().pop_front().unwrap_or_else(|| format!("stub_{}", n));
        let mut job = VideoJob::new(id, VideoStatus::Queued);
        if let VideoRequest::Create(create) = request {
            job.model = Some(create.model.to_string());
            job.size = Some(create.size.to_string());
            job.seconds = Some(create.seconds);
        }
        if let Some(seconds) = self.measured_seconds {
            job.seconds = Some(seconds);
        }
        if request.prompt().contains(REMOTE_FAIL) {
            job.error = Some(VideoJobError { code: None, message: Some("content policy".to_string()) });
        }

        self.jobs.lock().unwrap().insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn retrieve(&self, video_id: &str) -> Result<VideoJob, VideoError> {
        let mut job = self
            .jobs
            .lock()
            .unwrap()
            .get(video_id)
            .cloned()
            .ok_or_else(|| VideoError::NotFound(video_id.to_string()))?;
        job.status = if job.error.is_some() {
            self.finish_job();
            VideoStatus::Failed
        } else {
            VideoStatus::Completed
        };
        Ok(job)
    }

    async fn download(&self, video_id: &str, destination: &Path) -> Result<u64, VideoError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let written = std::fs::write(destination, video_id.as_bytes()).map_err(|e| VideoError::Io(e.to_string()));
        self.finish_job();
        written?;
        Ok(video_id.len() as u64)
    }

    fn provider(&self) -> &str {
        "stub"
    }
}

fn prompts(n: usize) -> Vec<JobSpec> {
    (1..=n).map(|i| JobSpec::new(format!("scene {}", i))).collect()
}

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy { max_retries, retry_delay_ms: 1_000, ..RetryPolicy::default() }
}

#[tokio::test(start_paused = true)]
async fn test_every_job_gets_exactly_one_outcome() {
    let api = Arc::new(StubApi::new().with_latency(Duration::from_millis(50)));
    let mut spec = BatchSpec::new(prompts(7));
    spec.max_concurrent = 3;

    let report = BatchCoordinator::new(api.clone()).run(&spec).await.unwrap();

    let indices: Vec<usize> = report.results.iter().map(|o| o.index).collect();
    assert_eq!(indices, (1..=7).collect::<Vec<_>>());
    assert_eq!(report.total, 7);
    assert_eq!(report.succeeded + report.failed + report.cancelled, report.total);
    assert_eq!(report.succeeded, 7);
    assert!(report.is_success());
    assert_eq!(report.results[4].prompt, "scene 5");
    assert_eq!(api.submits(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_never_exceeds_cap() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(StubApi::new().with_latency(Duration::from_secs(1)));
    let mut spec = BatchSpec::new(prompts(10));
    spec.max_concurrent = 2;
    spec.defaults.output_dir = Some(dir.path().to_path_buf());

    let report = BatchCoordinator::new(api.clone()).run(&spec).await.unwrap();

    assert_eq!(report.succeeded, 10);
    // Counted from submission through download.
    assert_eq!(api.peak(), 2);
    assert_eq!(api.active.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_job_is_retried_until_success() {
    let api = Arc::new(StubApi::new().with_submit_errors(vec![
        VideoError::RateLimited("slow down".to_string()),
        VideoError::RateLimited("slow down".to_string()),
    ]));
    let mut spec = BatchSpec::new(prompts(1));
    spec.retry_policy = fast_retry(2);

    let report = BatchCoordinator::new(api.clone()).run(&spec).await.unwrap();

    let OutcomeStatus::Completed { attempts, elapsed_ms, .. } = &report.results[0].status else {
        panic!("expected completion, got {:?}", report.results[0].status);
    };
    assert_eq!(*attempts, 3);
    assert!(*elapsed_ms >= 2_000, "elapsed {}ms", elapsed_ms);
    assert_eq!(api.submits(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_non_matching_error_is_not_retried() {
    let api = Arc::new(StubApi::new().with_submit_errors(vec![VideoError::Auth("bad key".to_string())]));
    let mut spec = BatchSpec::new(prompts(1));
    spec.retry_policy = fast_retry(5);

    let report = BatchCoordinator::new(api.clone()).run(&spec).await.unwrap();

    let OutcomeStatus::Failed { error, attempts, .. } = &report.results[0].status else {
        panic!("expected failure, got {:?}", report.results[0].status);
    };
    assert_eq!(error, "Authentication failed: bad key");
    assert_eq!(*attempts, 1);
    assert_eq!(api.submits(), 1);
    assert!(!report.is_success());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_cancels_unfinished_jobs() {
    let api = Arc::new(StubApi::new().with_latency(Duration::from_secs(10)));
    let mut spec = BatchSpec::new(prompts(3));
    spec.timeout = Duration::from_millis(100);
    spec.max_concurrent = 1;

    let report = BatchCoordinator::new(api.clone()).run(&spec).await.unwrap();

    assert_eq!(report.cancelled, 3);
    assert_eq!(report.total, 3);
    for outcome in &report.results {
        assert_eq!(outcome.status, OutcomeStatus::Cancelled { reason: CANCELLED_REASON.to_string() });
    }
    // Only the first job was admitted before the deadline.
    assert_eq!(api.submits(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_job_landing_within_grace_period_counts() {
    let api = Arc::new(StubApi::new().with_latency(Duration::from_secs(2)));
    let mut spec = BatchSpec::new(prompts(2));
    spec.timeout = Duration::from_millis(100);
    spec.max_concurrent = 1;

    let report = BatchCoordinator::new(api.clone()).run(&spec).await.unwrap();

    assert!(report.results[0].is_completed());
    // The second job was admitted after the deadline and never submitted.
    assert!(report.results[1].is_cancelled());
    assert_eq!(api.submits(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_grace_period_cancels_in_flight_jobs() {
    let api = Arc::new(StubApi::new().with_latency(Duration::from_secs(2)));
    let mut spec = BatchSpec::new(prompts(1));
    spec.timeout = Duration::from_millis(100);

    let report = BatchCoordinator::new(api).with_grace_period(Duration::ZERO).run(&spec).await.unwrap();

    assert!(report.results[0].is_cancelled());
}

#[tokio::test]
async fn test_single_slot_runs_jobs_sequentially() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(StubApi::new().with_latency(Duration::from_millis(20)));
    let mut spec = BatchSpec::new(vec![JobSpec::new("original"), JobSpec::new("make it snow").with_remix("video_0")]);
    spec.max_concurrent = 1;
    spec.defaults.output_dir = Some(dir.path().to_path_buf());

    let report = BatchCoordinator::new(api.clone()).run(&spec).await.unwrap();
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.results[1].kind, JobKind::Remix);
    assert!(report.results[1].is_remix);

    let mut timed: Vec<_> = report
        .results
        .iter()
        .map(|o| (o.started_at.unwrap(), o.finished_at.unwrap()))
        .collect();
    timed.sort();
    assert!(timed[1].0 >= timed[0].1, "second job started before the first finished");
    assert_eq!(api.peak(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_remote_failure_is_contained_to_its_job() {
    let api = Arc::new(StubApi::new());
    let spec = BatchSpec::new(vec![
        JobSpec::new("first"),
        JobSpec::new(format!("second {}", REMOTE_FAIL)),
        JobSpec::new("third"),
    ]);

    let report = BatchCoordinator::new(api).run(&spec).await.unwrap();

    assert_eq!((report.succeeded, report.failed, report.cancelled), (2, 1, 0));
    let OutcomeStatus::Failed { error, .. } = &report.results[1].status else {
        panic!("expected failure, got {:?}", report.results[1].status);
    };
    assert_eq!(error, "Video generation failed: content policy");
}

#[tokio::test(start_paused = true)]
async fn test_remote_video_id_does_not_affect_retry_decision() {
    let mut attempts_by_id = Vec::new();

    for id in ["video_68d7abcdef", "video_68d7a500ef"] {
        let api = Arc::new(StubApi::new().with_video_ids(&[id]));
        let mut spec = BatchSpec::new(vec![JobSpec::new(format!("harbor {}", REMOTE_FAIL))]);
        spec.retry_policy = fast_retry(2);

        let report = BatchCoordinator::new(api.clone()).run(&spec).await.unwrap();

        let OutcomeStatus::Failed { error, attempts, .. } = &report.results[0].status else {
            panic!("expected failure, got {:?}", report.results[0].status);
        };
        assert!(!error.contains(id), "{}", error);
        attempts_by_id.push((*attempts, api.submits()));
    }

    // A permanent failure is tried once regardless of the id it was given.
    assert_eq!(attempts_by_id, vec![(1, 1), (1, 1)]);
}

#[tokio::test]
async fn test_invalid_batch_submits_nothing() {
    let api = Arc::new(StubApi::new());
    let spec = BatchSpec::new(vec![JobSpec::new("ok"), JobSpec::new("")]);

    let err = BatchCoordinator::new(api.clone()).run(&spec).await.unwrap_err();

    assert!(matches!(err, BatchError::Validation(_)));
    assert_eq!(err.problems(), ["jobs[2]: prompt must not be empty".to_string()]);
    assert_eq!(api.submits(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cost_uses_measured_duration_of_completed_jobs() {
    let api = Arc::new(StubApi::new().with_measured_seconds(8));
    let spec = BatchSpec::new(vec![JobSpec::new("a"), JobSpec::new(format!("b {}", REMOTE_FAIL))]);

    let report = BatchCoordinator::new(api).run(&spec).await.unwrap();

    // One completed sora-2 clip measured at 8s; the failed job adds nothing.
    assert!((report.total_estimated_cost - 0.8).abs() < 1e-9);
    assert!((report.results[0].cost() - 0.8).abs() < 1e-9);
    assert!(report.results[1].cost().abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_downloads_get_distinct_paths() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(StubApi::new());
    let mut spec = BatchSpec::new(vec![
        JobSpec::new("a").with_output_path("clip"),
        JobSpec::new("b").with_output_path("clip.mp4"),
        JobSpec::new("Generated Name"),
    ]);
    spec.defaults.output_dir = Some(dir.path().to_path_buf());

    let report = BatchCoordinator::new(api).run(&spec).await.unwrap();
    assert_eq!(report.succeeded, 3);

    let saved: Vec<_> = report
        .results
        .iter()
        .map(|o| match &o.status {
            OutcomeStatus::Completed { output_path, .. } => output_path.clone().unwrap(),
            other => panic!("expected completion, got {:?}", other),
        })
        .collect();

    assert_eq!(saved[0], dir.path().join("clip.mp4"));
    assert_eq!(saved[1], dir.path().join("clip-1.mp4"));
    assert_eq!(saved[2], dir.path().join("003-generated-name.mp4"));
    assert!(saved.iter().all(|p| p.exists()));
}
