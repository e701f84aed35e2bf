//! Batch coordination.
//!
//! Every job is spawned up front and parks on the concurrency limiter, so
//! only `max_concurrent` of them talk to the remote service at once. The
//! coordinator races the joined tasks against the batch deadline. When the
//! deadline wins it raises a flag that makes not-yet-started jobs cancel
//! themselves, gives in-flight jobs a grace period to land, and then records
//! everything still missing as cancelled.

use crate::cost::estimate_cost;
use crate::error::Result;
use crate::executor::{JobExecutor, PreparedJob};
use crate::limiter::ConcurrencyLimiter;
use crate::paths::resolve_output_paths;
use crate::pricing::clip_cost;
use crate::retry::{RetryPolicy, retry_with_policy};
use crate::types::{BatchReport, BatchSpec, JobOutcome, OutcomeStatus, round_cost};
use crate::validate::validate_batch;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use vidbatch_abstraction::{PollOptions, VideoApi};

/// Extra time in-flight jobs get after the deadline fires.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Reason recorded for jobs the deadline prevented from finishing.
pub const CANCELLED_REASON: &str = "batch timed out or cancelled";

/// Runs batches against a video API.
#[derive(Clone)]
pub struct BatchCoordinator {
    api: Arc<dyn VideoApi>,
    grace_period: Duration,
}

impl BatchCoordinator {
    pub fn new(api: Arc<dyn VideoApi>) -> Self {
        Self { api, grace_period: DEFAULT_GRACE_PERIOD }
    }

    #[must_use]
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Runs every job of `spec` and reports one outcome per job.
    ///
    /// Job failures and the batch deadline never make this fail; they show
    /// up as `failed` and `cancelled` outcomes.
    ///
    /// # Errors
    /// Returns `BatchError::Validation` before anything is submitted when the
    /// batch or an output path is invalid.
    pub async fn run(&self, spec: &BatchSpec) -> Result<BatchReport> {
        validate_batch(spec)?;
        let output_paths = resolve_output_paths(spec)?;

        let started_at = Utc::now();
        let start = Instant::now();
        let deadline = start + spec.timeout;

        info!(
            jobs = spec.jobs.len(),
            max_concurrent = spec.max_concurrent,
            timeout_ms = spec.timeout.as_millis() as u64,
            provider = self.api.provider(),
            nominal_cost = estimate_cost(spec).nominal_cost,
            "Starting batch"
        );

        let limiter = ConcurrencyLimiter::new(spec.max_concurrent);
        let timed_out = Arc::new(AtomicBool::new(false));
        let policy = Arc::new(spec.retry_policy.clone());
        let executor = JobExecutor::new(
            Arc::clone(&self.api),
            PollOptions { interval: spec.poll_interval, max_attempts: spec.max_poll_attempts },
        );

        let mut tasks = JoinSet::new();
        for (i, (job, output_path)) in spec.jobs.iter().zip(output_paths).enumerate() {
            let prepared = PreparedJob::new(i + 1, job.clone(), &spec.defaults, output_path);
            tasks.spawn(run_job(
                prepared,
                executor.clone(),
                limiter.clone(),
                Arc::clone(&policy),
                Arc::clone(&timed_out),
            ));
        }

        let mut outcomes = BTreeMap::new();
        let mut deadline_fired = false;
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(joined)) => record(&mut outcomes, joined),
                Ok(None) => break,
                Err(_) => {
                    deadline_fired = true;
                    break;
                }
            }
        }

        if deadline_fired {
            timed_out.store(true, Ordering::SeqCst);
            warn!(
                pending = tasks.len(),
                grace_ms = self.grace_period.as_millis() as u64,
                "Batch deadline reached, waiting for in-flight jobs"
            );

            let grace_deadline = Instant::now() + self.grace_period;
            while let Ok(Some(joined)) = tokio::time::timeout_at(grace_deadline, tasks.join_next()).await {
                record(&mut outcomes, joined);
            }

            if !tasks.is_empty() {
                warn!(abandoned = tasks.len(), "Grace period over, abandoning unfinished jobs");
                tasks.abort_all();
            }
        }

        for (i, job) in spec.jobs.iter().enumerate() {
            outcomes.entry(i + 1).or_insert_with(|| {
                debug!(index = i + 1, "No outcome recorded, marking cancelled");
                JobOutcome::cancelled(i + 1, job, CANCELLED_REASON)
            });
        }

        let report =
            BatchReport::from_outcomes(outcomes.into_values().collect(), started_at, Utc::now(), start.elapsed());
        info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            cancelled = report.cancelled,
            elapsed_ms = report.total_elapsed_ms,
            cost = report.total_estimated_cost,
            "Batch finished"
        );
        Ok(report)
    }
}

/// Keeps the first outcome seen for an index.
fn record(outcomes: &mut BTreeMap<usize, JobOutcome>, joined: std::result::Result<JobOutcome, JoinError>) {
    match joined {
        Ok(outcome) => {
            outcomes.entry(outcome.index).or_insert(outcome);
        }
        Err(e) => error!(error = %e, "Job task ended abnormally"),
    }
}

async fn run_job(
    job: PreparedJob,
    executor: JobExecutor,
    limiter: ConcurrencyLimiter,
    policy: Arc<RetryPolicy>,
    timed_out: Arc<AtomicBool>,
) -> JobOutcome {
    let _permit = match limiter.acquire().await {
        Ok(permit) => permit,
        Err(e) => {
            error!(index = job.index, error = %e, "Admission failed");
            return JobOutcome::cancelled(job.index, &job.spec, CANCELLED_REASON);
        }
    };

    if timed_out.load(Ordering::SeqCst) {
        debug!(index = job.index, "Admitted after the deadline, skipping");
        return JobOutcome::cancelled(job.index, &job.spec, CANCELLED_REASON);
    }

    let started_at = Utc::now();
    info!(index = job.index, kind = %job.kind, "Job admitted");

    let job_ref = &job;
    let executor_ref = &executor;
    let attempted = retry_with_policy(&policy, move |attempt| {
        if attempt > 0 {
            info!(index = job_ref.index, attempt = attempt + 1, "Retrying job");
        }
        executor_ref.execute(job_ref)
    })
    .await;

    let elapsed_ms = attempted.elapsed.as_millis() as u64;
    let status = match attempted.result {
        Ok(artifact) => {
            info!(
                index = job.index,
                video_id = %artifact.video_id,
                attempts = attempted.attempts,
                elapsed_ms,
                bytes = ?artifact.bytes_written,
                "Job completed"
            );
            OutcomeStatus::Completed {
                cost: round_cost(clip_cost(artifact.model, artifact.size, artifact.seconds)),
                video_id: artifact.video_id,
                output_path: artifact.output_path,
                model: artifact.model,
                size: artifact.size,
                seconds: artifact.seconds,
                elapsed_ms,
                attempts: attempted.attempts,
            }
        }
        Err(e) => {
            warn!(index = job.index, attempts = attempted.attempts, error = %e, "Job failed");
            OutcomeStatus::Failed { error: e.to_string(), elapsed_ms, attempts: attempted.attempts }
        }
    };

    JobOutcome::new(job.index, &job.spec, status).with_timing(started_at, Utc::now())
}
