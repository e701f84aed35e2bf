//! Batch validation.
//!
//! Problems are collected rather than returned one at a time so a user fixing
//! a batch file sees everything wrong with it at once. Job problems are
//! prefixed with the 1-based job index.

use crate::config::{
    MAX_CONCURRENT_LIMIT, MAX_JOBS, MAX_POLL_ATTEMPTS_LIMIT, MAX_POLL_INTERVAL_MS, MAX_PROMPT_CHARS,
    MAX_RETRIES_LIMIT, MAX_RETRY_DELAY_MS, MAX_TIMEOUT_MS, MIN_POLL_INTERVAL_MS, MIN_RETRY_DELAY_MS,
    MIN_TIMEOUT_MS,
};
use crate::error::{BatchError, Result};
use crate::types::{BatchSpec, JobSpec};
use std::path::Path;

/// Image types accepted as a first-frame reference.
pub const INPUT_REFERENCE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Checks what the engine needs to run a batch at all: job count, job
/// contents and a non-zero concurrency cap.
///
/// Numeric tunables are not range-checked here; see [`validate_config`].
pub fn validate_batch(spec: &BatchSpec) -> Result<()> {
    let mut problems = job_problems(spec);
    if spec.max_concurrent == 0 {
        problems.push("max_concurrent must be at least 1".to_string());
    }
    into_result(problems)
}

/// Full check applied to user-supplied configuration: everything
/// [`validate_batch`] checks plus the documented bounds of every tunable.
pub fn validate_config(spec: &BatchSpec) -> Result<()> {
    let mut problems = job_problems(spec);
    problems.extend(limit_problems(spec));
    into_result(problems)
}

fn into_result(problems: Vec<String>) -> Result<()> {
    if problems.is_empty() { Ok(()) } else { Err(BatchError::Validation(problems)) }
}

fn job_problems(spec: &BatchSpec) -> Vec<String> {
    let mut problems = Vec::new();

    if spec.jobs.is_empty() || spec.jobs.len() > MAX_JOBS {
        problems.push(format!("jobs must contain between 1 and {} entries, got {}", MAX_JOBS, spec.jobs.len()));
    }

    for (i, job) in spec.jobs.iter().enumerate() {
        for problem in check_job(job, spec) {
            problems.push(format!("jobs[{}]: {}", i + 1, problem));
        }
    }

    problems
}

fn check_job(job: &JobSpec, spec: &BatchSpec) -> Vec<String> {
    let mut problems = Vec::new();

    if job.prompt.trim().is_empty() {
        problems.push("prompt must not be empty".to_string());
    } else if job.prompt.chars().count() > MAX_PROMPT_CHARS {
        problems.push(format!("prompt must be at most {} characters", MAX_PROMPT_CHARS));
    }

    if job.remix_video_id.is_some() {
        if job.remix_video_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            problems.push("remix_video_id must not be empty".to_string());
        }

        let forbidden: Vec<&str> = [
            ("model", job.model.is_some()),
            ("size", job.size.is_some()),
            ("seconds", job.seconds.is_some()),
            ("input_reference", job.input_reference.is_some()),
        ]
        .into_iter()
        .filter_map(|(field, set)| set.then_some(field))
        .collect();

        if !forbidden.is_empty() {
            problems.push(format!("remix jobs must not set {}", forbidden.join(", ")));
        }
        return problems;
    }

    let params = job.effective(&spec.defaults);
    if !params.model.allowed_seconds().contains(&params.seconds) {
        problems.push(format!(
            "seconds must be one of {:?} for {}, got {}",
            params.model.allowed_seconds(),
            params.model,
            params.seconds
        ));
    }
    if !params.model.supports_size(params.size) {
        problems.push(format!("size {} is not available for {}", params.size, params.model));
    }

    if let Some(reference) = &job.input_reference {
        problems.extend(check_input_reference(reference));
    }

    problems
}

fn check_input_reference(path: &Path) -> Option<String> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_lowercase);
    let supported = extension.as_deref().is_some_and(|e| INPUT_REFERENCE_EXTENSIONS.contains(&e));

    if !supported {
        Some(format!(
            "input_reference {} must be one of {}",
            path.display(),
            INPUT_REFERENCE_EXTENSIONS.join(", ")
        ))
    } else if !path.is_file() {
        Some(format!("input_reference {} does not exist", path.display()))
    } else {
        None
    }
}

fn limit_problems(spec: &BatchSpec) -> Vec<String> {
    let mut problems = Vec::new();

    if !(1..=MAX_CONCURRENT_LIMIT).contains(&spec.max_concurrent) {
        problems.push(format!(
            "max_concurrent must be between 1 and {}, got {}",
            MAX_CONCURRENT_LIMIT, spec.max_concurrent
        ));
    }

    let timeout_ms = spec.timeout.as_millis() as u64;
    if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&timeout_ms) {
        problems.push(format!(
            "timeout must be between {} and {} ms, got {}",
            MIN_TIMEOUT_MS, MAX_TIMEOUT_MS, timeout_ms
        ));
    }

    let poll_interval_ms = spec.poll_interval.as_millis() as u64;
    if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&poll_interval_ms) {
        problems.push(format!(
            "poll_interval must be between {} and {} ms, got {}",
            MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS, poll_interval_ms
        ));
    }

    if !(1..=MAX_POLL_ATTEMPTS_LIMIT).contains(&spec.max_poll_attempts) {
        problems.push(format!(
            "max_poll_attempts must be between 1 and {}, got {}",
            MAX_POLL_ATTEMPTS_LIMIT, spec.max_poll_attempts
        ));
    }

    let policy = &spec.retry_policy;
    if policy.max_retries > MAX_RETRIES_LIMIT {
        problems.push(format!(
            "retry_policy.max_retries must be between 0 and {}, got {}",
            MAX_RETRIES_LIMIT, policy.max_retries
        ));
    }
    if !(MIN_RETRY_DELAY_MS..=MAX_RETRY_DELAY_MS).contains(&policy.retry_delay_ms) {
        problems.push(format!(
            "retry_policy.retry_delay_ms must be between {} and {}, got {}",
            MIN_RETRY_DELAY_MS, MAX_RETRY_DELAY_MS, policy.retry_delay_ms
        ));
    }

    problems
}
