//! Retry wrapper with message-pattern classification.
//!
//! Whether a failure is retried depends only on its message: a
//! case-insensitive substring match against the policy's patterns. A
//! permanent error whose text happens to contain a pattern is retried too.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Patterns retried when a batch does not configure its own.
pub const DEFAULT_RETRY_PATTERNS: [&str; 6] =
    ["rate limit", "rate_limit", "timeout", "429", "500", "503"];

/// Retry policy for batch jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `2` allows three attempts in total.
    pub max_retries: u32,
    /// Fixed wait before each retry.
    pub retry_delay_ms: u64,
    /// Case-insensitive substrings marking an error message as retryable.
    pub retry_patterns: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay_ms: 5_000,
            retry_patterns: DEFAULT_RETRY_PATTERNS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl RetryPolicy {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Returns true if an error with this message should be retried.
    pub fn should_retry(&self, message: &str) -> bool {
        is_retryable(message, &self.retry_patterns)
    }
}

/// Classifies an error message against retry patterns.
///
/// Empty patterns never match.
pub fn is_retryable(message: &str, patterns: &[String]) -> bool {
    let message = message.to_lowercase();
    patterns
        .iter()
        .map(|pattern| pattern.trim().to_lowercase())
        .any(|pattern| !pattern.is_empty() && message.contains(&pattern))
}

/// Result of running work under a retry policy.
#[derive(Debug)]
pub struct Attempted<T, E> {
    /// Final success, or the error of the last attempt.
    pub result: Result<T, E>,
    /// Attempts made, including the first.
    pub attempts: u32,
    /// Measured from the start of the first attempt.
    pub elapsed: Duration,
}

/// Runs `work` until it succeeds, fails with a non-retryable error, or the
/// policy's retries are used up.
///
/// `work` receives the zero-based attempt number.
pub async fn retry_with_policy<T, E, F, Fut>(policy: &RetryPolicy, mut work: F) -> Attempted<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let start = Instant::now();
    let mut attempt = 0u32;

    loop {
        let attempt_start = Instant::now();
        let result = work(attempt).await;
        debug!(
            attempt = attempt + 1,
            elapsed_ms = attempt_start.elapsed().as_millis() as u64,
            success = result.is_ok(),
            "Attempt finished"
        );

        let error = match result {
            Ok(value) => {
                return Attempted { result: Ok(value), attempts: attempt + 1, elapsed: start.elapsed() };
            }
            Err(error) => error,
        };

        let message = error.to_string();
        if attempt >= policy.max_retries || !policy.should_retry(&message) {
            return Attempted { result: Err(error), attempts: attempt + 1, elapsed: start.elapsed() };
        }

        warn!(
            retry = attempt + 1,
            max_retries = policy.max_retries,
            delay_ms = policy.retry_delay_ms,
            error = %message,
            "Retryable failure, retrying after delay"
        );
        tokio::time::sleep(policy.retry_delay()).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy { max_retries, retry_delay_ms: 1_000, ..RetryPolicy::default() }
    }

    #[test]
    fn test_classification_is_case_insensitive() {
        let patterns = vec!["Rate Limit".to_string(), "503".to_string()];
        assert!(is_retryable("RATE LIMIT exceeded", &patterns));
        assert!(is_retryable("API error (503): overloaded", &patterns));
        assert!(!is_retryable("Authentication failed: bad key", &patterns));
        assert!(!is_retryable("anything", &["  ".to_string()]));
    }

    #[test]
    fn test_default_patterns_cover_transient_errors() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry("Rate limit exceeded (429): slow down"));
        assert!(policy.should_retry("Polling timeout: video not finished after 120 attempts"));
        assert!(policy.should_retry("API error (500): internal"));
        assert!(!policy.should_retry("Access denied: organization not verified"));
    }

    #[test]
    fn test_permanent_error_matching_a_pattern_is_retried() {
        // Classification looks only at the text.
        assert!(RetryPolicy::default().should_retry("Not found: upstream proxy answered 500"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let outcome = retry_with_policy(&policy(2), move |_| async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("Rate limit exceeded (429)".to_string())
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(outcome.result, Ok("done"));
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.elapsed >= Duration::from_millis(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_matching_error_fails_immediately() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let outcome: Attempted<(), String> = retry_with_policy(&policy(5), move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err("content policy violation".to_string())
        })
        .await;

        assert_eq!(outcome.result, Err("content policy violation".to_string()));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(outcome.elapsed < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let outcome: Attempted<(), String> =
            retry_with_policy(&policy(2), |attempt| async move { Err(format!("timeout #{}", attempt)) }).await;

        assert_eq!(outcome.result, Err("timeout #2".to_string()));
        assert_eq!(outcome.attempts, 3);
    }
}
