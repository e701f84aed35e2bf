//! Batch execution engine for vidbatch.
//!
//! Turns a list of video job descriptions into a bounded-concurrency,
//! retried, deadline-limited run against a [`VideoApi`], and reports one
//! outcome per job plus batch totals and cost.
//!
//! [`VideoApi`]: vidbatch_abstraction::VideoApi

pub mod config;
pub mod coordinator;
pub mod cost;
pub mod error;
pub mod executor;
pub mod limiter;
pub mod paths;
pub mod pricing;
pub mod retry;
pub mod types;
pub mod validate;

pub use config::{BatchConfig, ConfigFormat, ConfigOverrides, RetryPolicyConfig};
pub use coordinator::{BatchCoordinator, CANCELLED_REASON, DEFAULT_GRACE_PERIOD};
pub use cost::{CostBreakdown, CostEstimate, KindCost, estimate_cost};
pub use error::{BatchError, Result};
pub use executor::{JobArtifact, JobExecutor, PreparedJob};
pub use limiter::{AdmissionPermit, ConcurrencyLimiter};
pub use paths::resolve_output_paths;
pub use pricing::price_per_second;
pub use retry::{Attempted, DEFAULT_RETRY_PATTERNS, RetryPolicy, is_retryable, retry_with_policy};
pub use types::{
    BatchDefaults, BatchReport, BatchSpec, EffectiveParams, JobKind, JobOutcome, JobSpec, OutcomeStatus,
};
pub use validate::{validate_batch, validate_config};
