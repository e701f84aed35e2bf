//! Error types for batch execution.

use thiserror::Error;

/// Result type for batch operations.
pub type Result<T> = std::result::Result<T, BatchError>;

/// Errors that abort a whole batch.
///
/// Per-job failures never surface here; they become `failed` outcomes.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The batch or one of its jobs is malformed. Every problem found is listed.
    #[error("Invalid batch: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// The configuration file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem errors outside of a single job (output directory checks).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The concurrency limiter refused admission.
    #[error("Concurrency limiter closed: {0}")]
    Limiter(String),
}

impl BatchError {
    /// Problems carried by a validation error, empty for other variants.
    pub fn problems(&self) -> &[String] {
        match self {
            Self::Validation(problems) => problems,
            _ => &[],
        }
    }
}
