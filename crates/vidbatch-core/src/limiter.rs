//! Counting admission gate for job execution.

use crate::error::{BatchError, Result};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds how many jobs execute at once.
///
/// Backed by tokio's fair semaphore: waiters are admitted in the order they
/// called `acquire`, and a released permit goes straight to the oldest waiter.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Proof of admission. Dropping it releases the slot.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    /// Creates a limiter with `capacity` permits.
    pub fn new(capacity: usize) -> Self {
        Self { semaphore: Arc::new(Semaphore::new(capacity)), capacity }
    }

    /// Waits until a slot is free and claims it.
    ///
    /// The semaphore is never closed, so this only fails if that invariant breaks.
    pub async fn acquire(&self) -> Result<AdmissionPermit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| BatchError::Limiter(e.to_string()))?;
        Ok(AdmissionPermit { _permit: permit })
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
