//! Admission gate bounding concurrent research calls.

use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Counting gate with a fixed number of slots.
///
/// Waiters are admitted in FIFO order. Cloning shares the same slots, which
/// is how a caller can pool capacity across concurrent runs on purpose.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A held slot; dropping it releases the slot.
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    /// Create a limiter; a capacity of zero is treated as one.
    pub fn new(max_concurrent: usize) -> Self {
        let capacity = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot.
    ///
    /// Only fails if the underlying semaphore was closed, which this type
    /// never does.
    pub async fn acquire(&self) -> Result<LimiterPermit, AcquireError> {
        let permit = self.semaphore.clone().acquire_owned().await?;
        Ok(LimiterPermit { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots free right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(10)
    }
}
