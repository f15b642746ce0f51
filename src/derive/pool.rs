//! Bounded pool for CPU-bound derivative work.
//!
//! Decode, resize and encode steps run on tokio's blocking thread pool, but at
//! most `size` of them run at once. The permit travels into the blocking
//! closure, so an abandoned caller cannot free a slot while its work is still
//! running.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::ConversionError;

/// Worker count used when none is configured.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Semaphore-bounded gateway to the blocking thread pool.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Create a pool allowing `size` concurrent jobs (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Maximum number of concurrent jobs.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of jobs that could start right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run a blocking job once a slot is free.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::Worker`] if the job panics.
    pub async fn run<F, T>(&self, job: F) -> Result<T, ConversionError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| ConversionError::Worker {
                message: e.to_string(),
            })?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| ConversionError::Worker {
            message: e.to_string(),
        })
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(default_worker_count())
    }
}

// =============================================================================
// Tests
// =============================================================================
