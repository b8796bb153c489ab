//! Bounded pool for heavy document work
//!
//! Parsing, transforming, serializing and DOCX conversion run on tokio's
//! blocking threads behind a semaphore, so at most `workers` jobs run at once
//! and request handling stays responsive.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::ApiError;

#[derive(Clone, Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl WorkerPool {
    pub fn new(workers: usize, timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
        }
    }

    /// Run `job` on a blocking thread once a worker is free.
    ///
    /// The timeout covers both the wait for a worker and the job itself. A job
    /// that times out keeps its worker until it actually finishes.
    pub async fn run<T, F>(&self, job: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    {
        let permits = self.permits.clone();
        let work = async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| ApiError::Internal("Worker pool closed".into()))?;

            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                job()
            })
            .await
            .map_err(|e| ApiError::Internal(format!("Worker task failed: {}", e)))?
        };

        match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_elapsed) => {
                debug!("Job exceeded {:?}", self.timeout);
                Err(ApiError::Timeout(self.timeout.as_millis() as u64))
            }
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
