//! Bounded pool for fire-and-forget work.
//!
//! Geofence fan-out and alert publishing must not add latency to the
//! consumer that triggered them, but they should not be detached either:
//! the pool caps how many run at once, counts how they finish, and lets
//! shutdown wait for whatever is still in flight.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time view of the pool's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl TaskStats {
    pub fn in_flight(&self) -> u64 {
        self.submitted
            .saturating_sub(self.succeeded)
            .saturating_sub(self.failed)
    }
}

#[derive(Clone)]
pub struct TaskPool {
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    counters: Arc<Counters>,
}

impl TaskPool {
    /// Create a pool running at most `concurrency` tasks at a time.
    pub fn new(concurrency: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Submit a task. Returns immediately; the task waits for a permit.
    ///
    /// Tasks may still be submitted while the pool is shutting down so that
    /// in-flight work can schedule its own follow-ups.
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.counters.submitted.fetch_add(1, Ordering::Release);
        let permits = self.permits.clone();
        let counters = self.counters.clone();

        self.tracker.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    counters.failed.fetch_add(1, Ordering::Release);
                    return;
                }
            };

            match task.await {
                Ok(()) => {
                    counters.succeeded.fetch_add(1, Ordering::Release);
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Release);
                    debug!(task = name, error = %e, "Background task failed");
                }
            }
        });
    }

    pub fn stats(&self) -> TaskStats {
        // Completions first, so a task finishing mid-read cannot push them
        // past `submitted`.
        let succeeded = self.counters.succeeded.load(Ordering::Acquire);
        let failed = self.counters.failed.load(Ordering::Acquire);
        TaskStats {
            submitted: self.counters.submitted.load(Ordering::Acquire),
            succeeded,
            failed,
        }
    }

    /// Close the pool and wait for in-flight tasks.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            info!(pending, "Waiting for background tasks");
        }

        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    remaining = self.tracker.len(),
                    "Background tasks did not finish before timeout"
                );
                false
            }
        }
    }
}
