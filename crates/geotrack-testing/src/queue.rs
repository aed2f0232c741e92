use anyhow::{bail, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use geotrack_core::QueueBackend;
use std::collections::VecDeque;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// FIFO queues held in memory, with per-queue push faults.
#[derive(Default)]
pub struct InMemoryQueue {
    queues: DashMap<String, VecDeque<Vec<u8>>>,
    push_faults: DashMap<String, String>,
    fail_pops: AtomicBool,
    pushed: Notify,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every push to `queue` fail with `message`.
    pub fn fail_pushes_to(&self, queue: &str, message: &str) {
        self.push_faults.insert(queue.to_string(), message.to_string());
    }

    pub fn restore_pushes_to(&self, queue: &str) {
        self.push_faults.remove(queue);
    }

    /// Make every pop fail until reset.
    pub fn fail_pops(&self, fail: bool) {
        self.fail_pops.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self, queue: &str) -> usize {
        self.queues.get(queue).map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    /// Remove and return everything on `queue`, oldest first.
    pub fn drain(&self, queue: &str) -> Vec<Vec<u8>> {
        self.queues
            .get_mut(queue)
            .map(|mut q| q.drain(..).collect())
            .unwrap_or_default()
    }

    /// Decode everything on `queue` as JSON without removing it.
    pub fn peek_json(&self, queue: &str) -> Vec<serde_json::Value> {
        self.queues
            .get(queue)
            .map(|q| {
                q.iter()
                    .filter_map(|raw| serde_json::from_slice(raw).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn take(&self, queue: &str) -> Option<Vec<u8>> {
        self.queues.get_mut(queue).and_then(|mut q| q.pop_front())
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueue {
    async fn push(&self, queue: &str, payload: &[u8]) -> Result<()> {
        if let Some(message) = self.push_faults.get(queue) {
            bail!("{}", message.value());
        }

        self.queues
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.to_vec());
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        if self.fail_pops.load(Ordering::SeqCst) {
            bail!("pop from {queue} failed");
        }

        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking so a push in between is not missed.
            let mut notified = pin!(self.pushed.notified());
            notified.as_mut().enable();

            if let Some(item) = self.take(queue) {
                return Ok(Some(item));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }
}
