//! Shared queue-draining loop.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::ports::QueueBackend;

/// Handles one dequeued message. Handlers own their error routing, so there
/// is nothing to return.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, raw: Vec<u8>);
}

/// Timing knobs shared by every consumer loop.
#[derive(Debug, Clone, Copy)]
pub struct ConsumerOptions {
    /// Upper bound on one blocking dequeue; the loop checks for shutdown
    /// between dequeues.
    pub poll_timeout: Duration,
    /// Pause after a dequeue error. Zero retries immediately.
    pub error_backoff: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(5),
            error_backoff: Duration::ZERO,
        }
    }
}

/// Blocks on one queue and feeds each message to a [`MessageHandler`] until
/// the cancellation token fires.
pub struct ConsumerLoop {
    name: &'static str,
    queue: Arc<dyn QueueBackend>,
    queue_name: String,
    options: ConsumerOptions,
}

impl ConsumerLoop {
    pub fn new(
        name: &'static str,
        queue: Arc<dyn QueueBackend>,
        queue_name: impl Into<String>,
        options: ConsumerOptions,
    ) -> Self {
        Self {
            name,
            queue,
            queue_name: queue_name.into(),
            options,
        }
    }

    pub async fn run<H>(&self, handler: &H, ctx: CancellationToken) -> anyhow::Result<()>
    where
        H: MessageHandler + ?Sized,
    {
        info!(consumer = self.name, queue = %self.queue_name, "Starting consumer loop");

        // Shutdown is checked between pops. A pop that has started always
        // finishes and its message is handed to the handler; the server may
        // already have removed it.
        while !ctx.is_cancelled() {
            match self.queue.pop(&self.queue_name, self.options.poll_timeout).await {
                Ok(Some(raw)) => handler.handle(raw).await,
                Ok(None) => {}
                Err(e) => {
                    error!(
                        consumer = self.name,
                        queue = %self.queue_name,
                        error = %e,
                        "Error popping from queue"
                    );
                    if !self.options.error_backoff.is_zero() {
                        tokio::select! {
                            _ = ctx.cancelled() => {}
                            _ = tokio::time::sleep(self.options.error_backoff) => {}
                        }
                    }
                }
            }
        }

        info!(consumer = self.name, "Consumer stopped gracefully");
        Ok(())
    }
}
