//! Dead-letter archiver.
//!
//! The dead-letter queue is a short-lived holding area for inspection. This
//! loop moves every entry, byte for byte, onto the archive queue, which is
//! the durable record of permanent failures.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::consumer::{ConsumerLoop, ConsumerOptions, MessageHandler};
use crate::ports::QueueBackend;
use crate::queues::QueueNames;

pub struct DeadLetterArchiver {
    queue: Arc<dyn QueueBackend>,
    archive_queue: String,
    consumer: ConsumerLoop,
}

impl DeadLetterArchiver {
    pub fn new(queue: Arc<dyn QueueBackend>, names: &QueueNames, options: ConsumerOptions) -> Self {
        let consumer = ConsumerLoop::new("archiver", queue.clone(), names.dead_letter.clone(), options);

        Self {
            queue,
            archive_queue: names.archive.clone(),
            consumer,
        }
    }

    pub async fn run(&self, ctx: CancellationToken) -> anyhow::Result<()> {
        self.consumer.run(self, ctx).await
    }

    /// Move one entry to the archive queue. Returns whether the push landed.
    pub async fn archive(&self, raw: &[u8]) -> bool {
        info!(entry = %String::from_utf8_lossy(raw), "Archiving dead letter entry");

        match self.queue.push(&self.archive_queue, raw).await {
            Ok(()) => true,
            Err(e) => {
                error!(queue = %self.archive_queue, error = %e, "Error pushing to archive queue");
                false
            }
        }
    }
}

#[async_trait]
impl MessageHandler for DeadLetterArchiver {
    async fn handle(&self, raw: Vec<u8>) {
        self.archive(&raw).await;
    }
}
