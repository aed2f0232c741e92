//! Envelope dispatch onto the durable queues.

use futures::future::join;
use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::envelope::Envelope;
use crate::error::{GeotrackError, Result};
use crate::model::DeadLetterEntry;
use crate::ports::QueueBackend;
use crate::queues::QueueNames;

/// Builds envelopes and pushes them onto the pipeline's queues.
///
/// Cheap to clone; every component that writes to a queue holds one.
#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<dyn QueueBackend>,
    names: QueueNames,
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn QueueBackend>, names: QueueNames) -> Self {
        Self { queue, names }
    }

    pub fn queue_names(&self) -> &QueueNames {
        &self.names
    }

    pub fn backend(&self) -> &Arc<dyn QueueBackend> {
        &self.queue
    }

    /// Ingestion entry point.
    ///
    /// Wraps `payload` in one envelope and pushes it to the event-log queue
    /// and the location queue concurrently. Both pushes run to completion;
    /// the first failure observed is returned without naming the queue.
    #[instrument(skip(self, payload), fields(payload_size = payload.len()))]
    pub async fn dispatch(&self, event_type: &str, source: &str, payload: &[u8]) -> Result<()> {
        let envelope = Envelope::from_raw(event_type, source, payload);
        let bytes = envelope.encode()?;

        let (event_log, location) = join(
            self.queue.push(&self.names.event_log, &bytes),
            self.queue.push(&self.names.location, &bytes),
        )
        .await;

        match event_log.and(location) {
            Ok(()) => {
                debug!("Envelope dispatched");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Envelope dispatch failed");
                Err(GeotrackError::Push(format!("{e:#}")))
            }
        }
    }

    /// Push an already-built envelope to the event-log queue.
    pub async fn push_event_log(&self, envelope: &Envelope) -> Result<()> {
        let bytes = envelope.encode()?;
        self.queue
            .push(&self.names.event_log, &bytes)
            .await
            .map_err(|e| GeotrackError::Push(format!("{e:#}")))
    }

    /// Push a failed write to the transient dead-letter queue.
    pub async fn push_dead_letter(&self, entry: &DeadLetterEntry) -> Result<()> {
        let bytes = serde_json::to_vec(entry).map_err(|e| GeotrackError::encode("dead letter", e))?;
        self.queue
            .push(&self.names.dead_letter, &bytes)
            .await
            .map_err(|e| GeotrackError::Push(format!("{e:#}")))
    }
}
