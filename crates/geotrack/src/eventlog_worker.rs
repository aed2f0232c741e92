//! Event-log queue consumer.
//!
//! Every envelope that reaches the event-log queue is persisted as an
//! append-only audit row. Writes that fail are wrapped in a
//! [`DeadLetterEntry`] together with the raw envelope JSON.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::consumer::{ConsumerLoop, ConsumerOptions, MessageHandler};
use crate::dispatch::Dispatcher;
use crate::envelope::Envelope;
use crate::model::{AuditLogEntry, DeadLetterEntry};
use crate::ports::AuditLogStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLogOutcome {
    Stored(i64),
    DeadLettered,
}

pub struct EventLogConsumer {
    audit: Arc<dyn AuditLogStore>,
    dispatcher: Dispatcher,
    consumer: ConsumerLoop,
}

impl EventLogConsumer {
    pub fn new(audit: Arc<dyn AuditLogStore>, dispatcher: Dispatcher, options: ConsumerOptions) -> Self {
        let consumer = ConsumerLoop::new(
            "event_log",
            dispatcher.backend().clone(),
            dispatcher.queue_names().event_log.clone(),
            options,
        );

        Self {
            audit,
            dispatcher,
            consumer,
        }
    }

    pub async fn run(&self, ctx: CancellationToken) -> anyhow::Result<()> {
        self.consumer.run(self, ctx).await
    }

    pub async fn process(&self, raw: &[u8]) -> EventLogOutcome {
        let envelope = match Envelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, "Failed to decode event log envelope");
                self.dead_letter(raw, e.to_string()).await;
                return EventLogOutcome::DeadLettered;
            }
        };

        let entry = AuditLogEntry {
            id: None,
            event_type: envelope.event_type,
            timestamp: envelope.timestamp,
            payload: envelope.payload,
            source: envelope.source,
        };

        match self.audit.append_audit_entry(&entry).await {
            Ok(id) => {
                debug!(id, event_type = %entry.event_type, "Saved event log");
                EventLogOutcome::Stored(id)
            }
            Err(e) => {
                error!(event_type = %entry.event_type, error = %e, "Failed to save event log");
                self.dead_letter(raw, format!("{e:#}")).await;
                EventLogOutcome::DeadLettered
            }
        }
    }

    async fn dead_letter(&self, raw: &[u8], cause: String) {
        let entry = DeadLetterEntry::new(String::from_utf8_lossy(raw), cause);
        if let Err(e) = self.dispatcher.push_dead_letter(&entry).await {
            error!(error = %e, "Error pushing to dead letter queue");
        }
    }
}

#[async_trait]
impl MessageHandler for EventLogConsumer {
    async fn handle(&self, raw: Vec<u8>) {
        self.process(&raw).await;
    }
}
