//! # Geotrack
//!
//! Vehicle telemetry pipeline: location samples are queued, persisted and
//! evaluated against circular geofences to produce ENTER/EXIT transitions
//! with hysteresis. Transitions, alerts and every envelope on the wire are
//! mirrored into an append-only audit log; writes that fail are routed to a
//! dead-letter queue and then archived.
//!
//! ## Architecture
//!
//! ```text
//! Ingestion adapter
//!     │
//!     ▼ Dispatcher::dispatch()
//! ┌───────────────┬──────────────────┐
//! ▼               ▼                  │
//! event_log:queue vehicle_location:queue
//!     │               │
//!     │               ▼ LocationConsumer
//!     │           LocationStore ──► TaskPool ──► TransitionService
//!     │                                              │
//!     │                     engine::evaluate() ◄─────┤
//!     │                                              ├─► TransitionStore
//!     │◄──────────── audit envelopes ────────────────┤
//!     │                                              └─► AlertPublisher ──► AlertBroker
//!     ▼ EventLogConsumer
//! AuditLogStore
//!     │ (write failed)
//!     ▼
//! event_log:dead_letter ──► DeadLetterArchiver ──► event_log:dead_letter_queue
//! ```
//!
//! ## Guarantees
//!
//! - **At-least-once queues**: no deduplication; a message may be seen twice.
//! - **No flapping**: a transition is never emitted with the same kind as the
//!   last recorded one for that (vehicle, geofence) pair.
//! - **Hysteresis**: history is only consulted within 5m of a boundary.
//! - **Best-effort alerts**: publish failures are logged and counted, never
//!   surfaced to the persistence path.
//!
//! Backends live in their own crates (`geotrack-postgres`, `geotrack-redis`,
//! `geotrack-nats`); this crate only sees the traits in [`ports`].
//!
//! ## Example
//!
//! ```ignore
//! let dispatcher = Dispatcher::new(queue.clone(), QueueNames::default());
//! let tasks = TaskPool::new(64);
//!
//! let transitions = TransitionService::new(store.clone(), store.clone(), dispatcher.clone(), tasks.clone())
//!     .with_alerts(AlertPublisher::new(broker, dispatcher.clone(), ALERT_TOPIC));
//!
//! let locations = LocationConsumer::new(store.clone(), transitions, dispatcher.clone(), tasks.clone(), options);
//! tokio::spawn(async move { locations.run(token).await });
//!
//! dispatcher.dispatch("location_update", "mqtt", br#"{"vehicle_id":"B1"}"#).await?;
//! ```

mod alert;
mod archiver;
mod consumer;
mod dispatch;
mod envelope;
mod error;
mod eventlog_worker;
mod location_worker;
mod tasks;
mod transition;

pub mod engine;
pub mod geo;
pub mod model;
pub mod ports;
pub mod queues;

pub use crate::alert::AlertPublisher;
pub use crate::archiver::DeadLetterArchiver;
pub use crate::consumer::{ConsumerLoop, ConsumerOptions, MessageHandler};
pub use crate::dispatch::Dispatcher;
pub use crate::envelope::Envelope;
pub use crate::error::{GeotrackError, Result};
pub use crate::eventlog_worker::{EventLogConsumer, EventLogOutcome};
pub use crate::location_worker::{LocationConsumer, LocationOutcome, SAVE_ERROR, UNMARSHAL_ERROR};
pub use crate::tasks::{TaskPool, TaskStats};
pub use crate::transition::{FanoutReport, TransitionService};

pub use crate::model::{
    AuditLogEntry, DeadLetterEntry, Geofence, GeofenceAlert, LocationSample, TransitionEvent,
    TransitionKind,
};
pub use crate::ports::{
    AlertBroker, AuditLogStore, GeofenceStore, LocationStore, QueueBackend, TransitionStore,
};
pub use crate::queues::QueueNames;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
