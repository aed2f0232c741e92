//! Backend seams.
//!
//! The core never talks to Redis, Postgres or a broker directly. Each
//! backend crate implements these traits and the worker binary hands the
//! implementations to the components as `Arc<dyn Trait>`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::model::{AuditLogEntry, Geofence, LocationSample, TransitionEvent, TransitionKind};

/// Durable FIFO queues addressed by name. At-least-once, no dedup.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Append `payload` to the tail of `queue`.
    async fn push(&self, queue: &str, payload: &[u8]) -> Result<()>;

    /// Block until the head of `queue` is available or `timeout` elapses.
    ///
    /// Returns `Ok(None)` on timeout.
    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

/// Vehicle position history.
#[async_trait]
pub trait LocationStore: Send + Sync {
    async fn insert_location(&self, sample: &LocationSample) -> Result<()>;

    /// Most recent sample for a vehicle by timestamp.
    async fn latest_location(&self, vehicle_id: &str) -> Result<Option<LocationSample>>;

    /// Samples with `start <= timestamp <= end`, oldest first.
    async fn location_history(
        &self,
        vehicle_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LocationSample>>;
}

#[async_trait]
pub trait GeofenceStore: Send + Sync {
    async fn active_geofences(&self) -> Result<Vec<Geofence>>;
}

#[async_trait]
pub trait TransitionStore: Send + Sync {
    async fn insert_transition(&self, event: &TransitionEvent) -> Result<()>;

    /// Kind of the most recent ENTER/EXIT for the pair, by timestamp.
    async fn last_transition_kind(
        &self,
        vehicle_id: &str,
        geofence_id: i64,
    ) -> Result<Option<TransitionKind>>;
}

#[async_trait]
pub trait AuditLogStore: Send + Sync {
    /// Append an entry, returning the id assigned by the store.
    async fn append_audit_entry(&self, entry: &AuditLogEntry) -> Result<i64>;
}

/// External alert sink. Implementations must publish durably.
#[async_trait]
pub trait AlertBroker: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;
}
