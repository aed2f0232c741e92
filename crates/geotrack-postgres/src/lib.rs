//! PostgreSQL implementation of the geotrack stores.
//!
//! One [`PgStore`] implements every store trait from `geotrack_core::ports`
//! over a shared connection pool.
//!
//! # Database Schema
//!
//! Provisioning is done out of band; [`SCHEMA`] holds the expected layout.
//!
//! ```sql
//! CREATE TABLE vehicle_locations (
//!     id BIGSERIAL PRIMARY KEY,
//!     vehicle_id TEXT NOT NULL,
//!     latitude DOUBLE PRECISION NOT NULL,
//!     longitude DOUBLE PRECISION NOT NULL,
//!     speed DOUBLE PRECISION,
//!     heading DOUBLE PRECISION,
//!     timestamp TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE geofences (
//!     id BIGSERIAL PRIMARY KEY,
//!     name TEXT NOT NULL,
//!     center_lat DOUBLE PRECISION NOT NULL,
//!     center_lng DOUBLE PRECISION NOT NULL,
//!     radius DOUBLE PRECISION NOT NULL,   -- meters
//!     active BOOLEAN NOT NULL DEFAULT TRUE
//! );
//!
//! CREATE TABLE geofence_events (
//!     id BIGSERIAL PRIMARY KEY,
//!     vehicle_id TEXT NOT NULL,
//!     geofence_id BIGINT NOT NULL,
//!     event_type TEXT NOT NULL CHECK (event_type IN ('geofence_entry', 'geofence_exit')),
//!     timestamp TIMESTAMPTZ NOT NULL,
//!     latitude DOUBLE PRECISION NOT NULL,
//!     longitude DOUBLE PRECISION NOT NULL
//! );
//!
//! CREATE TABLE event_logs (
//!     id BIGSERIAL PRIMARY KEY,
//!     event_type TEXT NOT NULL,
//!     timestamp TIMESTAMPTZ NOT NULL,
//!     payload JSONB,
//!     source TEXT
//! );
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use geotrack_postgres::PgStore;
//!
//! let store = Arc::new(PgStore::connect("postgres://localhost/geotrack", 10).await?);
//! let transitions = TransitionService::new(store.clone(), store.clone(), dispatcher, tasks);
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geotrack_core::{
    AuditLogEntry, AuditLogStore, Geofence, GeofenceStore, LocationSample, LocationStore,
    TransitionEvent, TransitionKind, TransitionStore,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument, warn};

/// Table layout the store expects. Idempotent.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS vehicle_locations (
    id BIGSERIAL PRIMARY KEY,
    vehicle_id TEXT NOT NULL,
    latitude DOUBLE PRECISION NOT NULL,
    longitude DOUBLE PRECISION NOT NULL,
    speed DOUBLE PRECISION,
    heading DOUBLE PRECISION,
    timestamp TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_vehicle_locations_vehicle_ts
    ON vehicle_locations (vehicle_id, timestamp);

CREATE TABLE IF NOT EXISTS geofences (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    center_lat DOUBLE PRECISION NOT NULL,
    center_lng DOUBLE PRECISION NOT NULL,
    radius DOUBLE PRECISION NOT NULL,
    active BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS geofence_events (
    id BIGSERIAL PRIMARY KEY,
    vehicle_id TEXT NOT NULL,
    geofence_id BIGINT NOT NULL,
    event_type TEXT NOT NULL CHECK (event_type IN ('geofence_entry', 'geofence_exit')),
    timestamp TIMESTAMPTZ NOT NULL,
    latitude DOUBLE PRECISION NOT NULL,
    longitude DOUBLE PRECISION NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_vehicle_geofence
    ON geofence_events (vehicle_id, geofence_id, timestamp);

CREATE TABLE IF NOT EXISTS event_logs (
    id BIGSERIAL PRIMARY KEY,
    event_type TEXT NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL,
    payload JSONB,
    source TEXT
);
CREATE INDEX IF NOT EXISTS idx_event_logs_timestamp ON event_logs (timestamp);
"#;

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool of at most `max_connections` connections.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .context("failed to connect to postgres")?;
        Ok(Self::new(pool))
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Wait for checked-out connections to return, then close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn location_from_row(row: PgRow) -> LocationSample {
    LocationSample {
        vehicle_id: row.get("vehicle_id"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        timestamp: row.get("timestamp"),
        speed: row.get("speed"),
        heading: row.get("heading"),
    }
}

#[async_trait]
impl LocationStore for PgStore {
    #[instrument(skip(self, sample), fields(vehicle_id = %sample.vehicle_id))]
    async fn insert_location(&self, sample: &LocationSample) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vehicle_locations (vehicle_id, latitude, longitude, speed, heading, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&sample.vehicle_id)
        .bind(sample.latitude)
        .bind(sample.longitude)
        .bind(sample.speed)
        .bind(sample.heading)
        .bind(sample.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_location(&self, vehicle_id: &str) -> Result<Option<LocationSample>> {
        let row = sqlx::query(
            r#"
            SELECT vehicle_id, latitude, longitude, speed, heading, timestamp
            FROM vehicle_locations
            WHERE vehicle_id = $1
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(location_from_row))
    }

    async fn location_history(
        &self,
        vehicle_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LocationSample>> {
        let rows = sqlx::query(
            r#"
            SELECT vehicle_id, latitude, longitude, speed, heading, timestamp
            FROM vehicle_locations
            WHERE vehicle_id = $1
              AND timestamp BETWEEN $2 AND $3
            ORDER BY timestamp ASC
            "#,
        )
        .bind(vehicle_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(location_from_row).collect())
    }
}

#[async_trait]
impl GeofenceStore for PgStore {
    async fn active_geofences(&self) -> Result<Vec<Geofence>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, center_lat, center_lng, radius, active
            FROM geofences
            WHERE active = TRUE
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), "Loaded active geofences");

        Ok(rows
            .into_iter()
            .map(|row| Geofence {
                id: row.get("id"),
                name: row.get("name"),
                center_lat: row.get("center_lat"),
                center_lng: row.get("center_lng"),
                radius: row.get("radius"),
                active: row.get("active"),
            })
            .collect())
    }
}

#[async_trait]
impl TransitionStore for PgStore {
    #[instrument(skip(self, event), fields(vehicle_id = %event.vehicle_id, geofence_id = event.geofence_id))]
    async fn insert_transition(&self, event: &TransitionEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO geofence_events (vehicle_id, geofence_id, event_type, timestamp, latitude, longitude)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&event.vehicle_id)
        .bind(event.geofence_id)
        .bind(event.kind.as_str())
        .bind(event.timestamp)
        .bind(event.latitude)
        .bind(event.longitude)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn last_transition_kind(
        &self,
        vehicle_id: &str,
        geofence_id: i64,
    ) -> Result<Option<TransitionKind>> {
        let row = sqlx::query(
            r#"
            SELECT event_type
            FROM geofence_events
            WHERE vehicle_id = $1
              AND geofence_id = $2
              AND event_type IN ($3, $4)
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(vehicle_id)
        .bind(geofence_id)
        .bind(TransitionKind::Enter.as_str())
        .bind(TransitionKind::Exit.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let event_type: String = row.get("event_type");
        match TransitionKind::parse(&event_type) {
            Some(kind) => Ok(Some(kind)),
            None => {
                warn!(%event_type, "Unknown geofence event type in history");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl AuditLogStore for PgStore {
    #[instrument(skip(self, entry), fields(event_type = %entry.event_type))]
    async fn append_audit_entry(&self, entry: &AuditLogEntry) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO event_logs (event_type, timestamp, payload, source)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&entry.event_type)
        .bind(entry.timestamp)
        .bind(&entry.payload)
        .bind(&entry.source)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }
}

/// Seeding helpers used by tooling and tests.
impl PgStore {
    /// Insert a geofence and return its id.
    pub async fn insert_geofence(&self, geofence: &Geofence) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO geofences (name, center_lat, center_lng, radius, active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&geofence.name)
        .bind(geofence.center_lat)
        .bind(geofence.center_lng)
        .bind(geofence.radius)
        .bind(geofence.active)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }
}
