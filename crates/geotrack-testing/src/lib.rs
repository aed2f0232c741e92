//! In-memory backends for testing geotrack pipelines.
//!
//! Everything here implements the traits from `geotrack_core::ports` and
//! can be told to fail on demand, so tests can drive the error paths
//! (dead letters, `save_error` envelopes, partial dispatch) without a
//! database, Redis or a broker.
//!
//! ```ignore
//! let queue = Arc::new(InMemoryQueue::new());
//! queue.fail_pushes_to("vehicle_location:queue", "redis down");
//!
//! let dispatcher = Dispatcher::new(queue.clone(), QueueNames::default());
//! assert!(dispatcher.dispatch("location_update", "mqtt", b"{}").await.is_err());
//! assert_eq!(queue.len("event_log:queue"), 1);
//! ```

mod broker;
mod queue;
mod store;

pub use broker::RecordingBroker;
pub use queue::InMemoryQueue;
pub use store::{Fault, InMemoryStore};

use chrono::{DateTime, TimeZone, Utc};
use geotrack_core::{Envelope, Geofence, LocationSample};

/// Geofence fixture centred on Bundaran HI, Jakarta.
pub fn bundaran_hi(radius: f64) -> Geofence {
    Geofence {
        id: 1,
        name: "Bundaran HI".to_string(),
        center_lat: -6.193125,
        center_lng: 106.820233,
        radius,
        active: true,
    }
}

/// A sample `meters_north` of the fixture geofence's center.
pub fn sample_north_of_center(vehicle_id: &str, meters_north: f64) -> LocationSample {
    let degrees = meters_north / 111_194.93;
    LocationSample {
        vehicle_id: vehicle_id.to_string(),
        latitude: -6.193125 + degrees,
        longitude: 106.820233,
        timestamp: fixed_time(0),
        speed: Some(30.0),
        heading: Some(0.0),
    }
}

/// Deterministic timestamps: `offset_secs` after 2025-01-01T00:00:00Z.
pub fn fixed_time(offset_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_735_689_600 + offset_secs, 0)
        .single()
        .unwrap_or_default()
}

/// Wire bytes for a location envelope, as the ingestion adapter would send.
pub fn location_envelope(sample: &LocationSample) -> Vec<u8> {
    Envelope::wrap("location_update", "mqtt", sample)
        .and_then(|envelope| envelope.encode())
        .unwrap_or_default()
}
