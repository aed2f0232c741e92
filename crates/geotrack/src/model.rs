//! Domain records that flow through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A single vehicle position report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
}

/// A circular region. `radius` is in meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub id: i64,
    pub name: String,
    pub center_lat: f64,
    pub center_lng: f64,
    pub radius: f64,
    pub active: bool,
}

impl Geofence {
    pub fn is_valid(&self) -> bool {
        self.radius > 0.0 && self.radius.is_finite()
    }
}

/// Direction of a geofence boundary crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionKind {
    #[serde(rename = "geofence_entry")]
    Enter,
    #[serde(rename = "geofence_exit")]
    Exit,
}

impl TransitionKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Enter => "geofence_entry",
            TransitionKind::Exit => "geofence_exit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "geofence_entry" => Some(TransitionKind::Enter),
            "geofence_exit" => Some(TransitionKind::Exit),
            _ => None,
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A confirmed ENTER/EXIT for one (vehicle, geofence) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub vehicle_id: String,
    pub geofence_id: i64,
    pub geofence_name: String,
    pub kind: TransitionKind,
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Persisted copy of an envelope. `id` is assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Option<i64>,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub source: String,
}

/// A write that could not be persisted, kept verbatim for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub event_json: String,
    pub error_msg: String,
    /// Unix seconds.
    pub failed_at: i64,
}

impl DeadLetterEntry {
    pub fn new(event_json: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            event_json: event_json.into(),
            error_msg: error.to_string(),
            failed_at: Utc::now().timestamp(),
        }
    }
}

/// Alert record published to the broker for ENTER transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceAlert {
    pub alert_id: Uuid,
    pub event_type: TransitionKind,
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Unix seconds.
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_kind_wire_names() {
        assert_eq!(
            serde_json::to_value(TransitionKind::Enter).unwrap(),
            serde_json::json!("geofence_entry")
        );
        assert_eq!(TransitionKind::parse("geofence_exit"), Some(TransitionKind::Exit));
        assert_eq!(TransitionKind::parse("entering"), None);
    }

    #[test]
    fn location_sample_accepts_missing_speed_and_heading() {
        let sample: LocationSample = serde_json::from_str(
            r#"{"vehicle_id":"B1234XYZ","latitude":-6.2,"longitude":106.8,"timestamp":"2025-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        assert_eq!(sample.vehicle_id, "B1234XYZ");
        assert!(sample.speed.is_none());
        assert!(sample.heading.is_none());
    }

    #[test]
    fn non_positive_radius_is_invalid() {
        let mut fence = Geofence {
            id: 1,
            name: "depot".into(),
            center_lat: 0.0,
            center_lng: 0.0,
            radius: 0.0,
            active: true,
        };
        assert!(!fence.is_valid());
        fence.radius = 25.0;
        assert!(fence.is_valid());
    }

    #[test]
    fn dead_letter_entry_wire_format() {
        let entry = DeadLetterEntry {
            event_json: "{}".into(),
            error_msg: "boom".into(),
            failed_at: 1_700_000_000,
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["event_json"], "{}");
        assert_eq!(value["error_msg"], "boom");
        assert_eq!(value["failed_at"], 1_700_000_000);
    }
}
