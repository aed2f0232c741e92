//! The transport wrapper used on every queue.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{GeotrackError, Result};

/// Generic transport unit: `{event_type, timestamp, payload, source}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub source: String,
}

impl Envelope {
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: Utc::now(),
            payload,
            source: source.into(),
        }
    }

    /// Wrap raw bytes. Valid JSON is embedded as-is; anything else becomes a
    /// JSON string so the envelope stays encodable.
    pub fn from_raw(event_type: impl Into<String>, source: impl Into<String>, raw: &[u8]) -> Self {
        let payload = serde_json::from_slice(raw)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(raw).into_owned()));
        Self::new(event_type, source, payload)
    }

    /// Wrap any serializable value.
    pub fn wrap<T: Serialize>(
        event_type: impl Into<String>,
        source: impl Into<String>,
        value: &T,
    ) -> Result<Self> {
        let payload =
            serde_json::to_value(value).map_err(|e| GeotrackError::encode("envelope payload", e))?;
        Ok(Self::new(event_type, source, payload))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| GeotrackError::encode("envelope", e))
    }

    pub fn decode(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw).map_err(GeotrackError::MalformedEnvelope)
    }

    /// Deserialize the payload into a concrete record.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.payload).map_err(GeotrackError::MalformedPayload)
    }
}
