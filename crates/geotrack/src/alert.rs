//! Durable alert publishing.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::envelope::Envelope;
use crate::error::{GeotrackError, Result};
use crate::model::{GeofenceAlert, TransitionKind};
use crate::ports::AlertBroker;
use crate::queues::GEOFENCE_SERVICE_SOURCE;

/// Publishes geofence alerts to the broker and mirrors them to the audit
/// log.
///
/// The broker connection belongs to whoever built the [`AlertBroker`]; this
/// type never reconnects or retries.
#[derive(Clone)]
pub struct AlertPublisher {
    broker: Arc<dyn AlertBroker>,
    dispatcher: Dispatcher,
    topic: String,
}

impl AlertPublisher {
    pub fn new(broker: Arc<dyn AlertBroker>, dispatcher: Dispatcher, topic: impl Into<String>) -> Self {
        Self {
            broker,
            dispatcher,
            topic: topic.into(),
        }
    }

    pub async fn publish_alert(
        &self,
        vehicle_id: &str,
        latitude: f64,
        longitude: f64,
        kind: TransitionKind,
    ) -> Result<GeofenceAlert> {
        let alert = GeofenceAlert {
            alert_id: Uuid::new_v4(),
            event_type: kind,
            vehicle_id: vehicle_id.to_string(),
            latitude,
            longitude,
            timestamp: Utc::now().timestamp(),
        };

        let body = serde_json::to_vec(&alert).map_err(|e| GeotrackError::encode("alert", e))?;

        if let Err(e) = self.broker.publish(&self.topic, &body).await {
            error!(
                topic = %self.topic,
                vehicle_id = %vehicle_id,
                error = %e,
                "Failed to publish geofence alert"
            );
            return Err(GeotrackError::Publish {
                topic: self.topic.clone(),
                message: format!("{e:#}"),
            });
        }

        info!(
            alert_id = %alert.alert_id,
            kind = %kind,
            vehicle_id = %vehicle_id,
            latitude,
            longitude,
            "Published geofence alert"
        );

        let mirrored = Envelope::wrap(kind.as_str(), GEOFENCE_SERVICE_SOURCE, &alert);
        match mirrored {
            Ok(envelope) => {
                if let Err(e) = self.dispatcher.push_event_log(&envelope).await {
                    warn!(alert_id = %alert.alert_id, error = %e, "Failed to mirror alert to event log");
                }
            }
            Err(e) => warn!(alert_id = %alert.alert_id, error = %e, "Failed to encode alert audit envelope"),
        }

        Ok(alert)
    }
}
