//! Transition persistence and alert fan-out.
//!
//! Runs after a location sample has been stored: evaluates it against the
//! active geofences, persists each transition, mirrors it to the audit log
//! and hands ENTER transitions to the alert publisher.
//!
//! EXIT transitions are persisted and audited but never alerted. That
//! asymmetry is current product behavior, not a confirmed requirement.

use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::alert::AlertPublisher;
use crate::dispatch::Dispatcher;
use crate::engine::{evaluate, StoreLookup};
use crate::envelope::Envelope;
use crate::error::{GeotrackError, Result};
use crate::model::{DeadLetterEntry, LocationSample, TransitionEvent, TransitionKind};
use crate::ports::{GeofenceStore, TransitionStore};
use crate::queues::GEOFENCE_SERVICE_SOURCE;
use crate::tasks::TaskPool;

/// What happened to the transitions produced for one sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub persisted: usize,
    pub dead_lettered: usize,
    pub alerts_submitted: usize,
}

#[derive(Clone)]
pub struct TransitionService {
    geofences: Arc<dyn GeofenceStore>,
    transitions: Arc<dyn TransitionStore>,
    dispatcher: Dispatcher,
    alerts: Option<AlertPublisher>,
    tasks: TaskPool,
}

impl TransitionService {
    pub fn new(
        geofences: Arc<dyn GeofenceStore>,
        transitions: Arc<dyn TransitionStore>,
        dispatcher: Dispatcher,
        tasks: TaskPool,
    ) -> Self {
        Self {
            geofences,
            transitions,
            dispatcher,
            alerts: None,
            tasks,
        }
    }

    /// Enable alerting for ENTER transitions.
    pub fn with_alerts(mut self, publisher: AlertPublisher) -> Self {
        self.alerts = Some(publisher);
        self
    }

    #[instrument(skip(self, sample), fields(vehicle_id = %sample.vehicle_id))]
    pub async fn process_sample(&self, sample: &LocationSample) -> Result<FanoutReport> {
        let fences = match self.geofences.active_geofences().await {
            Ok(fences) => fences,
            Err(e) => {
                error!(error = %e, "Failed to load active geofences, skipping sample");
                return Err(GeotrackError::store("load active geofences", e));
            }
        };

        let lookup = StoreLookup::new(self.transitions.as_ref());
        let events = evaluate(sample, &fences, &lookup).await;

        let mut report = FanoutReport::default();
        for event in events {
            self.record(event, &mut report).await;
        }

        if report != FanoutReport::default() {
            debug!(?report, "Processed geofence transitions");
        }
        Ok(report)
    }

    async fn record(&self, event: TransitionEvent, report: &mut FanoutReport) {
        if let Err(e) = self.transitions.insert_transition(&event).await {
            error!(
                vehicle_id = %event.vehicle_id,
                geofence_id = event.geofence_id,
                error = %e,
                "Failed to save geofence transition"
            );
            self.dead_letter(&event, &e).await;
            report.dead_lettered += 1;
            return;
        }
        report.persisted += 1;

        info!(
            vehicle_id = %event.vehicle_id,
            geofence_id = event.geofence_id,
            kind = %event.kind,
            "Recorded geofence transition"
        );

        match Envelope::wrap(event.kind.as_str(), GEOFENCE_SERVICE_SOURCE, &event) {
            Ok(envelope) => {
                if let Err(e) = self.dispatcher.push_event_log(&envelope).await {
                    warn!(error = %e, "Failed to mirror transition to event log");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode transition audit envelope"),
        }

        if event.kind == TransitionKind::Enter {
            if let Some(publisher) = self.alerts.clone() {
                self.tasks.spawn("geofence_alert", async move {
                    publisher
                        .publish_alert(&event.vehicle_id, event.latitude, event.longitude, event.kind)
                        .await?;
                    Ok(())
                });
                report.alerts_submitted += 1;
            }
        }
    }

    async fn dead_letter(&self, event: &TransitionEvent, cause: &anyhow::Error) {
        let event_json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Failed to encode transition for dead letter");
                return;
            }
        };

        let entry = DeadLetterEntry::new(event_json, format!("{cause:#}"));
        if let Err(e) = self.dispatcher.push_dead_letter(&entry).await {
            error!(error = %e, "Error pushing to dead letter queue");
        }
    }
}
