//! Location queue consumer.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::consumer::{ConsumerLoop, ConsumerOptions, MessageHandler};
use crate::dispatch::Dispatcher;
use crate::envelope::Envelope;
use crate::model::LocationSample;
use crate::ports::LocationStore;
use crate::queues::LOCATION_WORKER_SOURCE;
use crate::tasks::TaskPool;
use crate::transition::TransitionService;

pub const UNMARSHAL_ERROR: &str = "unmarshal_error";
pub const SAVE_ERROR: &str = "save_error";

#[derive(Debug, Clone, PartialEq)]
pub enum LocationOutcome {
    /// Stored; geofence fan-out was submitted.
    Persisted(LocationSample),
    /// Not a location envelope; reported as `unmarshal_error` and dropped.
    Malformed,
    /// The store rejected it; reported as `save_error` and dropped.
    SaveFailed,
}

/// Drains the location queue, stores each sample and triggers geofence
/// evaluation in the background.
pub struct LocationConsumer {
    locations: Arc<dyn LocationStore>,
    transitions: TransitionService,
    dispatcher: Dispatcher,
    tasks: TaskPool,
    consumer: ConsumerLoop,
}

impl LocationConsumer {
    pub fn new(
        locations: Arc<dyn LocationStore>,
        transitions: TransitionService,
        dispatcher: Dispatcher,
        tasks: TaskPool,
        options: ConsumerOptions,
    ) -> Self {
        let consumer = ConsumerLoop::new(
            "location",
            dispatcher.backend().clone(),
            dispatcher.queue_names().location.clone(),
            options,
        );

        Self {
            locations,
            transitions,
            dispatcher,
            tasks,
            consumer,
        }
    }

    pub async fn run(&self, ctx: CancellationToken) -> anyhow::Result<()> {
        self.consumer.run(self, ctx).await
    }

    pub async fn process(&self, raw: &[u8]) -> LocationOutcome {
        let sample = match Envelope::decode(raw).and_then(|env| env.payload_as::<LocationSample>()) {
            Ok(sample) => sample,
            Err(e) => {
                warn!(error = %e, "Failed to unmarshal vehicle location");
                self.report(UNMARSHAL_ERROR, raw).await;
                return LocationOutcome::Malformed;
            }
        };

        debug!(
            vehicle_id = %sample.vehicle_id,
            latitude = sample.latitude,
            longitude = sample.longitude,
            "Parsed vehicle location"
        );

        if let Err(e) = self.locations.insert_location(&sample).await {
            error!(vehicle_id = %sample.vehicle_id, error = %e, "Failed to save vehicle location");
            self.report(SAVE_ERROR, raw).await;
            return LocationOutcome::SaveFailed;
        }

        let transitions = self.transitions.clone();
        let submitted = sample.clone();
        self.tasks.spawn("geofence_fanout", async move {
            transitions.process_sample(&submitted).await?;
            Ok(())
        });

        LocationOutcome::Persisted(sample)
    }

    async fn report(&self, event_type: &str, raw: &[u8]) {
        let envelope = Envelope::from_raw(event_type, LOCATION_WORKER_SOURCE, raw);
        if let Err(e) = self.dispatcher.push_event_log(&envelope).await {
            error!(event_type, error = %e, "Failed to report location error to event log");
        }
    }
}

#[async_trait]
impl MessageHandler for LocationConsumer {
    async fn handle(&self, raw: Vec<u8>) {
        self.process(&raw).await;
    }
}
