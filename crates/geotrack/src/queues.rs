//! Queue and topic names.

pub const EVENT_LOG_QUEUE: &str = "event_log:queue";
pub const LOCATION_QUEUE: &str = "vehicle_location:queue";
pub const DEAD_LETTER_QUEUE: &str = "event_log:dead_letter";
pub const ARCHIVE_QUEUE: &str = "event_log:dead_letter_queue";
pub const ALERT_TOPIC: &str = "geofence.event";

/// Source tag stamped on audit envelopes emitted by the transition path.
pub const GEOFENCE_SERVICE_SOURCE: &str = "geofence_service";
/// Source tag stamped on error envelopes emitted by the location consumer.
pub const LOCATION_WORKER_SOURCE: &str = "LocationWorker";

/// The four queues the pipeline uses. Defaults match the deployed names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueNames {
    pub event_log: String,
    pub location: String,
    pub dead_letter: String,
    pub archive: String,
}

impl Default for QueueNames {
    fn default() -> Self {
        Self {
            event_log: EVENT_LOG_QUEUE.to_string(),
            location: LOCATION_QUEUE.to_string(),
            dead_letter: DEAD_LETTER_QUEUE.to_string(),
            archive: ARCHIVE_QUEUE.to_string(),
        }
    }
}
