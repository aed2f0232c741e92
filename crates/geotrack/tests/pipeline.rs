//! End-to-end behavior of the pipeline components over in-memory backends.

use geotrack_core::queues::{ALERT_TOPIC, EVENT_LOG_QUEUE, LOCATION_QUEUE};
use geotrack_core::{
    AlertPublisher, CancellationToken, ConsumerOptions, DeadLetterArchiver, DeadLetterEntry,
    Dispatcher, Envelope, EventLogConsumer, EventLogOutcome, GeotrackError, LocationConsumer,
    LocationOutcome, QueueBackend, QueueNames, TaskPool, TransitionEvent, TransitionKind,
    TransitionService, SAVE_ERROR, UNMARSHAL_ERROR,
};
use geotrack_testing::{
    bundaran_hi, fixed_time, location_envelope, sample_north_of_center, Fault, InMemoryQueue,
    InMemoryStore, RecordingBroker,
};
use std::sync::Arc;
use std::time::Duration;

const SHUTDOWN: Duration = Duration::from_secs(5);

struct Harness {
    queue: Arc<InMemoryQueue>,
    store: Arc<InMemoryStore>,
    broker: Arc<RecordingBroker>,
    dispatcher: Dispatcher,
    tasks: TaskPool,
}

impl Harness {
    fn new() -> Self {
        let queue = Arc::new(InMemoryQueue::new());
        Self {
            store: Arc::new(InMemoryStore::with_geofences([bundaran_hi(100.0)])),
            broker: Arc::new(RecordingBroker::new()),
            dispatcher: Dispatcher::new(queue.clone(), QueueNames::default()),
            tasks: TaskPool::new(8),
            queue,
        }
    }

    fn alerts(&self) -> AlertPublisher {
        AlertPublisher::new(self.broker.clone(), self.dispatcher.clone(), ALERT_TOPIC)
    }

    fn transitions(&self) -> TransitionService {
        TransitionService::new(
            self.store.clone(),
            self.store.clone(),
            self.dispatcher.clone(),
            self.tasks.clone(),
        )
        .with_alerts(self.alerts())
    }

    fn location_consumer(&self) -> LocationConsumer {
        LocationConsumer::new(
            self.store.clone(),
            self.transitions(),
            self.dispatcher.clone(),
            self.tasks.clone(),
            fast_options(),
        )
    }

    fn event_log(&self) -> Vec<Envelope> {
        self.queue
            .drain(EVENT_LOG_QUEUE)
            .iter()
            .map(|raw| Envelope::decode(raw).unwrap())
            .collect()
    }

    fn dead_letters(&self) -> Vec<DeadLetterEntry> {
        self.queue
            .drain(&QueueNames::default().dead_letter)
            .iter()
            .map(|raw| serde_json::from_slice(raw).unwrap())
            .collect()
    }
}

fn fast_options() -> ConsumerOptions {
    ConsumerOptions {
        poll_timeout: Duration::from_millis(50),
        error_backoff: Duration::from_millis(10),
    }
}

fn prior(kind: TransitionKind) -> TransitionEvent {
    TransitionEvent {
        vehicle_id: "B1234XYZ".into(),
        geofence_id: 1,
        geofence_name: "Bundaran HI".into(),
        kind,
        timestamp: fixed_time(-60),
        latitude: -6.193125,
        longitude: 106.820233,
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(SHUTDOWN, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// --- Dispatcher ---

#[tokio::test]
async fn dispatch_delivers_same_envelope_to_both_queues() {
    let h = Harness::new();

    h.dispatcher
        .dispatch("location_update", "mqtt", br#"{"vehicle_id":"B1"}"#)
        .await
        .unwrap();

    let logged = h.queue.drain(EVENT_LOG_QUEUE);
    let located = h.queue.drain(LOCATION_QUEUE);
    assert_eq!(logged.len(), 1);
    assert_eq!(logged, located);

    let envelope = Envelope::decode(&logged[0]).unwrap();
    assert_eq!(envelope.event_type, "location_update");
    assert_eq!(envelope.source, "mqtt");
    assert_eq!(envelope.payload["vehicle_id"], "B1");
}

#[tokio::test]
async fn dispatch_fault_on_one_queue_still_delivers_to_the_other() {
    let h = Harness::new();
    h.queue.fail_pushes_to(LOCATION_QUEUE, "connection reset");

    let err = h
        .dispatcher
        .dispatch("location_update", "mqtt", b"{}")
        .await
        .unwrap_err();

    assert!(matches!(err, GeotrackError::Push(_)));
    assert_eq!(h.queue.len(EVENT_LOG_QUEUE), 1);
    assert!(h.queue.is_empty(LOCATION_QUEUE));
}

// --- Location consumer ---

#[tokio::test]
async fn malformed_location_is_reported_as_unmarshal_error() {
    let h = Harness::new();
    let consumer = h.location_consumer();

    let outcome = consumer.process(b"not json{").await;
    assert_eq!(outcome, LocationOutcome::Malformed);

    let logged = h.event_log();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].event_type, UNMARSHAL_ERROR);
    assert_eq!(logged[0].source, "LocationWorker");
    assert_eq!(logged[0].payload, serde_json::json!("not json{"));
    assert!(h.store.locations().is_empty());
}

#[tokio::test]
async fn envelope_with_non_location_payload_is_reported_as_unmarshal_error() {
    let h = Harness::new();
    let consumer = h.location_consumer();

    let raw = Envelope::new("location_update", "mqtt", serde_json::json!({"plate": "B1234XYZ"}))
        .encode()
        .unwrap();
    assert_eq!(consumer.process(&raw).await, LocationOutcome::Malformed);

    let logged = h.event_log();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].event_type, UNMARSHAL_ERROR);
    // The raw message is valid JSON, so it is embedded as an object.
    assert_eq!(logged[0].payload["payload"]["plate"], "B1234XYZ");
    assert!(h.store.locations().is_empty());
    assert_eq!(h.tasks.stats().submitted, 0);
}

#[tokio::test]
async fn location_store_failure_is_reported_as_save_error() {
    let h = Harness::new();
    h.store.inject(Fault::InsertLocation);
    let consumer = h.location_consumer();

    let raw = location_envelope(&sample_north_of_center("B1234XYZ", 0.0));
    let outcome = consumer.process(&raw).await;
    assert_eq!(outcome, LocationOutcome::SaveFailed);

    let logged = h.event_log();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].event_type, SAVE_ERROR);
    // The whole incoming envelope is carried as the payload.
    assert_eq!(logged[0].payload["event_type"], "location_update");

    assert!(h.tasks.shutdown(SHUTDOWN).await);
    assert_eq!(h.tasks.stats().submitted, 0);
}

#[tokio::test]
async fn stored_location_triggers_fanout_and_enter_alert() {
    let h = Harness::new();
    let consumer = h.location_consumer();

    let sample = sample_north_of_center("B1234XYZ", 97.0);
    let outcome = consumer.process(&location_envelope(&sample)).await;
    assert!(matches!(outcome, LocationOutcome::Persisted(ref s) if s.vehicle_id == "B1234XYZ"));
    assert!(h.tasks.shutdown(SHUTDOWN).await);

    let stored = h.store.locations();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].timestamp, sample.timestamp);
    assert_eq!(stored[0].speed, Some(30.0));

    let transitions = h.store.transitions();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].kind, TransitionKind::Enter);
    assert_eq!(transitions[0].timestamp, sample.timestamp);

    let alerts = h.broker.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].vehicle_id, "B1234XYZ");
    assert_eq!(alerts[0].event_type, TransitionKind::Enter);
    assert_eq!(h.broker.published()[0].0, ALERT_TOPIC);

    // One audit envelope for the transition, one mirror of the alert.
    let logged = h.event_log();
    assert_eq!(logged.len(), 2);
    assert!(logged
        .iter()
        .all(|e| e.event_type == "geofence_entry" && e.source == "geofence_service"));

    let stats = h.tasks.stats();
    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.failed, 0);
}

// --- Transition fan-out ---

#[tokio::test]
async fn failed_transition_write_is_dead_lettered_without_alert() {
    let h = Harness::new();
    h.store.inject(Fault::InsertTransition);

    let report = h
        .transitions()
        .process_sample(&sample_north_of_center("B1234XYZ", 97.0))
        .await
        .unwrap();
    assert_eq!(report.persisted, 0);
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(report.alerts_submitted, 0);

    assert!(h.tasks.shutdown(SHUTDOWN).await);
    assert!(h.broker.published().is_empty());
    assert!(h.event_log().is_empty());

    let dead = h.dead_letters();
    assert_eq!(dead.len(), 1);
    assert!(dead[0].error_msg.contains("InsertTransition"));
    let event: TransitionEvent = serde_json::from_str(&dead[0].event_json).unwrap();
    assert_eq!(event.kind, TransitionKind::Enter);
    assert_eq!(event.vehicle_id, "B1234XYZ");
}

#[tokio::test]
async fn exit_is_persisted_and_audited_but_not_alerted() {
    let h = Harness::new();
    h.store.seed_transition(prior(TransitionKind::Enter));

    let report = h
        .transitions()
        .process_sample(&sample_north_of_center("B1234XYZ", 103.0))
        .await
        .unwrap();
    assert_eq!(report.persisted, 1);
    assert_eq!(report.alerts_submitted, 0);

    assert!(h.tasks.shutdown(SHUTDOWN).await);
    assert!(h.broker.published().is_empty());

    let logged = h.event_log();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].event_type, "geofence_exit");
}

#[tokio::test]
async fn vehicle_still_inside_produces_nothing() {
    let h = Harness::new();
    h.store.seed_transition(prior(TransitionKind::Enter));

    let report = h
        .transitions()
        .process_sample(&sample_north_of_center("B1234XYZ", 97.0))
        .await
        .unwrap();

    assert_eq!(report, Default::default());
    assert_eq!(h.store.transitions().len(), 1);
}

#[tokio::test]
async fn geofence_load_failure_surfaces_as_store_error() {
    let h = Harness::new();
    h.store.inject(Fault::LoadGeofences);

    let err = h
        .transitions()
        .process_sample(&sample_north_of_center("B1234XYZ", 97.0))
        .await
        .unwrap_err();
    assert!(matches!(err, GeotrackError::Store { .. }));
}

#[tokio::test]
async fn alert_publish_failure_is_counted_not_propagated() {
    let h = Harness::new();
    h.broker.fail(true);

    let report = h
        .transitions()
        .process_sample(&sample_north_of_center("B1234XYZ", 97.0))
        .await
        .unwrap();
    assert_eq!(report.persisted, 1);
    assert_eq!(report.alerts_submitted, 1);

    assert!(h.tasks.shutdown(SHUTDOWN).await);
    assert_eq!(h.tasks.stats().failed, 1);
    assert_eq!(h.store.transitions().len(), 1);
    // Only the transition audit envelope; the alert was never mirrored.
    assert_eq!(h.event_log().len(), 1);
}

// --- Alert publisher ---

#[tokio::test]
async fn publish_alert_returns_publish_error_and_skips_mirror() {
    let h = Harness::new();
    h.broker.fail(true);

    let err = h
        .alerts()
        .publish_alert("B1234XYZ", -6.19, 106.82, TransitionKind::Enter)
        .await
        .unwrap_err();

    match err {
        GeotrackError::Publish { topic, .. } => assert_eq!(topic, ALERT_TOPIC),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.event_log().is_empty());
}

#[tokio::test]
async fn published_alert_is_mirrored_with_same_id() {
    let h = Harness::new();

    let alert = h
        .alerts()
        .publish_alert("B1234XYZ", -6.19, 106.82, TransitionKind::Enter)
        .await
        .unwrap();

    let logged = h.event_log();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].payload["alert_id"], alert.alert_id.to_string());
    let published = h.broker.alerts();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].alert_id, alert.alert_id);
}

// --- Event-log consumer ---

#[tokio::test]
async fn event_log_envelope_is_stored() {
    let h = Harness::new();
    let consumer = EventLogConsumer::new(h.store.clone(), h.dispatcher.clone(), fast_options());

    let envelope = Envelope::new("location_update", "mqtt", serde_json::json!({"speed": 12.5}));
    let outcome = consumer.process(&envelope.encode().unwrap()).await;
    assert_eq!(outcome, EventLogOutcome::Stored(1));

    let entries = h.store.audit_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, Some(1));
    assert_eq!(entries[0].event_type, "location_update");
    assert_eq!(entries[0].timestamp, envelope.timestamp);
    assert_eq!(entries[0].payload, envelope.payload);
}

#[tokio::test]
async fn failed_audit_write_is_dead_lettered_with_raw_json() {
    let h = Harness::new();
    h.store.inject(Fault::AppendAudit);
    let consumer = EventLogConsumer::new(h.store.clone(), h.dispatcher.clone(), fast_options());

    let raw = Envelope::new("save_error", "LocationWorker", serde_json::json!("x"))
        .encode()
        .unwrap();
    assert_eq!(consumer.process(&raw).await, EventLogOutcome::DeadLettered);

    let dead = h.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].event_json.as_bytes(), raw.as_slice());
    assert!(dead[0].error_msg.contains("AppendAudit"));
    assert!(dead[0].failed_at > 0);
}

#[tokio::test]
async fn malformed_event_log_message_is_dead_lettered() {
    let h = Harness::new();
    let consumer = EventLogConsumer::new(h.store.clone(), h.dispatcher.clone(), fast_options());

    assert_eq!(consumer.process(b"{oops").await, EventLogOutcome::DeadLettered);
    assert_eq!(h.dead_letters()[0].event_json, "{oops");
    assert!(h.store.audit_entries().is_empty());
}

// --- Archiver and loops ---

#[tokio::test]
async fn dead_letter_round_trip_is_byte_identical() {
    let h = Harness::new();
    let names = QueueNames::default();
    let archiver = Arc::new(DeadLetterArchiver::new(h.queue.clone(), &names, fast_options()));

    let entry = DeadLetterEntry::new(r#"{"event_type":"geofence_entry"}"#, "db down");
    let raw = serde_json::to_vec(&entry).unwrap();
    h.queue.push(&names.dead_letter, &raw).await.unwrap();

    let token = CancellationToken::new();
    let handle = {
        let archiver = archiver.clone();
        let token = token.clone();
        tokio::spawn(async move { archiver.run(token).await })
    };

    wait_for(|| h.queue.len(&names.archive) == 1).await;
    token.cancel();
    handle.await.unwrap().unwrap();

    assert!(h.queue.is_empty(&names.dead_letter));
    assert_eq!(h.queue.drain(&names.archive), vec![raw]);
}

#[tokio::test]
async fn archive_push_failure_is_logged_and_loop_keeps_running() {
    let h = Harness::new();
    let names = QueueNames::default();
    h.queue.fail_pushes_to(&names.archive, "READONLY replica");
    let archiver = Arc::new(DeadLetterArchiver::new(h.queue.clone(), &names, fast_options()));

    assert!(!archiver.archive(b"{\"event_json\":\"{}\"}").await);
    assert!(h.queue.is_empty(&names.archive));

    // The second entry is only popped once the first failed push returned.
    h.queue.push(&names.dead_letter, b"first").await.unwrap();
    h.queue.push(&names.dead_letter, b"second").await.unwrap();
    let token = CancellationToken::new();
    let handle = {
        let archiver = archiver.clone();
        let token = token.clone();
        tokio::spawn(async move { archiver.run(token).await })
    };

    wait_for(|| h.queue.is_empty(&names.dead_letter)).await;
    token.cancel();
    handle.await.unwrap().unwrap();
    assert!(h.queue.is_empty(&names.archive));

    h.queue.restore_pushes_to(&names.archive);
    assert!(archiver.archive(b"third").await);
    assert_eq!(h.queue.drain(&names.archive), vec![b"third".to_vec()]);
}

#[tokio::test]
async fn location_loop_drains_queue_end_to_end() {
    let h = Harness::new();
    let consumer = Arc::new(h.location_consumer());
    let token = CancellationToken::new();

    let handle = {
        let consumer = consumer.clone();
        let token = token.clone();
        tokio::spawn(async move { consumer.run(token).await })
    };

    let sample = sample_north_of_center("B1234XYZ", 97.0);
    h.dispatcher
        .dispatch("location_update", "mqtt", &serde_json::to_vec(&sample).unwrap())
        .await
        .unwrap();

    wait_for(|| h.store.transitions().len() == 1).await;
    token.cancel();
    handle.await.unwrap().unwrap();

    assert!(h.queue.is_empty(LOCATION_QUEUE));
    assert!(h.tasks.shutdown(SHUTDOWN).await);
    assert_eq!(h.broker.alerts().len(), 1);
}

#[tokio::test]
async fn loops_stop_on_cancellation_even_when_pops_fail() {
    let h = Harness::new();
    h.queue.fail_pops(true);

    let consumer = Arc::new(EventLogConsumer::new(
        h.store.clone(),
        h.dispatcher.clone(),
        fast_options(),
    ));
    let token = CancellationToken::new();
    let handle = {
        let consumer = consumer.clone();
        let token = token.clone();
        tokio::spawn(async move { consumer.run(token).await })
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    token.cancel();

    let stopped = tokio::time::timeout(SHUTDOWN, handle).await;
    assert!(stopped.unwrap().unwrap().is_ok());
}
