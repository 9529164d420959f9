//! DispatchBus fan-out, acknowledgement and aggregation.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use triad_events::testing::{AckMode, Bystander, RecordingProcessor};
use triad_events::{
    Ack, BusError, DispatchBus, DispatchError, OnProcessed, Participant, ParticipantKey, Processor,
};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

type Outcomes = Arc<Mutex<Vec<(String, Result<(), String>)>>>;

fn collecting() -> (Outcomes, OnProcessed) {
    let outcomes: Outcomes = Arc::new(Mutex::new(Vec::new()));
    let callback: OnProcessed = {
        let outcomes = Arc::clone(&outcomes);
        Arc::new(move |participant, outcome| {
            outcomes.lock().unwrap().push((
                participant.display_name().into_owned(),
                outcome.map_err(|e| e.to_string()),
            ));
        })
    };
    (outcomes, callback)
}

/// Registers a new participant from inside `process`, then acks.
struct Recruiter {
    recruit: Arc<RecordingProcessor>,
}

impl Participant for Recruiter {
    fn as_processor(&self) -> Option<&dyn Processor> {
        Some(self)
    }
}

impl Processor for Recruiter {
    fn process(&self, bus: &DispatchBus, _event: &str, _data: &Value, ack: Ack) -> bool {
        let _ = bus.register("recruit", Arc::clone(&self.recruit));
        ack.done();
        true
    }
}

// =========================================================================
// Fan-out
// =========================================================================

#[test]
fn synchronous_ack_reports_before_dispatch_returns() {
    let bus = DispatchBus::default();
    let p = RecordingProcessor::new("P");
    bus.register("P", Arc::clone(&p)).unwrap();
    let (outcomes, on_processed) = collecting();

    let accepted = bus
        .dispatch("ping", &json!({"n": 1}), Some(on_processed), None)
        .unwrap();

    assert!(accepted);
    assert_eq!(*outcomes.lock().unwrap(), vec![("P".to_string(), Ok(()))]);
    assert_eq!(p.deliveries()[0].data, json!({"n": 1}));
}

#[test]
fn missing_event_name_dispatches_to_nobody() {
    let bus = DispatchBus::default();
    let p = RecordingProcessor::new("P");
    bus.register("P", Arc::clone(&p)).unwrap();
    let (outcomes, on_processed) = collecting();

    let err = bus
        .dispatch("", &json!({}), Some(on_processed), None)
        .unwrap_err();

    assert_eq!(err, BusError::MissingEventName);
    assert!(p.deliveries().is_empty());
    assert!(outcomes.lock().unwrap().is_empty());
}

#[test]
fn excluded_participant_is_reported_without_processing() {
    let bus = DispatchBus::default();
    let origin = RecordingProcessor::new("origin");
    let other = RecordingProcessor::new("other");
    bus.register("origin", Arc::clone(&origin)).unwrap();
    bus.register("other", Arc::clone(&other)).unwrap();
    let (outcomes, on_processed) = collecting();

    let accepted = bus
        .dispatch(
            "changed",
            &json!(1),
            Some(on_processed),
            Some(ParticipantKey::of(&origin)),
        )
        .unwrap();

    assert!(accepted);
    assert!(origin.deliveries().is_empty());
    assert_eq!(other.deliveries().len(), 1);
    assert_eq!(
        *outcomes.lock().unwrap(),
        vec![("origin".to_string(), Ok(())), ("other".to_string(), Ok(()))]
    );
}

#[test]
fn participant_without_processor_fails_alone() {
    let bus = DispatchBus::default();
    let worker = RecordingProcessor::new("worker");
    bus.register("idle", Arc::new(Bystander)).unwrap();
    bus.register("worker", Arc::clone(&worker)).unwrap();
    let (outcomes, on_processed) = collecting();

    let accepted = bus
        .dispatch("job", &json!({}), Some(on_processed), None)
        .unwrap();

    assert!(!accepted);
    assert_eq!(worker.deliveries().len(), 1);
    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].1.as_ref().unwrap_err().contains("no processor"));
    assert_eq!(outcomes[1].1, Ok(()));
}

#[test]
fn declined_processing_makes_dispatch_return_false() {
    let bus = DispatchBus::default();
    bus.register("yes", RecordingProcessor::new("yes")).unwrap();
    bus.register("no", RecordingProcessor::with_mode("no", AckMode::Decline))
        .unwrap();

    assert!(!bus.dispatch("job", &json!({}), None, None).unwrap());
}

#[test]
fn failed_ack_is_reported_per_participant() {
    let bus = DispatchBus::default();
    bus.register("bad", RecordingProcessor::with_mode("bad", AckMode::Fail("disk full".into())))
        .unwrap();
    bus.register("good", RecordingProcessor::new("good")).unwrap();
    let (outcomes, on_processed) = collecting();

    let accepted = bus
        .dispatch("save", &json!({}), Some(on_processed), None)
        .unwrap();

    // Accepted: the failure happened while processing, not at initiation.
    assert!(accepted);
    let outcomes = outcomes.lock().unwrap();
    assert!(outcomes[0].1.as_ref().unwrap_err().contains("disk full"));
    assert_eq!(outcomes[1], ("good".to_string(), Ok(())));
}

#[test]
fn held_ack_never_reports() {
    let bus = DispatchBus::default();
    let slow = RecordingProcessor::with_mode("slow", AckMode::Hold);
    bus.register("slow", Arc::clone(&slow)).unwrap();
    let (outcomes, on_processed) = collecting();

    assert!(bus
        .dispatch("job", &json!({}), Some(on_processed), None)
        .unwrap());
    assert!(outcomes.lock().unwrap().is_empty());

    slow.release();
    assert_eq!(outcomes.lock().unwrap().len(), 1);
}

#[test]
fn registration_during_dispatch_uses_start_snapshot() {
    let bus = DispatchBus::default();
    let recruit = RecordingProcessor::new("recruit");
    bus.register(
        "recruiter",
        Arc::new(Recruiter {
            recruit: Arc::clone(&recruit),
        }),
    )
    .unwrap();

    bus.dispatch("hire", &json!({}), None, None).unwrap();
    assert_eq!(bus.count(), 2);
    assert!(recruit.deliveries().is_empty());

    bus.dispatch("hire", &json!({}), None, None).unwrap();
    assert_eq!(recruit.events(), vec!["hire"]);
}

// =========================================================================
// Awaited fan-out
// =========================================================================

#[tokio::test]
async fn dispatch_and_wait_collects_deferred_acks() {
    let bus = DispatchBus::default();
    let a = RecordingProcessor::with_mode("a", AckMode::Deferred);
    let b = RecordingProcessor::with_mode("b", AckMode::Deferred);
    bus.register("a", Arc::clone(&a)).unwrap();
    bus.register("b", Arc::clone(&b)).unwrap();

    let report = bus
        .dispatch_and_wait("sync", &json!([1, 2]), None)
        .await
        .unwrap();

    assert_eq!(report.visited, 2);
    assert_eq!(report.acknowledged, 2);
    assert!(report.is_success());
}

#[tokio::test]
async fn dispatch_and_wait_aggregates_failures() {
    let bus = DispatchBus::default();
    bus.register("idle", Arc::new(Bystander)).unwrap();
    bus.register("bad", RecordingProcessor::with_mode("bad", AckMode::Fail("nope".into())))
        .unwrap();
    bus.register("good", RecordingProcessor::with_mode("good", AckMode::Deferred))
        .unwrap();

    let failures = bus
        .dispatch_and_wait("sync", &json!({}), None)
        .await
        .unwrap()
        .into_result()
        .unwrap_err();

    assert_eq!(failures.event, "sync");
    assert_eq!(failures.failures.len(), 2);
    assert!(matches!(
        failures.failures[0],
        DispatchError::MissingHandler { .. }
    ));
    assert_eq!(failures.failures[1].participant(), "bad");
}

#[tokio::test]
async fn dispatch_and_wait_on_empty_bus_returns_immediately() {
    let bus = DispatchBus::default();
    let report = bus.dispatch_and_wait("sync", &json!({}), None).await.unwrap();
    assert_eq!(report.visited, 0);
    assert!(report.is_success());
}
