//! Ledger → controller → mirrors, wired over two dispatch buses.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use triad_events::{Ack, DispatchBus, Participant, Processor};
use triad_state::{
    ControllerRequest, FieldTable, MirrorHost, MirrorProcessor, StateError, StateLedger,
    StateMirror, StateRecord, SyncStatus, Validity,
};

// ---------------------------------------------------------------------------
// Controller relaying ledger events to the views bus
// ---------------------------------------------------------------------------

struct Relay {
    views: DispatchBus,
}

impl Participant for Relay {
    fn display_name(&self) -> Cow<'_, str> {
        Cow::Borrowed("controller")
    }

    fn as_processor(&self) -> Option<&dyn Processor> {
        Some(self)
    }
}

impl Processor for Relay {
    fn process(&self, _bus: &DispatchBus, event: &str, data: &Value, ack: Ack) -> bool {
        let views = self.views.clone();
        let event = event.to_string();
        let data = data.clone();
        tokio::spawn(async move {
            let outcome = match views.dispatch_and_wait(&event, &data, None).await {
                Ok(report) => report.into_result().map_err(anyhow::Error::from),
                Err(err) => Err(err.into()),
            };
            ack.send(outcome);
        });
        true
    }
}

// ---------------------------------------------------------------------------
// View host
// ---------------------------------------------------------------------------

struct View {
    rendered: AtomicBool,
    renders: AtomicUsize,
    requests: mpsc::UnboundedSender<ControllerRequest>,
}

#[async_trait]
impl MirrorHost for View {
    fn is_valid(&self) -> bool {
        !self.requests.is_closed()
    }

    fn is_rendered(&self) -> bool {
        self.rendered.load(Ordering::SeqCst)
    }

    async fn schedule_render(&self, _record: &StateRecord) -> Result<()> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn dispatch_to_controller(&self, request: ControllerRequest) -> Result<()> {
        self.requests.send(request)?;
        Ok(())
    }
}

struct Triad {
    ledger: StateLedger,
    views: Vec<Arc<MirrorProcessor<View>>>,
    requests: mpsc::UnboundedReceiver<ControllerRequest>,
}

fn triad(view_count: usize) -> Triad {
    let fields = FieldTable::with_fields(["title", "body"])
        .unwrap()
        .validate_with("title", |value| {
            Ok(if value == "X" {
                Validity::invalid("reserved title")
            } else {
                Validity::Valid
            })
        })
        .unwrap();

    let ledger_bus = DispatchBus::default();
    let views_bus = DispatchBus::default();
    ledger_bus
        .register("controller", Arc::new(Relay { views: views_bus.clone() }))
        .unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let views = (0..view_count)
        .map(|i| {
            let mut mirror = StateMirror::new(View {
                rendered: AtomicBool::new(true),
                renders: AtomicUsize::new(0),
                requests: tx.clone(),
            });
            mirror.initialize();
            let view = MirrorProcessor::new(format!("view-{i}"), mirror);
            views_bus.register(format!("view-{i}"), view.clone()).unwrap();
            view
        })
        .collect();

    let mut ledger = StateLedger::new("article", fields, ledger_bus);
    ledger.initialize();
    Triad {
        ledger,
        views,
        requests: rx,
    }
}

async fn mirrored(view: &MirrorProcessor<View>) -> StateRecord {
    view.mirror().lock().await.record().unwrap().clone()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn every_mirror_converges_on_the_ledger_record() {
    let mut triad = triad(2);

    triad.ledger.edit("title", json!("Hello")).await.unwrap();
    triad.ledger.edit("body", json!("World")).await.unwrap();
    triad
        .ledger
        .update_field_error("body", Some(json!("too short")))
        .await
        .unwrap();

    let expected = triad.ledger.record().unwrap().clone();
    for view in &triad.views {
        assert_eq!(mirrored(view).await, expected);
    }
    assert_eq!(expected.global_syncing, SyncStatus::NotSynced);
    assert_eq!(expected.global_error, 1);
}

#[tokio::test]
async fn invalid_edit_reaches_views_without_error() {
    let mut triad = triad(1);

    triad.ledger.edit("title", json!("X")).await.unwrap();

    let record = mirrored(&triad.views[0]).await;
    assert_eq!(record.field("title"), Some(&json!("X")));
    assert_eq!(record.validity["title"], Validity::invalid("reserved title"));
    assert_eq!(record.global_validity, Validity::invalid("reserved title"));
}

#[tokio::test]
async fn unchanged_edit_renders_nothing() {
    let mut triad = triad(1);
    triad.ledger.edit("title", json!("Hello")).await.unwrap();
    let renders = triad.views[0]
        .mirror()
        .lock()
        .await
        .host()
        .renders
        .load(Ordering::SeqCst);

    triad.ledger.edit("title", json!("Hello")).await.unwrap();

    let after = triad.views[0]
        .mirror()
        .lock()
        .await
        .host()
        .renders
        .load(Ordering::SeqCst);
    assert_eq!(after, renders);
}

#[tokio::test]
async fn unrendered_view_fails_the_edit_but_not_the_others() {
    let mut triad = triad(2);
    triad.views[1]
        .mirror()
        .lock()
        .await
        .host()
        .rendered
        .store(false, Ordering::SeqCst);

    let err = triad.ledger.edit("body", json!("text")).await.unwrap_err();

    let composite = match err {
        StateError::Composite(composite) => composite,
        other => panic!("expected composite error, got {other:?}"),
    };
    assert!(composite.get("update body").is_some());
    assert!(composite.get("mark not synced").is_some());
    assert_eq!(
        mirrored(&triad.views[0]).await.field("body"),
        Some(&json!("text"))
    );
    assert!(mirrored(&triad.views[1]).await.data.is_empty());
}

#[tokio::test]
async fn view_edit_request_round_trips_through_the_ledger() {
    let mut triad = triad(2);

    triad.views[0]
        .mirror()
        .lock()
        .await
        .request_edit("title", json!("From view"))
        .await
        .unwrap();

    let Some(ControllerRequest::Edit { field, value }) = triad.requests.recv().await else {
        panic!("expected an edit request");
    };
    triad.ledger.edit(&field, value).await.unwrap();

    for view in &triad.views {
        assert_eq!(
            mirrored(view).await.field("title"),
            Some(&json!("From view"))
        );
    }
}
