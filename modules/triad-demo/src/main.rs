mod config;
mod controller;
mod view;

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use triad_events::{
    DispatchBus, HandlerTable, Listener, NotifyBus, OnThrottled, Participant, ThrottleOutcome,
};
use triad_state::event::DATA_STATE_UPDATED;
use triad_state::{
    FieldTable, MirrorHost, MirrorProcessor, Slot, StateError, StateLedger, StateMirror, Validity,
};

use crate::config::DemoConfig;
use crate::controller::{Controller, Relay, EDIT_APPLIED, EDIT_REJECTED, SYNC_COMPLETED};
use crate::view::ConsoleView;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("triad=info".parse()?))
        .init();

    info!("Triad demo starting...");

    let config = DemoConfig::from_env()?;
    config.log();

    let notifier = NotifyBus::new();
    notifier.register("audit", Arc::new(Audit::new()))?;

    let ledger_bus = DispatchBus::new(config.bus.clone());
    let views_bus = DispatchBus::new(config.bus.clone());
    ledger_bus.register("controller", Arc::new(Relay::new(views_bus.clone())))?;

    let (requests_tx, mut requests) = mpsc::unbounded_channel();
    let mut views = Vec::with_capacity(config.views);
    for i in 0..config.views {
        let name = format!("view-{i}");
        let mut mirror = StateMirror::new(ConsoleView::new(&name, requests_tx.clone()));
        mirror.initialize();
        let view = MirrorProcessor::new(&name, mirror);
        views_bus.register(&name, view.clone())?;
        views.push(view);
    }

    let mut ledger = StateLedger::new("article", article_fields()?, ledger_bus);
    ledger.initialize();
    let mut controller = Controller::new(ledger, notifier);

    // Views take turns editing the title; the third edit empties it.
    let mut sent = 0;
    for i in 0..config.edits {
        let value = if i == 2 {
            json!("")
        } else {
            json!(format!("Draft {i}"))
        };
        views[i % views.len()]
            .mirror()
            .lock()
            .await
            .request_edit("title", value)
            .await?;
        sent += 1;
    }
    views[0].mirror().lock().await.request_sync(json!("save")).await?;
    sent += 1;

    for _ in 0..sent {
        let Some(request) = requests.recv().await else {
            break;
        };
        if let Err(err) = controller.handle(request).await {
            warn!(error = %err, "Request failed");
        }
    }

    let authoritative = controller.ledger().record()?.clone();
    for view in &views {
        let mirror = view.mirror().lock().await;
        let host = mirror.host();
        if mirror.record()? == &authoritative {
            info!(view = %host.display_name(), renders = host.renders(), "Mirror matches ledger");
        } else {
            warn!(view = %host.display_name(), "Mirror diverged from ledger");
        }
    }

    preview_keystrokes(&views_bus, "Hello").await?;

    println!("\n=== Ledger record ===");
    println!("{}", serde_json::to_string_pretty(&authoritative)?);

    views_bus.clear();
    Ok(())
}

fn article_fields() -> Result<FieldTable, StateError> {
    let fields = FieldTable::with_fields(["title", "body"])?
        .validate_with("title", |value| match value.as_str() {
            Some("") => Ok(Validity::invalid("title must not be empty")),
            Some(_) => Ok(Validity::Valid),
            None => Err(anyhow!("title must be a string, got {value}")),
        })?
        .on_updated("title", Slot::Data, |field, record| {
            debug!(field, value = ?record.field(field), "Title staged");
        })?
        .on_global_updated(Slot::Validity, |record| {
            info!(validity = ?record.global_validity, "Article validity changed");
        });
    Ok(fields)
}

/// Type into a shared preview field. Each keystroke supersedes the pending
/// delivery, so every view renders only the final text.
async fn preview_keystrokes(views: &DispatchBus, text: &str) -> Result<()> {
    let (tx, mut outcomes) = mpsc::unbounded_channel();
    let on_throttled: OnThrottled = Arc::new(move |participant, outcome| {
        let _ = tx.send((participant.display_name().into_owned(), outcome));
    });

    let mut keystrokes = 0;
    for (i, c) in text.char_indices() {
        let payload = json!({ "what": "preview", "data": &text[..i + c.len_utf8()] });
        views.dispatch_throttled(
            DATA_STATE_UPDATED,
            &payload,
            Some(on_throttled.clone()),
            None,
            None,
        )?;
        keystrokes += 1;
    }
    drop(on_throttled);

    let expected = keystrokes * views.count();
    let (mut cancelled, mut processed) = (0, 0);
    while cancelled + processed < expected {
        let Some((view, outcome)) = outcomes.recv().await else {
            break;
        };
        match outcome {
            ThrottleOutcome::Cancelled => cancelled += 1,
            ThrottleOutcome::Processed(Ok(())) => processed += 1,
            ThrottleOutcome::Processed(Err(err)) => {
                processed += 1;
                warn!(view = %view, error = %err, "Preview failed");
            }
        }
    }

    info!(keystrokes, cancelled, processed, "Preview settled");
    Ok(())
}

/// Logs controller notifications.
struct Audit {
    handlers: HandlerTable,
}

impl Audit {
    fn new() -> Self {
        Self {
            handlers: HandlerTable::new()
                .on(EDIT_APPLIED, |_, data| info!(%data, "Edit applied"))
                .on(EDIT_REJECTED, |_, data| warn!(%data, "Edit rejected"))
                .on(SYNC_COMPLETED, |_, data| info!(%data, "Sync completed")),
        }
    }
}

impl Participant for Audit {
    fn display_name(&self) -> Cow<'_, str> {
        Cow::Borrowed("audit")
    }

    fn as_listener(&self) -> Option<&dyn Listener> {
        Some(&self.handlers)
    }
}
