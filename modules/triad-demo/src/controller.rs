//! The controller sits between the ledger and its views.
//!
//! Ledger events reach it through [`Relay`], which forwards them to every
//! view and acks once all of them have. Requests from views come back over a
//! channel and are applied to the ledger by [`Controller::handle`].

use std::borrow::Cow;

use anyhow::anyhow;
use serde_json::{json, Value};
use tracing::{info, warn};
use triad_events::{Ack, DispatchBus, NotifyBus, Participant, Processor};
use triad_state::{ControllerRequest, StateError, StateLedger, SyncStatus};

pub const EDIT_APPLIED: &str = "editApplied";
pub const EDIT_REJECTED: &str = "editRejected";
pub const SYNC_COMPLETED: &str = "syncCompleted";

/// Forwards every ledger event to the views bus.
pub struct Relay {
    views: DispatchBus,
}

impl Relay {
    pub fn new(views: DispatchBus) -> Self {
        Self { views }
    }
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
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            ack.fail(anyhow!("no runtime to relay {event}"));
            return false;
        };

        let views = self.views.clone();
        let event = event.to_string();
        let data = data.clone();
        runtime.spawn(async move {
            let outcome = match views.dispatch_and_wait(&event, &data, None).await {
                Ok(report) => report.into_result().map_err(anyhow::Error::from),
                Err(err) => Err(err.into()),
            };
            ack.send(outcome);
        });
        true
    }
}

/// Applies view requests to the ledger and tells the notifier about it.
pub struct Controller {
    ledger: StateLedger,
    notifier: NotifyBus,
}

impl Controller {
    pub fn new(ledger: StateLedger, notifier: NotifyBus) -> Self {
        Self { ledger, notifier }
    }

    pub fn ledger(&self) -> &StateLedger {
        &self.ledger
    }

    pub async fn handle(&mut self, request: ControllerRequest) -> Result<(), StateError> {
        match request {
            ControllerRequest::Edit { field, value } => self.edit(&field, value).await,
            ControllerRequest::Sync { action } => self.sync(action).await,
        }
    }

    async fn edit(&mut self, field: &str, value: Value) -> Result<(), StateError> {
        match self.ledger.edit(field, value.clone()).await {
            Ok(()) => {
                self.notifier
                    .notify(EDIT_APPLIED, &json!({ "what": field, "data": value }));
                Ok(())
            }
            Err(err) => {
                warn!(field, error = %err, "Edit failed");
                self.notifier
                    .notify(EDIT_REJECTED, &json!({ "what": field, "error": err.to_string() }));
                Err(err)
            }
        }
    }

    /// Pretend to push every field to a remote: each goes through Syncing to
    /// Synced, and field errors are cleared on the way.
    async fn sync(&mut self, action: Value) -> Result<(), StateError> {
        info!(%action, "Syncing to remote");
        let fields: Vec<String> = self.ledger.fields().names().map(str::to_string).collect();

        for field in &fields {
            self.ledger
                .update_field_sync(field, SyncStatus::Syncing)
                .await?;
        }
        for field in &fields {
            self.ledger.update_field_error(field, None).await?;
            self.ledger
                .update_field_sync(field, SyncStatus::Synced)
                .await?;
        }

        self.notifier.notify(
            SYNC_COMPLETED,
            &json!({ "action": action, "fields": fields }),
        );
        Ok(())
    }
}
