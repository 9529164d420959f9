//! View-side shadow of a ledger's record.
//!
//! A [`StateMirror`] applies incoming [`StateEvent`]s to its own record and
//! asks its [`MirrorHost`] to re-render. Edits and sync requests travel the
//! other way, through the host, to whatever controller owns the ledger.

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use triad_events::{Ack, DispatchBus, Participant, Processor};

use crate::error::StateError;
use crate::event::StateEvent;
use crate::record::StateRecord;

pub const WANT_TO_EDIT: &str = "wantToEdit";
pub const WANT_TO_UPDATE_TO_REMOTE: &str = "wantToUpdateToRemote";

/// What a mirror needs from the view that embeds it.
#[async_trait]
pub trait MirrorHost: Send + Sync {
    fn display_name(&self) -> Cow<'_, str> {
        Cow::Borrowed("<host>")
    }

    /// False once the view has been torn down.
    fn is_valid(&self) -> bool;

    fn is_rendered(&self) -> bool;

    /// Re-render from `record`. Resolves when the render has completed.
    async fn schedule_render(&self, record: &StateRecord) -> anyhow::Result<()>;

    /// Forward `request` to the controller side and resolve with its answer.
    async fn dispatch_to_controller(&self, request: ControllerRequest) -> anyhow::Result<()>;
}

/// Requests a view sends back towards the ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerRequest {
    Edit { field: String, value: Value },
    Sync { action: Value },
}

impl ControllerRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ControllerRequest::Edit { .. } => WANT_TO_EDIT,
            ControllerRequest::Sync { .. } => WANT_TO_UPDATE_TO_REMOTE,
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            ControllerRequest::Edit { field, value } => json!({ "what": field, "data": value }),
            ControllerRequest::Sync { action } => action.clone(),
        }
    }
}

pub struct StateMirror<H> {
    host: H,
    record: Option<StateRecord>,
}

impl<H: MirrorHost> StateMirror<H> {
    pub fn new(host: H) -> Self {
        Self { host, record: None }
    }

    pub fn initialize(&mut self) {
        self.record = Some(StateRecord::new());
    }

    pub fn is_initialized(&self) -> bool {
        self.record.is_some()
    }

    pub fn record(&self) -> Result<&StateRecord, StateError> {
        self.record.as_ref().ok_or(StateError::Uninitialized)
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Apply one bus event to the shadow record, then wait for the host to
    /// re-render. Nothing is written if the event is rejected.
    pub async fn apply_event(&mut self, event: &str, payload: &Value) -> Result<(), StateError> {
        let record = self.record.as_mut().ok_or(StateError::Uninitialized)?;
        if !self.host.is_valid() {
            return Err(StateError::HostInvalid);
        }
        if !self.host.is_rendered() {
            return Err(StateError::HostNotRendered);
        }

        let parsed = StateEvent::parse(event, payload)?;
        debug!(host = %self.host.display_name(), event, field = ?parsed.field(), "Applying state event");
        parsed.apply_to(record);

        self.host
            .schedule_render(record)
            .await
            .map_err(StateError::Render)
    }

    pub async fn request_edit(&self, field: &str, value: Value) -> Result<(), StateError> {
        self.request(ControllerRequest::Edit {
            field: field.to_string(),
            value,
        })
        .await
    }

    pub async fn request_sync(&self, action: Value) -> Result<(), StateError> {
        self.request(ControllerRequest::Sync { action }).await
    }

    async fn request(&self, request: ControllerRequest) -> Result<(), StateError> {
        self.record()?;
        if !self.host.is_valid() {
            return Err(StateError::HostInvalid);
        }

        let name = request.name();
        self.host
            .dispatch_to_controller(request)
            .await
            .map_err(|error| StateError::Controller {
                request: name.to_string(),
                error,
            })
    }
}

/// Registers a shared [`StateMirror`] on a [`DispatchBus`].
///
/// Each delivery is applied on a spawned task; the ack fires once the host
/// has re-rendered, or with the error that stopped it.
pub struct MirrorProcessor<H> {
    name: String,
    mirror: Arc<Mutex<StateMirror<H>>>,
}

impl<H: MirrorHost + 'static> MirrorProcessor<H> {
    pub fn new(name: impl Into<String>, mirror: StateMirror<H>) -> Arc<Self> {
        Self::shared(name, Arc::new(Mutex::new(mirror)))
    }

    pub fn shared(name: impl Into<String>, mirror: Arc<Mutex<StateMirror<H>>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            mirror,
        })
    }

    pub fn mirror(&self) -> &Arc<Mutex<StateMirror<H>>> {
        &self.mirror
    }
}

impl<H: MirrorHost + 'static> Participant for MirrorProcessor<H> {
    fn display_name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn as_processor(&self) -> Option<&dyn Processor> {
        Some(self)
    }
}

impl<H: MirrorHost + 'static> Processor for MirrorProcessor<H> {
    fn process(&self, _bus: &DispatchBus, event: &str, data: &Value, ack: Ack) -> bool {
        let Ok(runtime) = Handle::try_current() else {
            warn!(mirror = %self.name, event, "No tokio runtime to apply event on");
            ack.fail(anyhow!("no tokio runtime to apply {event}"));
            return false;
        };

        let mirror = Arc::clone(&self.mirror);
        let event = event.to_string();
        let data = data.clone();
        runtime.spawn(async move {
            let result = mirror.lock().await.apply_event(&event, &data).await;
            ack.send(result.map_err(anyhow::Error::from));
        });
        true
    }
}
