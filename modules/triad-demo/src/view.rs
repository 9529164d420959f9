use std::borrow::Cow;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use triad_state::{ControllerRequest, MirrorHost, StateRecord};

/// A headless view: "rendering" logs the record it was handed.
pub struct ConsoleView {
    name: String,
    renders: AtomicUsize,
    requests: UnboundedSender<ControllerRequest>,
}

impl ConsoleView {
    pub fn new(name: impl Into<String>, requests: UnboundedSender<ControllerRequest>) -> Self {
        Self {
            name: name.into(),
            renders: AtomicUsize::new(0),
            requests,
        }
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MirrorHost for ConsoleView {
    fn display_name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    /// Valid for as long as the controller is listening.
    fn is_valid(&self) -> bool {
        !self.requests.is_closed()
    }

    fn is_rendered(&self) -> bool {
        true
    }

    async fn schedule_render(&self, record: &StateRecord) -> Result<()> {
        let render = self.renders.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            view = %self.name,
            render,
            title = ?record.field("title"),
            sync = ?record.global_syncing,
            errors = record.global_error,
            "Rendered"
        );
        Ok(())
    }

    async fn dispatch_to_controller(&self, request: ControllerRequest) -> Result<()> {
        self.requests.send(request)?;
        Ok(())
    }
}
