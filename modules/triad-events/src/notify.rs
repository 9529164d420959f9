//! Fire-and-forget notification.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::{trace, warn};

use crate::error::RegistryError;
use crate::participant::Participant;
use crate::registry::Registry;

/// Fire-and-forget publish/subscribe.
///
/// A participant takes part in an event only if its listener handles that
/// event name; everyone else is skipped silently. Cloning shares the registry.
#[derive(Clone, Default)]
pub struct NotifyBus {
    registry: Arc<Mutex<Registry<dyn Participant>>>,
}

impl NotifyBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: Registry<dyn Participant>) -> Self {
        Self {
            registry: Arc::new(Mutex::new(registry)),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry<dyn Participant>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register<P: Participant + 'static>(
        &self,
        name: impl Into<String>,
        participant: Arc<P>,
    ) -> Result<(), RegistryError> {
        self.registry().register(name, participant as Arc<dyn Participant>)
    }

    pub fn register_dyn(
        &self,
        name: impl Into<String>,
        participant: Arc<dyn Participant>,
    ) -> Result<(), RegistryError> {
        self.registry().register(name, participant)
    }

    pub fn deregister<P: ?Sized>(&self, participant: &Arc<P>) -> Result<String, RegistryError> {
        self.registry().deregister(participant)
    }

    pub fn count(&self) -> usize {
        self.registry().count()
    }

    pub fn list(&self) -> Vec<(String, Arc<dyn Participant>)> {
        self.registry().list()
    }

    pub fn clear(&self) {
        self.registry().clear();
    }

    /// Deliver `event` synchronously to every participant that handles it.
    ///
    /// Visits a snapshot taken at call time: handlers may register or
    /// deregister participants without affecting this delivery.
    pub fn notify(&self, event: &str, data: &Value) {
        if event.is_empty() {
            warn!("Notify called without an event name");
            return;
        }

        let snapshot = self.registry().list();
        for (name, participant) in snapshot {
            let Some(listener) = participant.as_listener() else {
                continue;
            };
            if !listener.handles(event) {
                continue;
            }
            trace!(event, participant = %name, "Notifying");
            listener.on_notify(self, event, data);
        }
    }
}
