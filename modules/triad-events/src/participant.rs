//! Participant capabilities.
//!
//! A participant is anything registered on a bus. What it can do is
//! discovered per event through capability queries instead of by method
//! name: [`Participant::as_processor`] for acknowledging dispatch and
//! [`Participant::as_listener`] for fire-and-forget notification.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::dispatch::{Ack, DispatchBus};
use crate::notify::NotifyBus;

/// Anything that can be registered on a [`NotifyBus`] or [`DispatchBus`].
pub trait Participant: Send + Sync {
    /// Stable name used in diagnostics only.
    fn display_name(&self) -> Cow<'_, str> {
        Cow::Borrowed("<anonymous>")
    }

    /// The acknowledging handler, if this participant has one.
    fn as_processor(&self) -> Option<&dyn Processor> {
        None
    }

    /// The notification handlers, if this participant has any.
    fn as_listener(&self) -> Option<&dyn Listener> {
        None
    }
}

/// Single generic handler for acknowledged dispatch.
pub trait Processor: Send + Sync {
    /// Start handling `event`. Returns whether handling was accepted.
    ///
    /// `ack` must be consumed exactly once, now or later. Accepting does not
    /// imply the ack has already fired.
    fn process(&self, bus: &DispatchBus, event: &str, data: &Value, ack: Ack) -> bool;
}

/// Event handlers resolved by event name.
pub trait Listener: Send + Sync {
    fn handles(&self, event: &str) -> bool;

    fn on_notify(&self, notifier: &NotifyBus, event: &str, data: &Value);
}

type NotifyHandler = Box<dyn Fn(&NotifyBus, &Value) + Send + Sync>;

/// Explicit event name → handler table.
///
/// ```ignore
/// let table = HandlerTable::new()
///     .on("saved", |_bus, data| tracing::info!(%data, "saved"))
///     .on("closed", |_bus, _| tracing::info!("closed"));
/// ```
#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<String, NotifyHandler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `event`, replacing any previous one.
    pub fn on<F>(mut self, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&NotifyBus, &Value) + Send + Sync + 'static,
    {
        self.handlers.insert(event.into(), Box::new(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Listener for HandlerTable {
    fn handles(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    fn on_notify(&self, notifier: &NotifyBus, event: &str, data: &Value) {
        if let Some(handler) = self.handlers.get(event) {
            handler(notifier, data);
        }
    }
}

/// Identity of a registered participant.
///
/// Derived from the address of the shared allocation, so every `Arc` clone
/// (including ones coerced to `Arc<dyn Participant>`) yields the same key.
/// Only meaningful while the allocation is alive: once the last strong and
/// weak handle is gone the address may be reused by an unrelated
/// participant. Take a key per dispatch rather than storing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantKey(usize);

impl ParticipantKey {
    pub fn of<P: ?Sized>(participant: &Arc<P>) -> Self {
        Self(Arc::as_ptr(participant) as *const () as usize)
    }
}
