//! Recording participants for tests. No real handlers required.

use std::borrow::Cow;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::dispatch::{Ack, DispatchBus};
use crate::notify::NotifyBus;
use crate::participant::{Listener, Participant, Processor};

/// How a [`RecordingProcessor`] answers.
#[derive(Debug, Clone)]
pub enum AckMode {
    /// Ack synchronously, inside `process`.
    Immediate,
    /// Ack with an error carrying this message.
    Fail(String),
    /// Ack from a spawned task after yielding once.
    Deferred,
    /// Keep the ack forever.
    Hold,
    /// Return `false` from `process` but still ack successfully.
    Decline,
}

/// One event seen by a recording participant.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub event: String,
    pub data: Value,
}

/// Processor that records every delivery and acks according to its mode.
pub struct RecordingProcessor {
    name: String,
    mode: Mutex<AckMode>,
    deliveries: Mutex<Vec<Delivery>>,
    held: Mutex<Vec<Ack>>,
}

impl RecordingProcessor {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_mode(name, AckMode::Immediate)
    }

    pub fn with_mode(name: impl Into<String>, mode: AckMode) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            mode: Mutex::new(mode),
            deliveries: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
        })
    }

    pub fn set_mode(&self, mode: AckMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.deliveries().into_iter().map(|d| d.event).collect()
    }

    /// Release every held ack with success.
    pub fn release(&self) {
        let held: Vec<Ack> = self.held.lock().unwrap().drain(..).collect();
        for ack in held {
            ack.done();
        }
    }
}

impl Participant for RecordingProcessor {
    fn display_name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn as_processor(&self) -> Option<&dyn Processor> {
        Some(self)
    }
}

impl Processor for RecordingProcessor {
    fn process(&self, _bus: &DispatchBus, event: &str, data: &Value, ack: Ack) -> bool {
        self.deliveries.lock().unwrap().push(Delivery {
            event: event.to_string(),
            data: data.clone(),
        });

        let mode = self.mode.lock().unwrap().clone();
        match mode {
            AckMode::Immediate => {
                ack.done();
                true
            }
            AckMode::Fail(message) => {
                ack.fail(anyhow::anyhow!(message));
                true
            }
            AckMode::Deferred => {
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    ack.done();
                });
                true
            }
            AckMode::Hold => {
                self.held.lock().unwrap().push(ack);
                true
            }
            AckMode::Decline => {
                ack.done();
                false
            }
        }
    }
}

/// Listener that records the events it was configured to handle.
pub struct RecordingListener {
    handled: Vec<String>,
    deliveries: Mutex<Vec<Delivery>>,
}

impl RecordingListener {
    pub fn new<I, S>(handled: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            handled: handled.into_iter().map(Into::into).collect(),
            deliveries: Mutex::new(Vec::new()),
        })
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }
}

impl Participant for RecordingListener {
    fn as_listener(&self) -> Option<&dyn Listener> {
        Some(self)
    }
}

impl Listener for RecordingListener {
    fn handles(&self, event: &str) -> bool {
        self.handled.iter().any(|h| h == event)
    }

    fn on_notify(&self, _notifier: &NotifyBus, event: &str, data: &Value) {
        self.deliveries.lock().unwrap().push(Delivery {
            event: event.to_string(),
            data: data.clone(),
        });
    }
}

/// Participant with no capabilities at all.
pub struct Bystander;

impl Participant for Bystander {}
