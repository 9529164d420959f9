//! Throttled dispatch: at most one pending delivery per (participant, event).
//!
//! Each pending delivery is a spawned timer task plus a cancellation
//! callback. Rescheduling the same key aborts the old task and fires its
//! callback before the replacement is stored. A timer that wakes up after
//! being superseded finds a different token in the table and does nothing.

use std::collections::HashMap;
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::dispatch::{Ack, DispatchBus};
use crate::error::BusError;
use crate::participant::{Participant, ParticipantKey};
use crate::types::{OnThrottled, ThrottleOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ThrottleKey {
    participant: ParticipantKey,
    event: String,
}

pub(crate) struct PendingThrottle {
    token: u64,
    task: JoinHandle<()>,
    on_cancel: Box<dyn FnOnce() + Send>,
}

impl PendingThrottle {
    fn cancel(self) {
        self.task.abort();
        (self.on_cancel)();
    }
}

#[derive(Default)]
pub(crate) struct ThrottleTable {
    pending: HashMap<ThrottleKey, PendingThrottle>,
    next_token: u64,
}

impl ThrottleTable {
    fn next_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    /// Remove the entry for `key` if it still carries `token`.
    fn claim(&mut self, key: &ThrottleKey, token: u64) -> bool {
        match self.pending.get(key) {
            Some(pending) if pending.token == token => {
                self.pending.remove(key);
                true
            }
            _ => false,
        }
    }
}

impl DispatchBus {
    fn throttles(&self) -> MutexGuard<'_, ThrottleTable> {
        self.inner
            .throttles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of throttled deliveries waiting for their timer.
    pub fn pending_throttles(&self) -> usize {
        self.throttles().pending.len()
    }

    pub(crate) fn cancel_all_throttles(&self) {
        let drained: Vec<PendingThrottle> = self.throttles().pending.drain().map(|(_, p)| p).collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Cancelling pending throttles");
        }
        for pending in drained {
            pending.cancel();
        }
    }

    pub(crate) fn schedule_throttled(
        &self,
        event: &str,
        data: &Value,
        on_throttled: Option<OnThrottled>,
        delay: Duration,
        exclude: Option<ParticipantKey>,
    ) -> Result<bool, BusError> {
        let runtime = Handle::try_current().map_err(|_| BusError::NoRuntime {
            event: event.to_string(),
        })?;
        let on_throttled: OnThrottled = on_throttled.unwrap_or_else(|| Arc::new(|_, _| {}));

        let snapshot = self.list();
        debug!(
            event,
            participants = snapshot.len(),
            delay_ms = delay.as_millis() as u64,
            "Scheduling throttled dispatch"
        );

        for (name, participant) in snapshot {
            let participant_key = ParticipantKey::of(&participant);
            if exclude == Some(participant_key) {
                on_throttled(&participant, ThrottleOutcome::Processed(Ok(())));
                continue;
            }

            let key = ThrottleKey {
                participant: participant_key,
                event: event.to_string(),
            };

            // Cancel first so the superseded delivery is reported before the
            // replacement exists.
            let superseded = self.throttles().pending.remove(&key);
            if let Some(superseded) = superseded {
                trace!(event, participant = %name, "Cancelling superseded throttle");
                superseded.cancel();
            }

            let token = self.throttles().next_token();
            let task = runtime.spawn({
                let bus = self.clone();
                let key = key.clone();
                let participant = Arc::clone(&participant);
                let name = name.clone();
                let data = data.clone();
                let on_throttled = Arc::clone(&on_throttled);
                async move {
                    tokio::time::sleep(delay).await;
                    bus.fire_throttled(&key, token, participant, name, &data, on_throttled);
                }
            });
            let on_cancel: Box<dyn FnOnce() + Send> = {
                let participant = Arc::clone(&participant);
                let on_throttled = Arc::clone(&on_throttled);
                Box::new(move || on_throttled(&participant, ThrottleOutcome::Cancelled))
            };

            let raced = self.throttles().pending.insert(
                key,
                PendingThrottle {
                    token,
                    task,
                    on_cancel,
                },
            );
            if let Some(raced) = raced {
                raced.cancel();
            }
        }
        Ok(true)
    }

    fn fire_throttled(
        &self,
        key: &ThrottleKey,
        token: u64,
        participant: Arc<dyn Participant>,
        name: String,
        data: &Value,
        on_throttled: OnThrottled,
    ) {
        if !self.throttles().claim(key, token) {
            trace!(event = %key.event, participant = %name, "Throttle superseded before firing");
            return;
        }

        debug!(event = %key.event, participant = %name, "Throttle fired");
        let ack = Ack::new(
            Arc::clone(&participant),
            name,
            &key.event,
            Box::new(move |p, outcome| on_throttled(p, ThrottleOutcome::Processed(outcome))),
        );
        self.deliver(&participant, &key.event, data, ack);
    }
}
