//! Acknowledged fan-out.
//!
//! Every registered participant (minus an optional excluded one) gets the
//! event through its [`Processor`](crate::Processor) and answers through an
//! [`Ack`]. Callers observe completion per participant via a processed
//! callback, or await the whole fan-out with [`DispatchBus::dispatch_and_wait`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::BusConfig;
use crate::error::{BusError, DispatchError, RegistryError};
use crate::participant::{Participant, ParticipantKey};
use crate::registry::Registry;
use crate::throttle::ThrottleTable;
use crate::types::{DispatchReport, OnProcessed, OnThrottled};

type Report = Box<dyn FnOnce(&Arc<dyn Participant>, Result<(), DispatchError>) + Send>;

// ---------------------------------------------------------------------------
// Ack
// ---------------------------------------------------------------------------

/// One participant's acknowledgement of one event.
///
/// Consumed by value, so it can fire at most once. Dropping it unfired logs
/// a warning and reports nothing.
pub struct Ack {
    participant: Arc<dyn Participant>,
    name: String,
    event: String,
    report: Option<Report>,
}

impl Ack {
    pub(crate) fn new(
        participant: Arc<dyn Participant>,
        name: String,
        event: &str,
        report: Report,
    ) -> Self {
        Self {
            participant,
            name,
            event: event.to_string(),
            report: Some(report),
        }
    }

    /// Registered name of the acknowledging participant.
    pub fn participant_name(&self) -> &str {
        &self.name
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// Handled successfully.
    pub fn done(self) {
        self.send(Ok(()));
    }

    /// Handling failed.
    pub fn fail(self, error: impl Into<anyhow::Error>) {
        self.send(Err(error.into()));
    }

    pub fn send(self, result: anyhow::Result<()>) {
        let outcome = result.map_err(|error| DispatchError::Failed {
            participant: self.name.clone(),
            event: self.event.clone(),
            error,
        });
        self.resolve(outcome);
    }

    fn missing_handler(self) {
        let outcome = Err(DispatchError::MissingHandler {
            participant: self.name.clone(),
            event: self.event.clone(),
        });
        self.resolve(outcome);
    }

    fn resolve(mut self, outcome: Result<(), DispatchError>) {
        if let Err(err) = &outcome {
            warn!(
                event = %self.event,
                participant = %self.name,
                display_name = %self.participant.display_name(),
                error = %err,
                "Participant failed to process event"
            );
        }
        if let Some(report) = self.report.take() {
            report(&self.participant, outcome);
        }
    }
}

impl Drop for Ack {
    fn drop(&mut self) {
        if self.report.is_some() {
            warn!(
                event = %self.event,
                participant = %self.name,
                "Ack dropped without acknowledging; processed callback will never fire"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// DispatchBus
// ---------------------------------------------------------------------------

pub(crate) struct BusInner {
    registry: Mutex<Registry<dyn Participant>>,
    pub(crate) throttles: Mutex<ThrottleTable>,
    pub(crate) config: BusConfig,
}

/// Acknowledging publish/subscribe. Cloning shares registry and throttles.
#[derive(Clone)]
pub struct DispatchBus {
    pub(crate) inner: Arc<BusInner>,
}

impl Default for DispatchBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl DispatchBus {
    pub fn new(config: BusConfig) -> Self {
        Self::with_registry(Registry::new(), config)
    }

    pub fn with_registry(registry: Registry<dyn Participant>, config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                registry: Mutex::new(registry),
                throttles: Mutex::new(ThrottleTable::default()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    fn registry(&self) -> MutexGuard<'_, Registry<dyn Participant>> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
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

    pub fn name_of<P: ?Sized>(&self, participant: &Arc<P>) -> Option<String> {
        self.registry().name_of(participant).map(str::to_string)
    }

    /// Teardown: drop every registration and cancel every pending throttle.
    /// Cancelled throttles report [`ThrottleOutcome::Cancelled`](crate::ThrottleOutcome).
    pub fn clear(&self) {
        self.registry().clear();
        self.cancel_all_throttles();
    }

    /// Fan `event` out to every registered participant except `exclude`.
    ///
    /// `on_processed` fires once per participant as its ack arrives; for the
    /// excluded participant it fires immediately with success. Returns
    /// whether every participant accepted the event. Participants without a
    /// processor are reported as failures, not skipped.
    pub fn dispatch(
        &self,
        event: &str,
        data: &Value,
        on_processed: Option<OnProcessed>,
        exclude: Option<ParticipantKey>,
    ) -> Result<bool, BusError> {
        require_event_name(event)?;
        let snapshot = self.registry().list();
        Ok(self.fan_out(event, data, snapshot, on_processed, exclude))
    }

    /// Fan out and wait until every participant has acknowledged.
    ///
    /// A participant that holds its ack forever keeps this future pending.
    /// One that drops its ack unfired is counted as visited but not
    /// acknowledged.
    pub async fn dispatch_and_wait(
        &self,
        event: &str,
        data: &Value,
        exclude: Option<ParticipantKey>,
    ) -> Result<DispatchReport, BusError> {
        require_event_name(event)?;
        let snapshot = self.registry().list();
        let visited = snapshot.len();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let on_processed: OnProcessed = Arc::new(move |_participant, outcome| {
            let _ = tx.send(outcome);
        });
        self.fan_out(event, data, snapshot, Some(on_processed), exclude);

        let mut report = DispatchReport {
            event: event.to_string(),
            visited,
            acknowledged: 0,
            failures: Vec::new(),
        };
        while report.acknowledged < visited {
            let Some(outcome) = rx.recv().await else {
                warn!(
                    event,
                    missing = visited - report.acknowledged,
                    "Acks dropped before every participant acknowledged"
                );
                break;
            };
            report.acknowledged += 1;
            if let Err(err) = outcome {
                report.failures.push(err);
            }
        }
        Ok(report)
    }

    /// Like [`dispatch`](Self::dispatch), but each participant's delivery
    /// is delayed by `delay` (configured default when `None`) and collapsed
    /// with any still-pending delivery of the same event to that participant.
    ///
    /// The superseded delivery reports `Cancelled` before the new one is
    /// scheduled. Returns whether every delivery was scheduled.
    pub fn dispatch_throttled(
        &self,
        event: &str,
        data: &Value,
        on_throttled: Option<OnThrottled>,
        delay: Option<Duration>,
        exclude: Option<ParticipantKey>,
    ) -> Result<bool, BusError> {
        require_event_name(event)?;
        let delay = delay.unwrap_or(self.inner.config.throttle_delay);
        self.schedule_throttled(event, data, on_throttled, delay, exclude)
    }

    pub(crate) fn fan_out(
        &self,
        event: &str,
        data: &Value,
        snapshot: Vec<(String, Arc<dyn Participant>)>,
        on_processed: Option<OnProcessed>,
        exclude: Option<ParticipantKey>,
    ) -> bool {
        debug!(event, participants = snapshot.len(), "Dispatching event");

        let mut accepted = true;
        for (name, participant) in snapshot {
            if exclude == Some(ParticipantKey::of(&participant)) {
                if let Some(on_processed) = &on_processed {
                    on_processed(&participant, Ok(()));
                }
                continue;
            }

            let report: Report = match on_processed.clone() {
                Some(on_processed) => Box::new(move |p, outcome| on_processed(p, outcome)),
                None => Box::new(|_, _| {}),
            };
            let ack = Ack::new(Arc::clone(&participant), name, event, report);
            accepted &= self.deliver(&participant, event, data, ack);
        }
        accepted
    }

    /// Hand one event to one participant. A participant without a processor
    /// is acknowledged with [`DispatchError::MissingHandler`].
    pub(crate) fn deliver(
        &self,
        participant: &Arc<dyn Participant>,
        event: &str,
        data: &Value,
        ack: Ack,
    ) -> bool {
        match participant.as_processor() {
            Some(processor) => processor.process(self, event, data, ack),
            None => {
                ack.missing_handler();
                false
            }
        }
    }
}

fn require_event_name(event: &str) -> Result<(), BusError> {
    if event.is_empty() {
        warn!("Dispatch called without an event name");
        return Err(BusError::MissingEventName);
    }
    Ok(())
}
