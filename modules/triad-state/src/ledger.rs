//! The authoritative state of a model.
//!
//! Each update is staged synchronously (compare, write, run hook) and then
//! announced through the bus. Staging never awaits, so a record is never
//! left half-written; announcing only reads the event it was handed, which
//! lets `edit` announce several changes concurrently.

use std::sync::{Arc, Weak};

use futures::future::join;
use serde_json::Value;
use tracing::{debug, info, trace};
use triad_events::{DispatchBus, Participant, ParticipantKey};

use crate::error::{CompositeError, StateError};
use crate::event::StateEvent;
use crate::fields::{FieldTable, Slot};
use crate::record::{error_from_wire, StateRecord};
use crate::status::{SyncStatus, Validity};

pub struct StateLedger {
    name: String,
    fields: FieldTable,
    bus: DispatchBus,
    record: Option<StateRecord>,
    origin: Option<Weak<dyn Participant>>,
}

impl StateLedger {
    pub fn new(name: impl Into<String>, fields: FieldTable, bus: DispatchBus) -> Self {
        Self {
            name: name.into(),
            fields,
            bus,
            record: None,
            origin: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bus(&self) -> &DispatchBus {
        &self.bus
    }

    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    /// Reset to the zero record. Required before any update.
    pub fn initialize(&mut self) {
        if self.record.is_some() {
            debug!(ledger = %self.name, "Re-initializing state record");
        }
        self.record = Some(StateRecord::new());
    }

    pub fn is_initialized(&self) -> bool {
        self.record.is_some()
    }

    pub fn record(&self) -> Result<&StateRecord, StateError> {
        self.record.as_ref().ok_or(StateError::Uninitialized)
    }

    /// Leave `origin` out of every subsequent fan-out, typically the
    /// controller whose request is being applied.
    ///
    /// Only a weak handle is kept. Once the participant is dropped nobody is
    /// excluded, and the held allocation keeps its address from being reused
    /// by a later participant.
    pub fn set_origin<P: Participant + 'static>(&mut self, origin: &Arc<P>) {
        let origin: Arc<dyn Participant> = origin.clone();
        self.origin = Some(Arc::downgrade(&origin));
    }

    /// Restore full fan-out.
    pub fn clear_origin(&mut self) {
        self.origin = None;
    }

    fn origin_key(&self) -> Option<ParticipantKey> {
        let origin = self.origin.as_ref()?.upgrade()?;
        Some(ParticipantKey::of(&origin))
    }

    // -----------------------------------------------------------------------
    // Updates
    // -----------------------------------------------------------------------

    /// Store `value` in `field` and announce it. `Ok(false)` when the value
    /// equals the stored one under the field's comparator.
    pub async fn update_field(&mut self, field: &str, value: Value) -> Result<bool, StateError> {
        let Some(event) = self.stage_field(field, value)? else {
            return Ok(false);
        };
        self.announce(event).await?;
        Ok(true)
    }

    /// Set one field's sync status; the global status follows the
    /// least-synced field.
    pub async fn update_field_sync(
        &mut self,
        field: &str,
        status: SyncStatus,
    ) -> Result<bool, StateError> {
        let events = self.stage_field_sync(field, status)?;
        self.announce_all(events).await
    }

    pub async fn update_global_sync(&mut self, status: SyncStatus) -> Result<bool, StateError> {
        let events = self.stage_global_sync(status)?.into_iter().collect();
        self.announce_all(events).await
    }

    pub async fn update_global_error(&mut self, count: i64) -> Result<bool, StateError> {
        let events = self.stage_global_error(count)?.into_iter().collect();
        self.announce_all(events).await
    }

    /// Set or clear (`None`) one field's error. `Some(false)` and
    /// `Some(null)` clear it too. The global error count is recomputed and
    /// announced only if it changed.
    pub async fn update_field_error(
        &mut self,
        field: &str,
        error: Option<Value>,
    ) -> Result<bool, StateError> {
        let events = self.stage_field_error(field, error)?;
        self.announce_all(events).await
    }

    /// Set one field's validity. Global validity follows the most severe
    /// field verdict.
    pub async fn update_field_validity(
        &mut self,
        field: &str,
        validity: Validity,
    ) -> Result<bool, StateError> {
        let events = self.stage_field_validity(field, validity)?;
        self.announce_all(events).await
    }

    /// Apply a user edit.
    ///
    /// Unchanged values succeed immediately without validating or announcing.
    /// Otherwise the value is announced, then two tasks run concurrently:
    /// marking the record not synced and revalidating the field. Every
    /// failure, including the value's own announcement, is collected into
    /// one [`CompositeError`].
    pub async fn edit(&mut self, field: &str, value: Value) -> Result<(), StateError> {
        let Some(data_event) = self.stage_field(field, value)? else {
            trace!(ledger = %self.name, field, "Edit left value unchanged");
            return Ok(());
        };
        let verdict = match &data_event {
            StateEvent::Data { value, .. } => self.fields.rules(field)?.validate(value),
            _ => None,
        };
        let origin = self.origin_key();

        let mut failures = CompositeError::new();
        failures.record(format!("update {field}"), self.announce(data_event).await);

        let unsynced = self.stage_global_sync(SyncStatus::NotSynced)?;
        let revalidated = match verdict {
            None => Ok(Vec::new()),
            Some(Ok(validity)) => self.stage_field_validity(field, validity),
            Some(Err(error)) => Err(StateError::Validator {
                field: field.to_string(),
                error,
            }),
        };

        let mark_unsynced =
            announce_events(self.bus.clone(), origin, unsynced.into_iter().collect());
        let validate = {
            let bus = self.bus.clone();
            async move { announce_events(bus, origin, revalidated?).await }
        };
        let (synced, validated) = join(mark_unsynced, validate).await;

        failures.record("mark not synced", synced);
        failures.record(format!("validate {field}"), validated);

        if !failures.is_empty() {
            info!(
                ledger = %self.name,
                field,
                failures = failures.len(),
                "Edit completed with failures"
            );
        }
        failures.into_result()
    }

    // -----------------------------------------------------------------------
    // Staging
    // -----------------------------------------------------------------------

    fn stage_field(&mut self, field: &str, value: Value) -> Result<Option<StateEvent>, StateError> {
        let rules = self.fields.rules(field)?;
        let record = self.record.as_mut().ok_or(StateError::Uninitialized)?;

        if let Some(stored) = record.data.get(field) {
            if rules.same(stored, &value) {
                trace!(field, "Field unchanged");
                return Ok(None);
            }
        }

        record.data.insert(field.to_string(), value.clone());
        rules.after_update(Slot::Data, field, record);
        Ok(Some(StateEvent::Data {
            field: field.to_string(),
            value,
        }))
    }

    fn stage_field_sync(
        &mut self,
        field: &str,
        status: SyncStatus,
    ) -> Result<Vec<StateEvent>, StateError> {
        let rules = self.fields.rules(field)?;
        let record = self.record.as_mut().ok_or(StateError::Uninitialized)?;

        if record.syncing.get(field) == Some(&status) {
            return Ok(Vec::new());
        }
        record.syncing.insert(field.to_string(), status);
        rules.after_update(Slot::Sync, field, record);

        let mut events = vec![StateEvent::FieldSync {
            field: field.to_string(),
            status,
        }];
        let global = record.least_synced_field();
        events.extend(self.stage_global_sync(global)?);
        Ok(events)
    }

    fn stage_global_sync(&mut self, status: SyncStatus) -> Result<Option<StateEvent>, StateError> {
        let record = self.record.as_mut().ok_or(StateError::Uninitialized)?;
        if record.global_syncing == status {
            return Ok(None);
        }
        record.global_syncing = status;
        self.fields.after_global_update(Slot::Sync, record);
        Ok(Some(StateEvent::GlobalSync(status)))
    }

    fn stage_field_error(
        &mut self,
        field: &str,
        error: Option<Value>,
    ) -> Result<Vec<StateEvent>, StateError> {
        let error = error.as_ref().and_then(error_from_wire);
        let rules = self.fields.rules(field)?;
        let record = self.record.as_mut().ok_or(StateError::Uninitialized)?;

        if record.error.get(field) == Some(&error) {
            return Ok(Vec::new());
        }
        record.error.insert(field.to_string(), error.clone());
        rules.after_update(Slot::Error, field, record);

        let mut events = vec![StateEvent::FieldError {
            field: field.to_string(),
            error,
        }];
        let count = record.error_count();
        events.extend(self.stage_global_error(count)?);
        Ok(events)
    }

    fn stage_global_error(&mut self, count: i64) -> Result<Option<StateEvent>, StateError> {
        let record = self.record.as_mut().ok_or(StateError::Uninitialized)?;
        if record.global_error == count {
            return Ok(None);
        }
        record.global_error = count;
        self.fields.after_global_update(Slot::Error, record);
        Ok(Some(StateEvent::GlobalError(count)))
    }

    fn stage_field_validity(
        &mut self,
        field: &str,
        validity: Validity,
    ) -> Result<Vec<StateEvent>, StateError> {
        let rules = self.fields.rules(field)?;
        let record = self.record.as_mut().ok_or(StateError::Uninitialized)?;

        if record.validity.get(field) == Some(&validity) {
            return Ok(Vec::new());
        }
        record.validity.insert(field.to_string(), validity.clone());
        rules.after_update(Slot::Validity, field, record);

        let mut events = vec![StateEvent::FieldValidity {
            field: field.to_string(),
            validity,
        }];

        let global = record.most_severe_validity();
        if record.global_validity != global {
            record.global_validity = global.clone();
            self.fields.after_global_update(Slot::Validity, record);
            events.push(StateEvent::GlobalValidity(global));
        }
        Ok(events)
    }

    // -----------------------------------------------------------------------
    // Announcing
    // -----------------------------------------------------------------------

    async fn announce(&self, event: StateEvent) -> Result<(), StateError> {
        announce_events(self.bus.clone(), self.origin_key(), vec![event])
            .await
            .map(|_| ())
    }

    async fn announce_all(&self, events: Vec<StateEvent>) -> Result<bool, StateError> {
        announce_events(self.bus.clone(), self.origin_key(), events).await
    }
}

/// Announce `events` in order. Returns whether there was anything to
/// announce; the first failing fan-out stops the sequence.
async fn announce_events(
    bus: DispatchBus,
    origin: Option<ParticipantKey>,
    events: Vec<StateEvent>,
) -> Result<bool, StateError> {
    let announced = !events.is_empty();
    for event in events {
        debug!(event = event.name(), field = ?event.field(), "Announcing state change");
        bus.dispatch_and_wait(event.name(), &event.payload(), origin)
            .await?
            .into_result()?;
    }
    Ok(announced)
}
