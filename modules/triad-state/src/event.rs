//! State events and their wire shapes.
//!
//! Field-scoped events carry `{"what": <field>, "data": <value>}`.
//! Global events carry the raw value with no envelope.

use serde_json::{json, Value};

use crate::error::StateError;
use crate::record::{error_from_wire, error_to_wire, StateRecord};
use crate::status::{SyncStatus, Validity};

pub const DATA_STATE_UPDATED: &str = "dataStateUpdated";
pub const SYNC_STATE_UPDATED: &str = "syncStateUpdated";
pub const ERROR_STATE_UPDATED: &str = "errorStateUpdated";
pub const VALIDITY_STATE_UPDATED: &str = "validityStateUpdated";
pub const GLOBAL_SYNC_STATE_UPDATED: &str = "globalSyncStateUpdated";
pub const GLOBAL_ERROR_STATE_UPDATED: &str = "globalErrorStateUpdated";
pub const GLOBAL_VALIDITY_STATE_UPDATED: &str = "globalValidityStateUpdated";

static NULL: Value = Value::Null;

#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    Data { field: String, value: Value },
    FieldSync { field: String, status: SyncStatus },
    FieldError { field: String, error: Option<Value> },
    FieldValidity { field: String, validity: Validity },
    GlobalSync(SyncStatus),
    GlobalError(i64),
    GlobalValidity(Validity),
}

impl StateEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StateEvent::Data { .. } => DATA_STATE_UPDATED,
            StateEvent::FieldSync { .. } => SYNC_STATE_UPDATED,
            StateEvent::FieldError { .. } => ERROR_STATE_UPDATED,
            StateEvent::FieldValidity { .. } => VALIDITY_STATE_UPDATED,
            StateEvent::GlobalSync(_) => GLOBAL_SYNC_STATE_UPDATED,
            StateEvent::GlobalError(_) => GLOBAL_ERROR_STATE_UPDATED,
            StateEvent::GlobalValidity(_) => GLOBAL_VALIDITY_STATE_UPDATED,
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            StateEvent::Data { field, .. }
            | StateEvent::FieldSync { field, .. }
            | StateEvent::FieldError { field, .. }
            | StateEvent::FieldValidity { field, .. } => Some(field),
            _ => None,
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            StateEvent::Data { field, value } => json!({ "what": field, "data": value }),
            StateEvent::FieldSync { field, status } => json!({ "what": field, "data": status }),
            StateEvent::FieldError { field, error } => {
                json!({ "what": field, "data": error_to_wire(error) })
            }
            StateEvent::FieldValidity { field, validity } => {
                json!({ "what": field, "data": validity })
            }
            StateEvent::GlobalSync(status) => json!(status),
            StateEvent::GlobalError(count) => json!(count),
            StateEvent::GlobalValidity(validity) => json!(validity),
        }
    }

    /// Decode an event received over a bus.
    pub fn parse(event: &str, payload: &Value) -> Result<Self, StateError> {
        match event {
            DATA_STATE_UPDATED => {
                let (field, data) = envelope(event, payload)?;
                Ok(StateEvent::Data {
                    field,
                    value: data.clone(),
                })
            }
            SYNC_STATE_UPDATED => {
                let (field, data) = envelope(event, payload)?;
                Ok(StateEvent::FieldSync {
                    field,
                    status: decode(event, data)?,
                })
            }
            ERROR_STATE_UPDATED => {
                let (field, data) = envelope(event, payload)?;
                Ok(StateEvent::FieldError {
                    field,
                    error: error_from_wire(data),
                })
            }
            VALIDITY_STATE_UPDATED => {
                let (field, data) = envelope(event, payload)?;
                Ok(StateEvent::FieldValidity {
                    field,
                    validity: decode(event, data)?,
                })
            }
            GLOBAL_SYNC_STATE_UPDATED => Ok(StateEvent::GlobalSync(decode(event, payload)?)),
            GLOBAL_ERROR_STATE_UPDATED => Ok(StateEvent::GlobalError(decode(event, payload)?)),
            GLOBAL_VALIDITY_STATE_UPDATED => {
                Ok(StateEvent::GlobalValidity(decode(event, payload)?))
            }
            other => Err(StateError::UnknownEvent(other.to_string())),
        }
    }

    /// Write this event into `record`, slot by slot. Global slots are
    /// overwritten as received; nothing is recomputed.
    pub fn apply_to(self, record: &mut StateRecord) {
        match self {
            StateEvent::Data { field, value } => {
                record.data.insert(field, value);
            }
            StateEvent::FieldSync { field, status } => {
                record.syncing.insert(field, status);
            }
            StateEvent::FieldError { field, error } => {
                record.error.insert(field, error);
            }
            StateEvent::FieldValidity { field, validity } => {
                record.validity.insert(field, validity);
            }
            StateEvent::GlobalSync(status) => record.global_syncing = status,
            StateEvent::GlobalError(count) => record.global_error = count,
            StateEvent::GlobalValidity(validity) => record.global_validity = validity,
        }
    }
}

fn envelope<'a>(event: &str, payload: &'a Value) -> Result<(String, &'a Value), StateError> {
    let field = payload
        .get("what")
        .and_then(Value::as_str)
        .ok_or_else(|| StateError::MissingWhat {
            event: event.to_string(),
        })?;
    let data = payload.get("data").unwrap_or(&NULL);
    Ok((field.to_string(), data))
}

fn decode<T: serde::de::DeserializeOwned>(event: &str, data: &Value) -> Result<T, StateError> {
    serde_json::from_value(data.clone()).map_err(|e| StateError::MalformedPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_events_use_the_what_envelope() {
        let event = StateEvent::Data {
            field: "title".into(),
            value: json!("Hello"),
        };
        assert_eq!(event.name(), "dataStateUpdated");
        assert_eq!(event.payload(), json!({"what": "title", "data": "Hello"}));
    }

    #[test]
    fn global_events_carry_the_raw_value() {
        assert_eq!(StateEvent::GlobalError(3).payload(), json!(3));
        assert_eq!(StateEvent::GlobalSync(SyncStatus::NotSynced).payload(), json!(0));
    }

    #[test]
    fn cleared_error_goes_out_as_false() {
        let event = StateEvent::FieldError {
            field: "title".into(),
            error: None,
        };
        assert_eq!(event.payload(), json!({"what": "title", "data": false}));
    }

    #[test]
    fn parse_rejects_field_event_without_what() {
        let err = StateEvent::parse(DATA_STATE_UPDATED, &json!({"data": 1})).unwrap_err();
        assert!(matches!(err, StateError::MissingWhat { .. }));
    }

    #[test]
    fn parse_rejects_unknown_event_and_bad_status() {
        assert!(matches!(
            StateEvent::parse("somethingElse", &json!(1)),
            Err(StateError::UnknownEvent(_))
        ));
        assert!(matches!(
            StateEvent::parse(GLOBAL_SYNC_STATE_UPDATED, &json!(9)),
            Err(StateError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn parsed_validity_applies_to_keyed_slot() {
        let event = StateEvent::parse(
            VALIDITY_STATE_UPDATED,
            &json!({"what": "title", "data": {"state": "invalid", "reason": "empty"}}),
        )
        .unwrap();

        let mut record = StateRecord::new();
        event.apply_to(&mut record);

        assert_eq!(record.validity["title"], Validity::invalid("empty"));
    }
}
