//! The structured state record held by ledgers and mirrors.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::status::{SyncStatus, Validity};

/// Global error count before any field error has been reported.
pub const UNKNOWN_ERROR_COUNT: i64 = -1;

/// Per-field state plus global summaries.
///
/// A field error of `None` means "explicitly no error" (`false` on the wire);
/// a field missing from `error` has never reported one. Neither counts
/// towards `global_error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateRecord {
    pub data: BTreeMap<String, Value>,
    pub syncing: BTreeMap<String, SyncStatus>,
    pub global_syncing: SyncStatus,
    pub error: BTreeMap<String, Option<Value>>,
    pub global_error: i64,
    pub validity: BTreeMap<String, Validity>,
    pub global_validity: Validity,
}

impl Default for StateRecord {
    fn default() -> Self {
        Self {
            data: BTreeMap::new(),
            syncing: BTreeMap::new(),
            global_syncing: SyncStatus::Unknown,
            error: BTreeMap::new(),
            global_error: UNKNOWN_ERROR_COUNT,
            validity: BTreeMap::new(),
            global_validity: Validity::Unknown,
        }
    }
}

impl StateRecord {
    /// The zero record: nothing known yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fields currently carrying an error. `false` and `null`
    /// count as cleared even if stored as `Some`.
    pub fn error_count(&self) -> i64 {
        self.error
            .values()
            .filter(|e| e.as_ref().and_then(error_from_wire).is_some())
            .count() as i64
    }

    pub fn least_synced_field(&self) -> SyncStatus {
        SyncStatus::least_synced(self.syncing.values().copied())
    }

    pub fn most_severe_validity(&self) -> Validity {
        Validity::most_severe(self.validity.values())
    }

    pub fn field(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn field_error(&self, field: &str) -> Option<&Value> {
        self.error.get(field).and_then(Option::as_ref)
    }
}

/// Errors are cleared by `false` or `null` on the wire.
pub(crate) fn error_from_wire(value: &Value) -> Option<Value> {
    match value {
        Value::Null | Value::Bool(false) => None,
        other => Some(other.clone()),
    }
}

pub(crate) fn error_to_wire(error: &Option<Value>) -> Value {
    error.clone().unwrap_or(Value::Bool(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zero_record_is_unknown_everywhere() {
        let record = StateRecord::new();
        assert_eq!(record.global_syncing, SyncStatus::Unknown);
        assert_eq!(record.global_error, -1);
        assert_eq!(record.global_validity, Validity::Unknown);
        assert!(record.data.is_empty());
    }

    #[test]
    fn error_count_skips_cleared_errors() {
        let mut record = StateRecord::new();
        record.error.insert("a".into(), Some(json!("required")));
        record.error.insert("b".into(), None);
        record.error.insert("c".into(), Some(json!({"code": 4})));

        assert_eq!(record.error_count(), 2);
        assert_eq!(record.field_error("a"), Some(&json!("required")));
        assert_eq!(record.field_error("b"), None);
    }

    #[test]
    fn error_count_treats_stored_false_as_cleared() {
        let mut record = StateRecord::new();
        record.error.insert("a".into(), Some(json!("err")));
        record.error.insert("b".into(), Some(json!(false)));
        record.error.insert("c".into(), Some(Value::Null));

        assert_eq!(record.error_count(), 1);
    }

    #[test]
    fn false_and_null_clear_errors() {
        assert_eq!(error_from_wire(&json!(false)), None);
        assert_eq!(error_from_wire(&Value::Null), None);
        assert_eq!(error_from_wire(&json!("bad")), Some(json!("bad")));
        assert_eq!(error_to_wire(&None), json!(false));
    }
}
