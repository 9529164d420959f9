//! Per-field rules: equality, validation and post-update hooks.
//!
//! Fields are declared up front. Attaching a rule to a field that was never
//! declared fails while the table is being built, not when an update arrives.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::StateError;
use crate::record::StateRecord;
use crate::status::Validity;

type Comparator = Box<dyn Fn(&Value, &Value) -> bool + Send + Sync>;
type Validator = Box<dyn Fn(&Value) -> anyhow::Result<Validity> + Send + Sync>;
type FieldHook = Box<dyn Fn(&str, &StateRecord) + Send + Sync>;
type GlobalHook = Box<dyn Fn(&StateRecord) + Send + Sync>;

/// Which part of the record an update touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Slot {
    Data,
    Sync,
    Error,
    Validity,
}

#[derive(Default)]
pub(crate) struct FieldRules {
    comparator: Option<Comparator>,
    validator: Option<Validator>,
    hooks: BTreeMap<Slot, FieldHook>,
}

impl FieldRules {
    /// Structural equality unless a comparator was installed.
    pub(crate) fn same(&self, stored: &Value, incoming: &Value) -> bool {
        match &self.comparator {
            Some(comparator) => comparator(stored, incoming),
            None => stored == incoming,
        }
    }

    pub(crate) fn validate(&self, value: &Value) -> Option<anyhow::Result<Validity>> {
        self.validator.as_ref().map(|validator| validator(value))
    }

    pub(crate) fn after_update(&self, slot: Slot, field: &str, record: &StateRecord) {
        if let Some(hook) = self.hooks.get(&slot) {
            hook(field, record);
        }
    }
}

/// Declared fields and the rules attached to them.
#[derive(Default)]
pub struct FieldTable {
    fields: BTreeMap<String, FieldRules>,
    global_hooks: BTreeMap<Slot, GlobalHook>,
}

impl FieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare several fields with default rules.
    pub fn with_fields<I, S>(fields: I) -> Result<Self, StateError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        fields.into_iter().try_fold(Self::new(), |table, f| table.field(f))
    }

    pub fn field(mut self, name: impl Into<String>) -> Result<Self, StateError> {
        let name = name.into();
        if name.is_empty() {
            return Err(StateError::EmptyField);
        }
        if self.fields.contains_key(&name) {
            return Err(StateError::DuplicateField(name));
        }
        self.fields.insert(name, FieldRules::default());
        Ok(self)
    }

    /// Replace structural equality for `field`.
    pub fn compare_with<F>(mut self, field: &str, comparator: F) -> Result<Self, StateError>
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        self.declared_mut(field)?.comparator = Some(Box::new(comparator));
        Ok(self)
    }

    /// Compute `field`'s validity after each edit. A validator error is a
    /// failure of the edit; an `Invalid` verdict is not.
    pub fn validate_with<F>(mut self, field: &str, validator: F) -> Result<Self, StateError>
    where
        F: Fn(&Value) -> anyhow::Result<Validity> + Send + Sync + 'static,
    {
        self.declared_mut(field)?.validator = Some(Box::new(validator));
        Ok(self)
    }

    /// Run `hook` after `slot` of `field` changed, before fan-out.
    pub fn on_updated<F>(mut self, field: &str, slot: Slot, hook: F) -> Result<Self, StateError>
    where
        F: Fn(&str, &StateRecord) + Send + Sync + 'static,
    {
        self.declared_mut(field)?.hooks.insert(slot, Box::new(hook));
        Ok(self)
    }

    /// Run `hook` after the global summary for `slot` changed.
    pub fn on_global_updated<F>(mut self, slot: Slot, hook: F) -> Self
    where
        F: Fn(&StateRecord) + Send + Sync + 'static,
    {
        self.global_hooks.insert(slot, Box::new(hook));
        self
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub(crate) fn rules(&self, field: &str) -> Result<&FieldRules, StateError> {
        self.fields
            .get(field)
            .ok_or_else(|| StateError::UnknownField(field.to_string()))
    }

    pub(crate) fn after_global_update(&self, slot: Slot, record: &StateRecord) {
        if let Some(hook) = self.global_hooks.get(&slot) {
            hook(record);
        }
    }

    fn declared_mut(&mut self, field: &str) -> Result<&mut FieldRules, StateError> {
        self.fields
            .get_mut(field)
            .ok_or_else(|| StateError::UnknownField(field.to_string()))
    }
}
