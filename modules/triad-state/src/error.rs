//! Typed errors for state propagation.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use triad_events::{BusError, DispatchFailures};

#[derive(Debug, Error)]
pub enum StateError {
    /// `initialize` has not been called yet
    #[error("state record is not initialized")]
    Uninitialized,

    #[error("field name must not be empty")]
    EmptyField,

    #[error("field declared twice: {0}")]
    DuplicateField(String),

    /// Field used without being declared in the field table
    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("unknown state event: {0}")]
    UnknownEvent(String),

    /// Field-scoped event without a `what` key
    #[error("{event} payload has no \"what\" field")]
    MissingWhat { event: String },

    #[error("malformed {event} payload: {reason}")]
    MalformedPayload { event: String, reason: String },

    #[error("host is not valid")]
    HostInvalid,

    #[error("host is not rendered")]
    HostNotRendered,

    #[error("validator for {field} failed: {error:#}")]
    Validator { field: String, error: anyhow::Error },

    #[error("render failed: {0:#}")]
    Render(anyhow::Error),

    #[error("controller rejected {request}: {error:#}")]
    Controller {
        request: String,
        error: anyhow::Error,
    },

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Dispatch(#[from] DispatchFailures),

    #[error(transparent)]
    Composite(#[from] CompositeError),
}

/// Failures of concurrent sub-operations, keyed by what each was doing.
#[derive(Debug, Default)]
pub struct CompositeError {
    pub failures: BTreeMap<String, StateError>,
}

impl CompositeError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn get(&self, task: &str) -> Option<&StateError> {
        self.failures.get(task)
    }

    /// Record the outcome of `task`, keeping it only if it failed.
    pub fn record<T>(&mut self, task: impl Into<String>, outcome: Result<T, StateError>) {
        if let Err(err) = outcome {
            self.failures.insert(task.into(), err);
        }
    }

    pub fn into_result(self) -> Result<(), StateError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(StateError::Composite(self))
        }
    }
}

impl fmt::Display for CompositeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} task(s) failed", self.failures.len())?;
        for (task, err) in &self.failures {
            write!(f, "; {task}: {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompositeError {}
