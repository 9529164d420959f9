//! Typed errors for registration and dispatch.

use std::fmt;

use thiserror::Error;

/// Caller-contract violations on a [`Registry`](crate::Registry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Names are the only way to address a participant in diagnostics
    #[error("participant name must not be empty")]
    EmptyName,

    #[error("name already registered: {name}")]
    NameTaken { name: String },

    /// The same participant may hold only one name per registry
    #[error("participant already registered as {name}")]
    AlreadyRegistered { name: String },

    /// The admission predicate refused the participant
    #[error("participant refused registration as {name}")]
    Refused { name: String },

    #[error("participant is not registered")]
    NotRegistered,
}

/// Failures that stop a fan-out before any participant is visited.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("event name must not be empty")]
    MissingEventName,

    /// Throttled dispatch schedules timers and needs a tokio runtime
    #[error("throttled dispatch of {event} requires a running tokio runtime")]
    NoRuntime { event: String },
}

/// A single participant's failure to handle an event.
///
/// Reported through the processed callback. Never aborts the fan-out to the
/// remaining participants.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("participant {participant} cannot process {event}: no processor")]
    MissingHandler { participant: String, event: String },

    #[error("participant {participant} failed to process {event}: {error:#}")]
    Failed {
        participant: String,
        event: String,
        error: anyhow::Error,
    },
}

impl DispatchError {
    /// Registered name of the participant that failed.
    pub fn participant(&self) -> &str {
        match self {
            DispatchError::MissingHandler { participant, .. }
            | DispatchError::Failed { participant, .. } => participant,
        }
    }
}

/// Every per-participant failure collected from one awaited fan-out.
#[derive(Debug)]
pub struct DispatchFailures {
    pub event: String,
    pub failures: Vec<DispatchError>,
}

impl fmt::Display for DispatchFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} participant(s) failed to process {}",
            self.failures.len(),
            self.event
        )?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for DispatchFailures {}
