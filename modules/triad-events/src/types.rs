//! Callback and outcome types shared by the buses. Domain-agnostic.

use std::sync::Arc;

use crate::error::{DispatchError, DispatchFailures};
use crate::participant::Participant;

/// Called once per participant when its acknowledgement arrives.
pub type OnProcessed = Arc<dyn Fn(&Arc<dyn Participant>, Result<(), DispatchError>) + Send + Sync>;

/// Called once per scheduled throttle: either cancelled or processed.
pub type OnThrottled = Arc<dyn Fn(&Arc<dyn Participant>, ThrottleOutcome) + Send + Sync>;

/// How a scheduled throttled dispatch ended for one participant.
#[derive(Debug)]
pub enum ThrottleOutcome {
    /// Superseded by a newer dispatch of the same event before the delay elapsed.
    Cancelled,
    /// The delay elapsed and the participant acknowledged.
    Processed(Result<(), DispatchError>),
}

impl ThrottleOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ThrottleOutcome::Cancelled)
    }
}

/// Result of an awaited fan-out.
#[derive(Debug)]
pub struct DispatchReport {
    pub event: String,
    /// Participants visited, including an excluded one.
    pub visited: usize,
    /// Acknowledgements received. Lower than `visited` when acks were dropped.
    pub acknowledged: usize,
    pub failures: Vec<DispatchError>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_result(self) -> Result<(), DispatchFailures> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(DispatchFailures {
                event: self.event,
                failures: self.failures,
            })
        }
    }
}
