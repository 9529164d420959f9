//! Generic, domain-agnostic publish/subscribe buses.
//!
//! Two flavours share one [`Registry`] of named participants:
//!
//! - [`NotifyBus`]: fire-and-forget. Participants opt into events by name.
//! - [`DispatchBus`]: acknowledging. Every participant processes every event
//!   and must acknowledge it exactly once. Supports exclusion, per-call result
//!   aggregation and per-(participant, event) throttling.
//!
//! Payloads are opaque `serde_json::Value`s; the buses know nothing about
//! what flows through them.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod notify;
pub mod participant;
pub mod registry;
mod throttle;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::BusConfig;
pub use dispatch::{Ack, DispatchBus};
pub use error::{BusError, DispatchError, DispatchFailures, RegistryError};
pub use notify::NotifyBus;
pub use participant::{HandlerTable, Listener, Participant, ParticipantKey, Processor};
pub use registry::Registry;
pub use types::{DispatchReport, OnProcessed, OnThrottled, ThrottleOutcome};
