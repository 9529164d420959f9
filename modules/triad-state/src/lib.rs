//! Structured state propagation over a [`DispatchBus`](triad_events::DispatchBus).
//!
//! A [`StateLedger`] owns the authoritative [`StateRecord`] of a model: per
//! field data, sync status, error and validity, plus global summaries. Every
//! change is fanned out as a [`StateEvent`]. A [`StateMirror`] applies those
//! events to a shadow record on the view side and asks its host to re-render.
//!
//! ```text
//! StateLedger ──dispatch──→ Controller ──relay──→ StateMirror ──→ render
//!      ↑                                              │
//!      └──────────── wantToEdit / wantToUpdateToRemote ┘
//! ```

pub mod error;
pub mod event;
pub mod fields;
pub mod ledger;
pub mod mirror;
pub mod record;
pub mod status;

pub use error::{CompositeError, StateError};
pub use event::StateEvent;
pub use fields::{FieldTable, Slot};
pub use ledger::StateLedger;
pub use mirror::{ControllerRequest, MirrorHost, MirrorProcessor, StateMirror};
pub use record::StateRecord;
pub use status::{SyncStatus, Validity};
