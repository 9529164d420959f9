//! Status values tracked per field and their reductions to a global summary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Synchronisation status, ranked ascending from least to most synced.
///
/// Declaration order is the ranking, so `Ord` compares by severity.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(into = "i8", try_from = "i8")]
pub enum SyncStatus {
    #[default]
    Unknown = -2,
    SyncError = -1,
    NotSynced = 0,
    Syncing = 1,
    Synced = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown sync status rank: {0}")]
pub struct UnknownSyncStatus(pub i8);

impl SyncStatus {
    pub fn rank(self) -> i8 {
        self as i8
    }

    /// The least-synced status among `statuses`; `Unknown` when empty.
    pub fn least_synced(statuses: impl IntoIterator<Item = SyncStatus>) -> SyncStatus {
        statuses.into_iter().min().unwrap_or(SyncStatus::Unknown)
    }
}

impl From<SyncStatus> for i8 {
    fn from(status: SyncStatus) -> i8 {
        status.rank()
    }
}

impl TryFrom<i8> for SyncStatus {
    type Error = UnknownSyncStatus;

    fn try_from(rank: i8) -> Result<Self, Self::Error> {
        match rank {
            -2 => Ok(SyncStatus::Unknown),
            -1 => Ok(SyncStatus::SyncError),
            0 => Ok(SyncStatus::NotSynced),
            1 => Ok(SyncStatus::Syncing),
            2 => Ok(SyncStatus::Synced),
            other => Err(UnknownSyncStatus(other)),
        }
    }
}

/// Validation verdict for a field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Validity {
    #[default]
    Unknown,
    Valid,
    Invalid {
        reason: String,
    },
}

impl Validity {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Validity::Invalid {
            reason: reason.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid)
    }

    fn severity(&self) -> u8 {
        match self {
            Validity::Valid => 0,
            Validity::Unknown => 1,
            Validity::Invalid { .. } => 2,
        }
    }

    /// The most severe verdict among `verdicts`: any invalid field makes the
    /// whole record invalid, any unchecked one makes it unknown. `Unknown`
    /// when empty.
    pub fn most_severe<'a>(verdicts: impl IntoIterator<Item = &'a Validity>) -> Validity {
        verdicts
            .into_iter()
            .max_by_key(|v| v.severity())
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_status_orders_by_rank() {
        assert!(SyncStatus::Unknown < SyncStatus::SyncError);
        assert!(SyncStatus::SyncError < SyncStatus::NotSynced);
        assert!(SyncStatus::NotSynced < SyncStatus::Syncing);
        assert!(SyncStatus::Syncing < SyncStatus::Synced);
        assert_eq!(SyncStatus::SyncError.rank(), -1);
    }

    #[test]
    fn sync_status_serializes_as_rank() {
        assert_eq!(serde_json::to_value(SyncStatus::Synced).unwrap(), 2);
        let parsed: SyncStatus = serde_json::from_value(serde_json::json!(-2)).unwrap();
        assert_eq!(parsed, SyncStatus::Unknown);
        assert!(serde_json::from_value::<SyncStatus>(serde_json::json!(7)).is_err());
    }

    #[test]
    fn least_synced_picks_minimum() {
        let statuses = [SyncStatus::Synced, SyncStatus::NotSynced, SyncStatus::Syncing];
        assert_eq!(SyncStatus::least_synced(statuses), SyncStatus::NotSynced);
        assert_eq!(SyncStatus::least_synced([]), SyncStatus::Unknown);
    }

    #[test]
    fn invalid_outranks_unknown_outranks_valid() {
        let verdicts = [Validity::Valid, Validity::Unknown];
        assert_eq!(Validity::most_severe(&verdicts), Validity::Unknown);

        let verdicts = [Validity::Valid, Validity::invalid("too long"), Validity::Unknown];
        assert_eq!(Validity::most_severe(&verdicts), Validity::invalid("too long"));

        assert_eq!(Validity::most_severe(&[Validity::Valid]), Validity::Valid);
        assert_eq!(Validity::most_severe(&[]), Validity::Unknown);
    }
}
