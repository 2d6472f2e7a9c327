//! Outstanding command tracking — at most one pending operation per node,
//! plus the fleet-wide sync wave state.
//!
//! Every sync wave gets a fresh epoch so a late event from wave N can never
//! be attributed to wave N+1.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Monotone identifier for one triggered sync wave.
pub type SyncEpoch = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    /// Operator flipped a single node's firewall; `desired` is the optimistic
    /// display state until the node confirms.
    Toggle { desired: bool },
    /// Part of the fleet-wide sync wave with the given epoch.
    Sync { epoch: SyncEpoch },
}

impl OperationKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Toggle { .. } => "toggle",
            Self::Sync { .. } => "sync",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    /// Unique per issued command; lets a failed dispatch roll back exactly
    /// its own entry even if an event raced in between.
    pub op_id: u64,
    pub node_id: String,
    pub kind: OperationKind,
    pub issued_at: DateTime<Utc>,
}

impl PendingOperation {
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.issued_at
    }
}

/// Fleet-level sync single-flight state.
#[derive(Debug, Default)]
pub struct SyncState {
    next_epoch: SyncEpoch,
    active: Option<ActiveSync>,
}

#[derive(Debug, Clone, Copy)]
pub struct ActiveSync {
    pub epoch: SyncEpoch,
    pub started_at: DateTime<Utc>,
}

impl SyncState {
    /// Start a new wave, returning its epoch. Caller must have checked
    /// `active()` first; a second begin while one is active is a logic error.
    pub fn begin(&mut self, now: DateTime<Utc>) -> SyncEpoch {
        debug_assert!(self.active.is_none());
        self.next_epoch += 1;
        let epoch = self.next_epoch;
        self.active = Some(ActiveSync {
            epoch,
            started_at: now,
        });
        epoch
    }

    pub fn active(&self) -> Option<ActiveSync> {
        self.active
    }

    pub fn is_active_epoch(&self, epoch: SyncEpoch) -> bool {
        self.active.map(|a| a.epoch == epoch).unwrap_or(false)
    }

    /// Turn the fleet syncing indicator off.
    pub fn clear(&mut self) {
        self.active = None;
    }
}
