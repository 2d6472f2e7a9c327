use async_graphql::SimpleObject;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::node::{Connectivity, FirewallStatus, NodeOs};

/// One node as the console renders it: confirmed state plus the optimistic
/// display flag derived from any in-flight toggle.
#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    pub id: String,
    pub name: String,
    pub ip: String,
    pub os: NodeOs,
    pub connectivity: Connectivity,
    pub firewall_status: FirewallStatus,
    pub firewall_error: Option<String>,
    pub firewall_info: Option<String>,
    /// What the switch should show right now; falls back to the confirmed
    /// state whenever nothing is pending.
    pub display_active: bool,
    /// "toggle" or "sync" while an operation is outstanding.
    pub pending_operation: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct PendingView {
    pub node_id: String,
    pub kind: String,
    pub desired: Option<bool>,
    pub sync_epoch: Option<u64>,
    pub issued_at: DateTime<Utc>,
    pub age_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct FleetSummary {
    pub total_nodes: usize,
    pub online_nodes: usize,
    pub pending_operations: usize,
    pub syncing: bool,
    pub sync_epoch: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct DaemonHealth {
    pub version: String,
    pub instance: String,
    pub uptime_secs: u64,
    pub fleet: FleetSummary,
}

/// Synchronous acknowledgement for an accepted toggle command.
#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct CommandAccepted {
    pub node_id: String,
    pub command: String,
}

/// Acknowledgement for an accepted fleet-wide sync.
#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct SyncAccepted {
    pub epoch: u64,
}
