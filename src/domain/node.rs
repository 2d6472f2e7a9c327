//! Node — the last known state of one monitored host.
//!
//! A `Node` holds the *confirmed* firewall state as reported by the fleet.
//! Optimistic display state for an in-flight toggle lives on the pending
//! operation, never here; presentation merges the two (see `types::NodeView`).

use async_graphql::{Enum, SimpleObject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operating system the node's enforcement agent runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
pub enum NodeOs {
    Linux,
    Windows,
    Mac,
    Alpine,
}

impl Default for NodeOs {
    fn default() -> Self {
        Self::Linux
    }
}

/// Node connectivity as reported over the event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
    Warning,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::Offline
    }
}

/// Last confirmed firewall enforcement state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
pub enum FirewallStatus {
    Inactive,
    Active,
    Error,
}

impl Default for FirewallStatus {
    fn default() -> Self {
        Self::Inactive
    }
}

/// Outbound control command for a single node's enforcement agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeCommand {
    EnableFirewall,
    DisableFirewall,
}

impl NodeCommand {
    pub fn for_state(enable: bool) -> Self {
        if enable {
            Self::EnableFirewall
        } else {
            Self::DisableFirewall
        }
    }
}

impl std::fmt::Display for NodeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::EnableFirewall => "ENABLE_FIREWALL",
            Self::DisableFirewall => "DISABLE_FIREWALL",
        })
    }
}

/// A monitored host in the fleet.
#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: String,
    pub ip: String,
    pub os: NodeOs,
    #[serde(rename = "status")]
    pub connectivity: Connectivity,
    pub firewall_status: FirewallStatus,
    pub firewall_error: Option<String>,
    pub firewall_info: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Partial node record carried by an inbound event.
///
/// Fields left `None` are retained from the stored node on merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeUpdate {
    pub id: String,
    pub name: Option<String>,
    pub ip: Option<String>,
    pub os: Option<NodeOs>,
    #[serde(rename = "status")]
    pub connectivity: Option<Connectivity>,
    pub firewall_status: Option<FirewallStatus>,
    pub firewall_error: Option<String>,
    pub firewall_info: Option<String>,
}

impl NodeUpdate {
    /// Shorthand used by tests and the stale-operation sweeper.
    pub fn error(id: &str, message: &str) -> Self {
        Self {
            id: id.to_string(),
            firewall_status: Some(FirewallStatus::Error),
            firewall_error: Some(message.to_string()),
            ..Self::default()
        }
    }
}

impl Node {
    /// Build a fresh node from its first update, defaulting absent fields.
    pub fn from_update(update: &NodeUpdate, now: DateTime<Utc>) -> Self {
        let mut node = Self {
            id: update.id.clone(),
            name: update.name.clone().unwrap_or_else(|| update.id.clone()),
            ip: update.ip.clone().unwrap_or_default(),
            os: update.os.unwrap_or_default(),
            connectivity: update.connectivity.unwrap_or_default(),
            firewall_status: FirewallStatus::Inactive,
            firewall_error: None,
            firewall_info: None,
            first_seen: now,
            last_seen: Some(now),
        };
        node.apply(update, now);
        node
    }

    /// Field-wise merge of a partial update into this node.
    ///
    /// `firewall_error` is cleared whenever `firewall_status` moves away from
    /// `Error`; error and info messages are replaced wholesale, never kept
    /// alongside older ones.
    pub fn apply(&mut self, update: &NodeUpdate, now: DateTime<Utc>) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(ip) = &update.ip {
            self.ip = ip.clone();
        }
        if let Some(os) = update.os {
            self.os = os;
        }
        if let Some(connectivity) = update.connectivity {
            self.connectivity = connectivity;
        }
        if let Some(status) = update.firewall_status {
            self.firewall_status = status;
            if status == FirewallStatus::Error {
                if update.firewall_error.is_some() {
                    self.firewall_error = update.firewall_error.clone();
                }
            } else {
                self.firewall_error = None;
            }
        } else if update.firewall_error.is_some() && self.firewall_status == FirewallStatus::Error {
            self.firewall_error = update.firewall_error.clone();
        }
        if update.firewall_info.is_some() {
            self.firewall_info = update.firewall_info.clone();
        }
        self.last_seen = Some(now);
    }
}
