//! Inbound event wire model.
//!
//! The controller pushes discrete JSON messages shaped
//! `{"type": "...", "data": {...}}`. Only the two firewall-relevant kinds are
//! decoded here; anything else on the channel is skipped by the transport
//! adapter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::node::NodeUpdate;

pub const NODE_UPDATE: &str = "NODE_UPDATE";
pub const SYNC_COMPLETE: &str = "SYNC_COMPLETE";

/// One message from the fleet event channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FleetEvent {
    /// Periodic or spontaneous status report for one node.
    #[serde(rename = "NODE_UPDATE")]
    NodeUpdate(NodeUpdate),
    /// Per-node completion signal for a fleet-wide rule sync. Forces the
    /// global syncing indicator off.
    #[serde(rename = "SYNC_COMPLETE")]
    SyncComplete(NodeUpdate),
}

impl FleetEvent {
    pub fn node(&self) -> &NodeUpdate {
        match self {
            Self::NodeUpdate(u) | Self::SyncComplete(u) => u,
        }
    }

    pub fn is_sync_complete(&self) -> bool {
        matches!(self, Self::SyncComplete(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NodeUpdate(_) => NODE_UPDATE,
            Self::SyncComplete(_) => SYNC_COMPLETE,
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    data: Option<Value>,
}

/// Decode one line from the event stream.
///
/// `Ok(None)` means a well-formed message of a kind this console does not
/// consume (chat messages, metric frames, ...).
pub fn decode(line: &str) -> Result<Option<FleetEvent>, serde_json::Error> {
    let envelope: Envelope = serde_json::from_str(line)?;
    let Some(data) = envelope.data else {
        return Ok(None);
    };
    match envelope.kind.as_str() {
        NODE_UPDATE => Ok(Some(FleetEvent::NodeUpdate(serde_json::from_value(data)?))),
        SYNC_COMPLETE => Ok(Some(FleetEvent::SyncComplete(serde_json::from_value(
            data,
        )?))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::FirewallStatus;

    #[test]
    fn decodes_node_update() {
        let event = decode(
            r#"{"type":"NODE_UPDATE","data":{"id":"n1","firewallStatus":"active","firewallInfo":"42 rules applied"}}"#,
        )
        .unwrap()
        .unwrap();
        assert!(!event.is_sync_complete());
        assert_eq!(event.node().id, "n1");
        assert_eq!(
            event.node().firewall_status,
            Some(FirewallStatus::Active)
        );
    }

    #[test]
    fn decodes_sync_complete() {
        let event = decode(
            r#"{"type":"SYNC_COMPLETE","data":{"id":"n2","firewallStatus":"error","firewallError":"agent unreachable"}}"#,
        )
        .unwrap()
        .unwrap();
        assert!(event.is_sync_complete());
        assert_eq!(
            event.node().firewall_error.as_deref(),
            Some("agent unreachable")
        );
    }

    #[test]
    fn skips_unknown_kinds() {
        let event = decode(r#"{"type":"NEW_MESSAGE","data":{"id":"msg-1"}}"#).unwrap();
        assert!(event.is_none());
    }

    #[test]
    fn malformed_line_is_an_error() {
        assert!(decode("not json").is_err());
    }
}
