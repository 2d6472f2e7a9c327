//! NodeRegistry — in-memory projection of the fleet.
//!
//! Insertion order is preserved: newly-seen nodes append, existing nodes keep
//! their position. Mutated only by the reconciliation path; everything else
//! reads cloned snapshots.

use chrono::{DateTime, Utc};

use super::node::{Connectivity, Node, NodeUpdate};

#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: Vec<Node>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a partial update by id, inserting if the node is unknown.
    ///
    /// Returns `None` only for an empty id — the single validation this
    /// store performs.
    pub fn upsert(&mut self, update: &NodeUpdate, now: DateTime<Utc>) -> Option<&Node> {
        if update.id.is_empty() {
            return None;
        }
        match self.nodes.iter_mut().position(|n| n.id == update.id) {
            Some(idx) => {
                self.nodes[idx].apply(update, now);
                Some(&self.nodes[idx])
            }
            None => {
                self.nodes.push(Node::from_update(update, now));
                self.nodes.last()
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn online_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.connectivity == Connectivity::Online)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::FirewallStatus;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn update(id: &str) -> NodeUpdate {
        NodeUpdate {
            id: id.into(),
            ..NodeUpdate::default()
        }
    }

    #[test]
    fn upsert_inserts_then_merges() {
        let mut registry = NodeRegistry::new();
        registry.upsert(&update("a"), now());
        assert_eq!(registry.len(), 1);

        let merged = registry
            .upsert(
                &NodeUpdate {
                    id: "a".into(),
                    firewall_status: Some(FirewallStatus::Active),
                    ..NodeUpdate::default()
                },
                now(),
            )
            .unwrap();
        assert_eq!(merged.firewall_status, FirewallStatus::Active);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn upsert_rejects_empty_id() {
        let mut registry = NodeRegistry::new();
        assert!(registry.upsert(&update(""), now()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn insertion_order_preserved() {
        let mut registry = NodeRegistry::new();
        registry.upsert(&update("a"), now());
        registry.upsert(&update("b"), now());
        registry.upsert(&update("c"), now());
        // Updating an existing node must not move it.
        registry.upsert(
            &NodeUpdate {
                id: "b".into(),
                name: Some("renamed".into()),
                ..NodeUpdate::default()
            },
            now(),
        );
        let ids: Vec<&str> = registry.all().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn online_count_tracks_connectivity() {
        let mut registry = NodeRegistry::new();
        registry.upsert(
            &NodeUpdate {
                id: "a".into(),
                connectivity: Some(Connectivity::Online),
                ..NodeUpdate::default()
            },
            now(),
        );
        registry.upsert(
            &NodeUpdate {
                id: "b".into(),
                connectivity: Some(Connectivity::Offline),
                ..NodeUpdate::default()
            },
            now(),
        );
        assert_eq!(registry.online_count(), 1);
    }
}
