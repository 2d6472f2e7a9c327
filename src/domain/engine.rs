//! The fleet reconciliation engine.
//!
//! One `FleetService` owns the registry, the pending-operation set and the
//! notification dedup keys behind a single lock. Command dispatch takes the
//! lock only to test-and-set its in-flight guard; event ingestion takes it
//! per event, so a command can never be accepted for a node whose pending
//! flag is mid-clear.
//!
//! Inbound events are drained by exactly one task (`run_reconciler`), in
//! arrival order, which is what makes the dedup and pending bookkeeping safe
//! without per-field synchronization.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::upstream::UpstreamError;

use super::events::FleetEvent;
use super::node::{FirewallStatus, NodeCommand, NodeUpdate};
use super::notify::{NotificationIntent, NotificationSink, Severity};
use super::pending::{OperationKind, PendingOperation, SyncEpoch, SyncState};
use super::registry::NodeRegistry;
use super::types::{FleetSummary, NodeView, PendingView};

const TITLE_OP_FAILED: &str = "Operation failed";
const TITLE_OP_SUCCEEDED: &str = "Operation succeeded";
const GENERIC_FIREWALL_ERROR: &str = "firewall operation failed";
const SYNC_SUCCESS_MESSAGE: &str = "firewall rules synchronized across the fleet";
const TIMEOUT_MESSAGE: &str = "operation timed out waiting for node response";

/// Issues outbound operations to the controller. Abstracted so the engine
/// can be exercised without a network.
#[async_trait]
pub trait CommandTransport: Send + Sync {
    async fn send_command(&self, node_id: &str, command: NodeCommand)
        -> Result<(), UpstreamError>;
    async fn trigger_sync(&self) -> Result<(), UpstreamError>;
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown node '{0}'")]
    UnknownNode(String),
    #[error("node '{0}' already has an operation in flight")]
    OperationInFlight(String),
    #[error("a fleet-wide sync is already in progress")]
    SyncInFlight,
    #[error("command transport failed: {0}")]
    Transport(#[from] UpstreamError),
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// How long a pending operation may wait for its confirming event.
    pub pending_timeout: Duration,
    /// Hard ceiling on a fleet-wide sync wave.
    pub sync_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            pending_timeout: Duration::seconds(30),
            sync_timeout: Duration::seconds(120),
        }
    }
}

/// Last-notified `(status, error, info)` snapshot per node. An event whose
/// triple matches is a repeat and stays quiet.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DedupKey {
    status: FirewallStatus,
    error: String,
    info: String,
}

#[derive(Default)]
struct FleetState {
    registry: NodeRegistry,
    pending: HashMap<String, PendingOperation>,
    sync: SyncState,
    dedup: HashMap<String, DedupKey>,
    next_op_id: u64,
}

pub struct FleetService {
    state: Mutex<FleetState>,
    transport: Arc<dyn CommandTransport>,
    sink: Arc<dyn NotificationSink>,
    config: ReconcilerConfig,
}

impl FleetService {
    pub fn new(
        transport: Arc<dyn CommandTransport>,
        sink: Arc<dyn NotificationSink>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            state: Mutex::new(FleetState::default()),
            transport,
            sink,
            config,
        }
    }

    /// Seed the registry from a fleet snapshot without emitting
    /// notifications; the dedup keys are set so the first streamed repeat of
    /// known state stays quiet.
    pub async fn prime(&self, updates: Vec<NodeUpdate>) {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        for update in updates {
            if state.registry.upsert(&update, now).is_none() {
                continue;
            }
            if let Some(status) = update.firewall_status {
                state.dedup.insert(
                    update.id.clone(),
                    DedupKey {
                        status,
                        error: update.firewall_error.unwrap_or_default(),
                        info: update.firewall_info.unwrap_or_default(),
                    },
                );
            }
        }
        info!(nodes = state.registry.len(), "registry primed from snapshot");
    }

    /// Issue a single-node firewall toggle.
    ///
    /// Rejects if the node is unknown or already has an operation in flight.
    /// On transport failure the pending entry is rolled back so the node is
    /// immediately retryable and the display falls back to confirmed state.
    pub async fn toggle_firewall(
        &self,
        node_id: &str,
        enable: bool,
    ) -> Result<NodeCommand, DispatchError> {
        let command = NodeCommand::for_state(enable);
        let node_name;
        let op_id;
        {
            let mut state = self.state.lock().await;
            let Some(node) = state.registry.get(node_id) else {
                return Err(DispatchError::UnknownNode(node_id.to_string()));
            };
            node_name = node.name.clone();
            if state.pending.contains_key(node_id) {
                return Err(DispatchError::OperationInFlight(node_id.to_string()));
            }
            op_id = state.push_pending(
                node_id,
                OperationKind::Toggle { desired: enable },
                Utc::now(),
            );
        }

        info!(node_id, command = %command, "dispatching firewall toggle");
        match self.transport.send_command(node_id, command).await {
            Ok(()) => {
                self.sink.publish(NotificationIntent::new(
                    Severity::Info,
                    TITLE_OP_SUCCEEDED,
                    format!("{node_name}: {command} sent"),
                    Some(node_id.to_string()),
                ));
                Ok(command)
            }
            Err(err) => {
                let mut state = self.state.lock().await;
                // Roll back only our own entry; an event may have resolved
                // it and a newer command may already occupy the slot.
                if state
                    .pending
                    .get(node_id)
                    .map(|op| op.op_id == op_id)
                    .unwrap_or(false)
                {
                    state.pending.remove(node_id);
                }
                drop(state);
                self.sink.publish(NotificationIntent::new(
                    Severity::Error,
                    TITLE_OP_FAILED,
                    format!("{node_name}: failed to send command"),
                    Some(node_id.to_string()),
                ));
                Err(DispatchError::Transport(err))
            }
        }
    }

    /// Trigger a fleet-wide rule sync.
    ///
    /// Single-flight across the whole fleet: rejected while a wave is
    /// outstanding. Nodes that already have a pending operation are left to
    /// resolve it on their own and are not marked for this wave. The outcome
    /// is reported asynchronously through the event stream.
    pub async fn trigger_sync(&self) -> Result<SyncEpoch, DispatchError> {
        let epoch;
        {
            let mut state = self.state.lock().await;
            if state.sync.active().is_some() {
                return Err(DispatchError::SyncInFlight);
            }
            let now = Utc::now();
            epoch = state.sync.begin(now);
            let eligible: Vec<String> = state
                .registry
                .all()
                .map(|n| n.id.clone())
                .filter(|id| !state.pending.contains_key(id))
                .collect();
            for node_id in &eligible {
                state.push_pending(node_id, OperationKind::Sync { epoch }, now);
            }
            info!(epoch, nodes = eligible.len(), "dispatching fleet-wide rule sync");
        }

        match self.transport.trigger_sync().await {
            Ok(()) => Ok(epoch),
            Err(err) => {
                let mut state = self.state.lock().await;
                state.pending.retain(
                    |_, op| !matches!(op.kind, OperationKind::Sync { epoch: e } if e == epoch),
                );
                if state.sync.is_active_epoch(epoch) {
                    state.sync.clear();
                }
                drop(state);
                self.sink.publish(NotificationIntent::new(
                    Severity::Error,
                    TITLE_OP_FAILED,
                    "failed to issue fleet sync".to_string(),
                    None,
                ));
                Err(DispatchError::Transport(err))
            }
        }
    }

    /// Apply one inbound event and surface at most one notification.
    pub async fn ingest(&self, event: FleetEvent) {
        debug!(kind = event.kind(), node_id = %event.node().id, "event received");
        let intent = self.state.lock().await.reconcile(&event, Utc::now());
        if let Some(intent) = intent {
            self.sink.publish(intent);
        }
    }

    /// Clear pending operations that outlived their timeout, surfacing each
    /// as if the node had reported an error. Also enforces the global sync
    /// ceiling so the fleet indicator cannot stick on.
    pub async fn cancel_stale(&self) {
        let now = Utc::now();
        let mut intents = Vec::new();
        {
            let mut state = self.state.lock().await;
            let expired: Vec<String> = state
                .pending
                .values()
                .filter(|op| op.age(now) > self.config.pending_timeout)
                .map(|op| op.node_id.clone())
                .collect();
            for node_id in expired {
                warn!(node_id = %node_id, "pending operation timed out, synthesizing error");
                let event = FleetEvent::NodeUpdate(NodeUpdate::error(&node_id, TIMEOUT_MESSAGE));
                if let Some(intent) = state.reconcile(&event, now) {
                    intents.push(intent);
                }
            }
            if let Some(active) = state.sync.active() {
                if now - active.started_at > self.config.sync_timeout {
                    warn!(epoch = active.epoch, "fleet sync exceeded ceiling, clearing");
                    state.pending.retain(|_, op| {
                        !matches!(op.kind, OperationKind::Sync { epoch } if epoch == active.epoch)
                    });
                    state.sync.clear();
                }
            }
        }
        for intent in intents {
            self.sink.publish(intent);
        }
    }

    // ── Read-only snapshots ────────────────────────────────

    pub async fn nodes(&self) -> Vec<NodeView> {
        let state = self.state.lock().await;
        state
            .registry
            .all()
            .map(|node| {
                let pending = state.pending.get(&node.id);
                let display_active = match pending.map(|op| op.kind) {
                    Some(OperationKind::Toggle { desired }) => desired,
                    _ => node.firewall_status == FirewallStatus::Active,
                };
                NodeView {
                    id: node.id.clone(),
                    name: node.name.clone(),
                    ip: node.ip.clone(),
                    os: node.os,
                    connectivity: node.connectivity,
                    firewall_status: node.firewall_status,
                    firewall_error: node.firewall_error.clone(),
                    firewall_info: node.firewall_info.clone(),
                    display_active,
                    pending_operation: pending.map(|op| op.kind.label().to_string()),
                    first_seen: node.first_seen,
                    last_seen: node.last_seen,
                }
            })
            .collect()
    }

    pub async fn pending_ops(&self) -> Vec<PendingView> {
        let now = Utc::now();
        let state = self.state.lock().await;
        let mut views: Vec<PendingView> = state
            .pending
            .values()
            .map(|op| PendingView {
                node_id: op.node_id.clone(),
                kind: op.kind.label().to_string(),
                desired: match op.kind {
                    OperationKind::Toggle { desired } => Some(desired),
                    OperationKind::Sync { .. } => None,
                },
                sync_epoch: match op.kind {
                    OperationKind::Sync { epoch } => Some(epoch),
                    OperationKind::Toggle { .. } => None,
                },
                issued_at: op.issued_at,
                age_secs: op.age(now).num_seconds(),
            })
            .collect();
        views.sort_by(|a, b| a.issued_at.cmp(&b.issued_at));
        views
    }

    pub async fn summary(&self) -> FleetSummary {
        let state = self.state.lock().await;
        FleetSummary {
            total_nodes: state.registry.len(),
            online_nodes: state.registry.online_count(),
            pending_operations: state.pending.len(),
            syncing: state.sync.active().is_some(),
            sync_epoch: state.sync.active().map(|a| a.epoch),
        }
    }
}

impl FleetState {
    fn push_pending(&mut self, node_id: &str, kind: OperationKind, now: DateTime<Utc>) -> u64 {
        self.next_op_id += 1;
        self.pending.insert(
            node_id.to_string(),
            PendingOperation {
                op_id: self.next_op_id,
                node_id: node_id.to_string(),
                kind,
                issued_at: now,
            },
        );
        self.next_op_id
    }

    /// The event ingestion state machine.
    ///
    /// The "was syncing" snapshot is taken before anything mutates, so a
    /// late event cannot be attributed to a sync wave that started after it
    /// was already in the pipeline.
    fn reconcile(&mut self, event: &FleetEvent, now: DateTime<Utc>) -> Option<NotificationIntent> {
        let update = event.node();
        let was_syncing = self.sync.active().is_some();

        let Some(node) = self.registry.upsert(update, now) else {
            warn!("dropping event without node id");
            return None;
        };
        let node_name = node.name.clone();

        // Any status-bearing event resolves the node's pending operation,
        // whether or not it matches the kind that was pending.
        let resolved = if update.firewall_status.is_some() {
            self.pending.remove(&update.id)
        } else {
            None
        };
        if let Some(op) = &resolved {
            if let OperationKind::Sync { epoch } = op.kind {
                let wave_done = self.sync.is_active_epoch(epoch)
                    && !self
                        .pending
                        .values()
                        .any(|p| matches!(p.kind, OperationKind::Sync { epoch: e } if e == epoch));
                if wave_done {
                    debug!(epoch, "last node of sync wave resolved");
                    self.sync.clear();
                }
            }
        }
        if event.is_sync_complete() {
            self.sync.clear();
        }

        // Events that carry no firewall state never notify and leave the
        // dedup key untouched.
        let status = update.firewall_status?;

        let error = update.firewall_error.clone().unwrap_or_default();
        let info = update.firewall_info.clone().unwrap_or_default();
        let previous = self.dedup.get(&update.id);
        let status_changed = previous.map(|k| k.status != status).unwrap_or(true);
        let error_changed = !error.is_empty() && previous.map(|k| k.error != error).unwrap_or(true);
        let info_changed = !info.is_empty() && previous.map(|k| k.info != info).unwrap_or(true);

        // Decision table, first match wins.
        let intent = if status == FirewallStatus::Error
            && (status_changed || error_changed || was_syncing)
        {
            let message = if error.is_empty() {
                GENERIC_FIREWALL_ERROR.to_string()
            } else {
                error.clone()
            };
            Some(NotificationIntent::new(
                Severity::Error,
                TITLE_OP_FAILED,
                format!("{node_name}: {message}"),
                Some(update.id.clone()),
            ))
        } else if info_changed
            && status == FirewallStatus::Active
            && !was_syncing
            && resolved.is_none()
        {
            // The node changed state on its own initiative; operator-issued
            // commands already produced their acceptance feedback.
            Some(NotificationIntent::new(
                Severity::Success,
                TITLE_OP_SUCCEEDED,
                info.clone(),
                Some(update.id.clone()),
            ))
        } else if event.is_sync_complete() && was_syncing {
            let message = if info.is_empty() {
                SYNC_SUCCESS_MESSAGE.to_string()
            } else {
                info.clone()
            };
            Some(NotificationIntent::new(
                Severity::Success,
                TITLE_OP_SUCCEEDED,
                message,
                None,
            ))
        } else {
            None
        };

        // Remember what we last saw so an identical repeat stays quiet.
        self.dedup.insert(
            update.id.clone(),
            DedupKey {
                status,
                error,
                info,
            },
        );

        intent
    }
}

/// Drain the inbound event channel, one event at a time, in arrival order.
pub async fn run_reconciler(service: Arc<FleetService>, mut events: mpsc::Receiver<FleetEvent>) {
    info!("reconciler loop started");
    while let Some(event) = events.recv().await {
        service.ingest(event).await;
    }
    info!("event channel closed, reconciler loop stopped");
}

/// Periodically sweep for pending operations that outlived their timeout.
pub async fn run_stale_sweeper(service: Arc<FleetService>, interval_secs: u64) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
    // The first tick fires immediately; nothing can be stale yet.
    interval.tick().await;
    loop {
        interval.tick().await;
        service.cancel_stale().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::Connectivity;
    use crate::domain::notify::NotificationLog;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct MockTransport {
        commands: StdMutex<Vec<(String, NodeCommand)>>,
        syncs: AtomicUsize,
        fail_commands: AtomicBool,
        fail_sync: AtomicBool,
    }

    impl MockTransport {
        fn sent_commands(&self) -> Vec<(String, NodeCommand)> {
            self.commands.lock().unwrap().clone()
        }

        fn refuse(status: u16) -> UpstreamError {
            UpstreamError::Status {
                status,
                message: "bad gateway".into(),
            }
        }
    }

    #[async_trait]
    impl CommandTransport for MockTransport {
        async fn send_command(
            &self,
            node_id: &str,
            command: NodeCommand,
        ) -> Result<(), UpstreamError> {
            if self.fail_commands.load(Ordering::SeqCst) {
                return Err(Self::refuse(502));
            }
            self.commands
                .lock()
                .unwrap()
                .push((node_id.to_string(), command));
            Ok(())
        }

        async fn trigger_sync(&self) -> Result<(), UpstreamError> {
            if self.fail_sync.load(Ordering::SeqCst) {
                return Err(Self::refuse(502));
            }
            self.syncs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn harness() -> (Arc<FleetService>, Arc<MockTransport>, Arc<NotificationLog>) {
        harness_with(ReconcilerConfig::default())
    }

    fn harness_with(
        config: ReconcilerConfig,
    ) -> (Arc<FleetService>, Arc<MockTransport>, Arc<NotificationLog>) {
        let transport = Arc::new(MockTransport::default());
        let log = Arc::new(NotificationLog::new(100));
        let service = Arc::new(FleetService::new(
            transport.clone(),
            log.clone(),
            config,
        ));
        (service, transport, log)
    }

    async fn seed(service: &FleetService, ids: &[&str]) {
        let updates = ids
            .iter()
            .map(|id| NodeUpdate {
                id: id.to_string(),
                connectivity: Some(Connectivity::Online),
                ..NodeUpdate::default()
            })
            .collect();
        service.prime(updates).await;
    }

    fn status_update(id: &str, status: FirewallStatus, info: Option<&str>) -> NodeUpdate {
        NodeUpdate {
            id: id.to_string(),
            firewall_status: Some(status),
            firewall_info: info.map(str::to_string),
            ..NodeUpdate::default()
        }
    }

    fn count(log: &NotificationLog, severity: Severity) -> usize {
        log.snapshot()
            .iter()
            .filter(|n| n.severity == severity)
            .count()
    }

    #[tokio::test]
    async fn at_most_one_pending_per_node() {
        let (service, transport, _log) = harness();
        seed(&service, &["a"]).await;

        service.toggle_firewall("a", true).await.unwrap();
        let err = service.toggle_firewall("a", false).await.unwrap_err();
        assert!(matches!(err, DispatchError::OperationInFlight(_)));
        assert_eq!(transport.sent_commands().len(), 1);

        // The confirming event frees the slot.
        service
            .ingest(FleetEvent::NodeUpdate(status_update(
                "a",
                FirewallStatus::Active,
                None,
            )))
            .await;
        service.toggle_firewall("a", false).await.unwrap();
        assert_eq!(transport.sent_commands().len(), 2);
    }

    #[tokio::test]
    async fn unknown_node_is_rejected() {
        let (service, transport, _log) = harness();
        let err = service.toggle_firewall("ghost", true).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownNode(_)));
        assert!(transport.sent_commands().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_rolls_back_pending() {
        let (service, transport, log) = harness();
        seed(&service, &["a"]).await;

        transport.fail_commands.store(true, Ordering::SeqCst);
        let err = service.toggle_firewall("a", true).await.unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
        assert_eq!(count(&log, Severity::Error), 1);

        // Node is immediately retryable.
        transport.fail_commands.store(false, Ordering::SeqCst);
        service.toggle_firewall("a", true).await.unwrap();
        assert_eq!(service.pending_ops().await.len(), 1);
    }

    #[tokio::test]
    async fn sync_is_single_flight() {
        let (service, transport, _log) = harness();
        seed(&service, &["a", "b"]).await;

        let first = service.trigger_sync().await.unwrap();
        assert!(matches!(
            service.trigger_sync().await.unwrap_err(),
            DispatchError::SyncInFlight
        ));
        assert_eq!(transport.syncs.load(Ordering::SeqCst), 1);

        for id in ["a", "b"] {
            service
                .ingest(FleetEvent::NodeUpdate(status_update(
                    id,
                    FirewallStatus::Active,
                    None,
                )))
                .await;
        }
        assert!(!service.summary().await.syncing);

        let second = service.trigger_sync().await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn sync_transport_failure_clears_wave() {
        let (service, transport, log) = harness();
        seed(&service, &["a", "b"]).await;

        transport.fail_sync.store(true, Ordering::SeqCst);
        assert!(matches!(
            service.trigger_sync().await.unwrap_err(),
            DispatchError::Transport(_)
        ));
        let summary = service.summary().await;
        assert!(!summary.syncing);
        assert_eq!(summary.pending_operations, 0);
        assert_eq!(count(&log, Severity::Error), 1);

        transport.fail_sync.store(false, Ordering::SeqCst);
        service.trigger_sync().await.unwrap();
    }

    #[tokio::test]
    async fn sync_skips_nodes_with_pending_operations() {
        let (service, _transport, _log) = harness();
        seed(&service, &["a", "b"]).await;

        service.toggle_firewall("a", true).await.unwrap();
        service.trigger_sync().await.unwrap();

        // Only b carries a sync marker; a keeps its toggle.
        let ops = service.pending_ops().await;
        let a = ops.iter().find(|o| o.node_id == "a").unwrap();
        let b = ops.iter().find(|o| o.node_id == "b").unwrap();
        assert_eq!(a.kind, "toggle");
        assert_eq!(b.kind, "sync");

        // b resolving finishes the wave even though a is still pending.
        service
            .ingest(FleetEvent::NodeUpdate(status_update(
                "b",
                FirewallStatus::Active,
                None,
            )))
            .await;
        assert!(!service.summary().await.syncing);
        assert_eq!(service.pending_ops().await.len(), 1);
    }

    #[tokio::test]
    async fn identical_events_notify_once() {
        let (service, _transport, log) = harness();
        seed(&service, &["a"]).await;

        let event = NodeUpdate::error("a", "iptables: chain missing");
        service
            .ingest(FleetEvent::NodeUpdate(event.clone()))
            .await;
        service.ingest(FleetEvent::NodeUpdate(event)).await;

        assert_eq!(count(&log, Severity::Error), 1);
    }

    #[tokio::test]
    async fn toggle_confirmation_is_quiet() {
        let (service, _transport, log) = harness();
        seed(&service, &["a"]).await;

        service.toggle_firewall("a", true).await.unwrap();
        assert_eq!(count(&log, Severity::Info), 1); // the acceptance ack

        service
            .ingest(FleetEvent::NodeUpdate(status_update(
                "a",
                FirewallStatus::Active,
                Some("rules applied"),
            )))
            .await;

        // The expected resolution of an operator toggle adds nothing.
        assert_eq!(count(&log, Severity::Success), 0);
        assert_eq!(count(&log, Severity::Error), 0);
        assert!(service.pending_ops().await.is_empty());
    }

    #[tokio::test]
    async fn background_change_notifies_once() {
        let (service, _transport, log) = harness();
        seed(&service, &["a"]).await;

        let event = status_update("a", FirewallStatus::Active, Some("self-recovered, 12 rules"));
        service.ingest(FleetEvent::NodeUpdate(event.clone())).await;
        assert_eq!(count(&log, Severity::Success), 1);

        service.ingest(FleetEvent::NodeUpdate(event)).await;
        assert_eq!(count(&log, Severity::Success), 1);
    }

    #[tokio::test]
    async fn sync_success_emitted_once_per_wave() {
        let (service, _transport, log) = harness();
        seed(&service, &["a", "b"]).await;
        service.trigger_sync().await.unwrap();

        // Per-node confirmation during the wave: no individual toast.
        service
            .ingest(FleetEvent::NodeUpdate(status_update(
                "a",
                FirewallStatus::Active,
                Some("42 rules applied"),
            )))
            .await;
        assert_eq!(count(&log, Severity::Success), 0);

        service
            .ingest(FleetEvent::SyncComplete(status_update(
                "b",
                FirewallStatus::Active,
                Some("42 rules applied"),
            )))
            .await;
        assert_eq!(count(&log, Severity::Success), 1);

        // Stragglers after the wave closed stay quiet.
        service
            .ingest(FleetEvent::SyncComplete(status_update(
                "a",
                FirewallStatus::Active,
                Some("42 rules applied"),
            )))
            .await;
        assert_eq!(count(&log, Severity::Success), 1);
    }

    #[tokio::test]
    async fn sync_error_names_node_and_message() {
        let (service, _transport, log) = harness();
        seed(&service, &["a", "b"]).await;
        service.trigger_sync().await.unwrap();

        service
            .ingest(FleetEvent::NodeUpdate(status_update(
                "a",
                FirewallStatus::Active,
                None,
            )))
            .await;
        assert!(service.summary().await.syncing);

        service
            .ingest(FleetEvent::NodeUpdate(NodeUpdate::error(
                "b",
                "agent unreachable",
            )))
            .await;

        let errors: Vec<_> = log
            .snapshot()
            .into_iter()
            .filter(|n| n.severity == Severity::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("agent unreachable"));
        assert!(errors[0].message.contains('b'));
        // b was the last outstanding node, so the wave is resolved.
        assert!(!service.summary().await.syncing);
    }

    #[tokio::test]
    async fn error_without_message_gets_generic_text() {
        let (service, _transport, log) = harness();
        seed(&service, &["a"]).await;

        service
            .ingest(FleetEvent::NodeUpdate(status_update(
                "a",
                FirewallStatus::Error,
                None,
            )))
            .await;
        let errors = log.snapshot();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains(GENERIC_FIREWALL_ERROR));
    }

    #[tokio::test]
    async fn connectivity_update_leaves_pending_alone() {
        let (service, _transport, log) = harness();
        seed(&service, &["a"]).await;
        service.toggle_firewall("a", true).await.unwrap();

        service
            .ingest(FleetEvent::NodeUpdate(NodeUpdate {
                id: "a".into(),
                connectivity: Some(Connectivity::Warning),
                ..NodeUpdate::default()
            }))
            .await;

        assert_eq!(service.pending_ops().await.len(), 1);
        assert_eq!(count(&log, Severity::Error), 0);
        assert_eq!(count(&log, Severity::Success), 0);
    }

    #[tokio::test]
    async fn stale_operation_times_out_with_one_error() {
        let (service, _transport, log) = harness_with(ReconcilerConfig {
            pending_timeout: Duration::zero(),
            sync_timeout: Duration::seconds(120),
        });
        seed(&service, &["a"]).await;
        service.toggle_firewall("a", true).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        service.cancel_stale().await;

        assert!(service.pending_ops().await.is_empty());
        let errors: Vec<_> = log
            .snapshot()
            .into_iter()
            .filter(|n| n.severity == Severity::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("timed out"));

        // A second sweep finds nothing left to cancel.
        service.cancel_stale().await;
        assert_eq!(count(&log, Severity::Error), 1);
    }

    #[tokio::test]
    async fn sync_ceiling_clears_stuck_wave() {
        let (service, _transport, _log) = harness_with(ReconcilerConfig {
            pending_timeout: Duration::seconds(3600),
            sync_timeout: Duration::zero(),
        });
        seed(&service, &["a", "b"]).await;
        service.trigger_sync().await.unwrap();
        assert!(service.summary().await.syncing);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        service.cancel_stale().await;

        let summary = service.summary().await;
        assert!(!summary.syncing);
        assert_eq!(summary.pending_operations, 0);
        service.trigger_sync().await.unwrap();
    }

    #[tokio::test]
    async fn optimistic_display_falls_back_on_rollback() {
        let (service, transport, _log) = harness();
        seed(&service, &["a"]).await;

        service.toggle_firewall("a", true).await.unwrap();
        let view = &service.nodes().await[0];
        assert!(view.display_active);
        assert_eq!(view.firewall_status, FirewallStatus::Inactive);

        // Resolve, then fail the next dispatch: display must track the
        // confirmed state again.
        service
            .ingest(FleetEvent::NodeUpdate(status_update(
                "a",
                FirewallStatus::Inactive,
                None,
            )))
            .await;
        transport.fail_commands.store(true, Ordering::SeqCst);
        let _ = service.toggle_firewall("a", true).await;
        let view = &service.nodes().await[0];
        assert!(!view.display_active);
    }

    #[tokio::test]
    async fn prime_suppresses_startup_repeats() {
        let (service, _transport, log) = harness();
        service
            .prime(vec![NodeUpdate {
                id: "a".into(),
                firewall_status: Some(FirewallStatus::Error),
                firewall_error: Some("agent unreachable".into()),
                ..NodeUpdate::default()
            }])
            .await;
        assert!(log.is_empty());

        // The stream replaying the same state stays quiet.
        service
            .ingest(FleetEvent::NodeUpdate(NodeUpdate::error(
                "a",
                "agent unreachable",
            )))
            .await;
        assert_eq!(count(&log, Severity::Error), 0);
    }
}
