use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

use crate::domain::engine::{DispatchError, FleetService};
use crate::domain::node::NodeCommand;
use crate::domain::notify::{NotificationIntent, NotificationLog};
use crate::domain::rules::{self, AccessRule, NewAccessRule, RuleDuration, RuleKind};
use crate::domain::types::{CommandAccepted, DaemonHealth, NodeView, PendingView, SyncAccepted};
use crate::upstream::{ControllerClient, UpstreamError};

/// Shared application state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub fleet: Arc<FleetService>,
    pub upstream: Arc<ControllerClient>,
    pub notifications: Arc<NotificationLog>,
    pub instance: String,
    pub started_at: Instant,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/nodes", get(nodes))
        .route("/api/v1/nodes/pending", get(pending))
        .route("/api/v1/nodes/command", post(node_command))
        .route("/api/v1/notifications", get(notifications))
        // Access-rule boundary (validated here, stored on the controller)
        .route("/api/v1/access-rules", get(list_rules).post(create_rule))
        .route("/api/v1/access-rules/{id}", delete(delete_rule))
        .route("/api/v1/access-rules/sync", post(trigger_sync))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<DaemonHealth> {
    Json(DaemonHealth {
        version: env!("CARGO_PKG_VERSION").to_string(),
        instance: state.instance.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        fleet: state.fleet.summary().await,
    })
}

async fn nodes(State(state): State<AppState>) -> Json<Vec<NodeView>> {
    Json(state.fleet.nodes().await)
}

async fn pending(State(state): State<AppState>) -> Json<Vec<PendingView>> {
    Json(state.fleet.pending_ops().await)
}

async fn notifications(State(state): State<AppState>) -> Json<Vec<NotificationIntent>> {
    Json(state.notifications.snapshot())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommandRequest {
    node_id: String,
    command: NodeCommand,
}

async fn node_command(
    State(state): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<CommandAccepted>, (StatusCode, String)> {
    let enable = req.command == NodeCommand::EnableFirewall;
    state
        .fleet
        .toggle_firewall(&req.node_id, enable)
        .await
        .map(|command| {
            Json(CommandAccepted {
                node_id: req.node_id,
                command: command.to_string(),
            })
        })
        .map_err(dispatch_error)
}

async fn trigger_sync(
    State(state): State<AppState>,
) -> Result<Json<SyncAccepted>, (StatusCode, String)> {
    state
        .fleet
        .trigger_sync()
        .await
        .map(|epoch| Json(SyncAccepted { epoch }))
        .map_err(dispatch_error)
}

async fn list_rules(
    State(state): State<AppState>,
) -> Result<Json<Vec<AccessRule>>, (StatusCode, String)> {
    state
        .upstream
        .list_rules()
        .await
        .map(Json)
        .map_err(upstream_error)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewRuleRequest {
    ip: String,
    #[serde(rename = "type")]
    kind: RuleKind,
    reason: Option<String>,
    duration: Option<String>,
}

async fn create_rule(
    State(state): State<AppState>,
    Json(req): Json<NewRuleRequest>,
) -> Result<Json<AccessRule>, (StatusCode, String)> {
    // Reject malformed targets before anything touches the network.
    rules::validate_target(&req.ip)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    let duration = match req.duration.as_deref() {
        None => RuleDuration::Permanent,
        Some(d) => d
            .parse()
            .map_err(|e: String| (StatusCode::UNPROCESSABLE_ENTITY, e))?,
    };

    let rule = NewAccessRule::operator(
        &req.ip,
        req.kind,
        req.reason.as_deref(),
        duration,
        Utc::now(),
    );
    state
        .upstream
        .create_rule(&rule)
        .await
        .map(Json)
        .map_err(upstream_error)
}

async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .upstream
        .delete_rule(&id)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(upstream_error)
}

fn dispatch_error(err: DispatchError) -> (StatusCode, String) {
    let status = match &err {
        DispatchError::UnknownNode(_) => StatusCode::NOT_FOUND,
        DispatchError::OperationInFlight(_) | DispatchError::SyncInFlight => StatusCode::CONFLICT,
        DispatchError::Transport(UpstreamError::AuthRequired) => StatusCode::UNAUTHORIZED,
        DispatchError::Transport(_) => StatusCode::BAD_GATEWAY,
    };
    (status, err.to_string())
}

fn upstream_error(err: UpstreamError) -> (StatusCode, String) {
    let status = match &err {
        UpstreamError::AuthRequired => StatusCode::UNAUTHORIZED,
        UpstreamError::Forbidden => StatusCode::FORBIDDEN,
        UpstreamError::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, err.to_string())
}
