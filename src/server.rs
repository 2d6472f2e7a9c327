use anyhow::{Context, Result};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use chrono::Duration;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::graphql::{self, PalisadeSchema};
use crate::api::rest::{self, AppState};
use crate::config::DaemonConfig;
use crate::domain::engine::{self, FleetService, ReconcilerConfig};
use crate::domain::notify::NotificationLog;
use crate::stream;
use crate::upstream::ControllerClient;

pub async fn run(config: DaemonConfig) -> Result<()> {
    // Init tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();

    let instance = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        instance = %instance,
        controller = %config.controller.base_url,
        "Palisade console daemon starting"
    );

    // Create shared services
    let upstream = Arc::new(ControllerClient::new(&config.controller)?);
    let notifications = Arc::new(NotificationLog::new(config.notifications.history_limit));
    let fleet = Arc::new(FleetService::new(
        upstream.clone(),
        notifications.clone(),
        ReconcilerConfig {
            pending_timeout: Duration::seconds(config.reconciler.pending_timeout_secs as i64),
            sync_timeout: Duration::seconds(config.reconciler.sync_timeout_secs as i64),
        },
    ));

    // Prime the registry from the controller snapshot (startup; the event
    // stream keeps it current from here on)
    match upstream.list_nodes().await {
        Ok(nodes) => fleet.prime(nodes).await,
        Err(e) => warn!(error = %e, "initial fleet snapshot failed, starting empty"),
    }

    let app_state = AppState {
        fleet: fleet.clone(),
        upstream: upstream.clone(),
        notifications: notifications.clone(),
        instance,
        started_at: Instant::now(),
    };

    // Build GraphQL schema
    let schema = graphql::build_schema(fleet.clone(), upstream.clone(), notifications.clone());

    // Build GraphQL sub-router with its own state
    let graphql_router = Router::new()
        .route("/graphql", get(graphql_playground).post(graphql_handler))
        .with_state(schema);

    // Build Axum router: REST (with AppState) + GraphQL (with schema state)
    let app = rest::router(app_state)
        .merge(graphql_router)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // Bind HTTP listener
    let http_addr = &config.http_addr;
    let listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("binding to {}", http_addr))?;

    info!(addr = %http_addr, "console API listening");

    // The single reconciliation task draining the bounded event channel
    let (event_tx, event_rx) = mpsc::channel(config.reconciler.channel_capacity.max(1));
    {
        let fleet = fleet.clone();
        tokio::spawn(async move {
            engine::run_reconciler(fleet, event_rx).await;
        });
    }

    // Event stream pump (controller push channel → reconciler channel)
    {
        let upstream = upstream.clone();
        tokio::spawn(async move {
            stream::run_pump(upstream, event_tx).await;
        });
    }

    // Stale pending-operation sweeper
    if config.reconciler.stale_check_interval_secs > 0 {
        let fleet = fleet.clone();
        let interval = config.reconciler.stale_check_interval_secs;
        tokio::spawn(async move {
            engine::run_stale_sweeper(fleet, interval).await;
        });
    }

    // Run HTTP server with graceful shutdown
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Palisade console daemon stopped");
    Ok(())
}

async fn graphql_playground() -> Html<String> {
    Html(async_graphql::http::playground_source(
        async_graphql::http::GraphQLPlaygroundConfig::new("/graphql"),
    ))
}

async fn graphql_handler(
    State(schema): State<PalisadeSchema>,
    req: GraphQLRequest,
) -> GraphQLResponse {
    schema.execute(req.into_inner()).await.into()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("Received Ctrl+C, shutting down"); },
        _ = terminate => { info!("Received SIGTERM, shutting down"); },
    }
}
