//! Typed HTTP client for the fleet controller.
//!
//! Carries command issuance, the access-rule CRUD boundary, and the event
//! stream subscription. Every request sends the cached bearer credential; a
//! 401 invalidates it so the next caller sees `AuthRequired` and can trigger
//! re-authentication upstream.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

use crate::config::ControllerConfig;
use crate::domain::engine::CommandTransport;
use crate::domain::node::{NodeCommand, NodeUpdate};
use crate::domain::rules::{AccessRule, NewAccessRule};

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("authentication required (credential rejected by controller)")]
    AuthRequired,
    #[error("forbidden by controller")]
    Forbidden,
    #[error("not found on controller")]
    NotFound,
    #[error("controller returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("controller request failed: {0}")]
    Network(#[from] reqwest::Error),
}

pub struct ControllerClient {
    base_url: String,
    http: Client,
    token: RwLock<Option<String>>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct CommandRequest<'a> {
    node_id: &'a str,
    command: NodeCommand,
}

impl ControllerClient {
    pub fn new(config: &ControllerConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("building controller HTTP client")?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            token: RwLock::new(config.token.clone()),
        })
    }

    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    /// Fetch the current fleet snapshot (used to prime the registry at
    /// startup; steady-state updates arrive over the event stream).
    pub async fn list_nodes(&self) -> Result<Vec<NodeUpdate>, UpstreamError> {
        let resp = self.send(Method::GET, "/api/v1/nodes", None::<&()>).await?;
        Ok(resp.json().await?)
    }

    pub async fn send_command(
        &self,
        node_id: &str,
        command: NodeCommand,
    ) -> Result<(), UpstreamError> {
        self.send(
            Method::POST,
            "/api/v1/nodes/command",
            Some(&CommandRequest { node_id, command }),
        )
        .await?;
        Ok(())
    }

    pub async fn trigger_sync(&self) -> Result<(), UpstreamError> {
        self.send(Method::POST, "/api/v1/access-rules/sync", None::<&()>)
            .await?;
        Ok(())
    }

    pub async fn list_rules(&self) -> Result<Vec<AccessRule>, UpstreamError> {
        let resp = self
            .send(Method::GET, "/api/v1/access-rules", None::<&()>)
            .await?;
        Ok(resp.json().await?)
    }

    pub async fn create_rule(&self, rule: &NewAccessRule) -> Result<AccessRule, UpstreamError> {
        let resp = self
            .send(Method::POST, "/api/v1/access-rules", Some(rule))
            .await?;
        Ok(resp.json().await?)
    }

    pub async fn delete_rule(&self, id: &str) -> Result<(), UpstreamError> {
        self.send(
            Method::DELETE,
            &format!("/api/v1/access-rules/{id}"),
            None::<&()>,
        )
        .await?;
        Ok(())
    }

    /// Open the push channel: a streaming response emitting one JSON event
    /// per line. The caller owns reconnection.
    pub async fn open_event_stream(&self) -> Result<Response, UpstreamError> {
        let request = self.authed(self.http.get(self.url("/api/v1/events"))).await;
        let resp = request.send().await?;
        self.check(resp).await
    }

    // ── Internal helpers ───────────────────────────────────

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.token.read().await.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<B: serde::Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, UpstreamError> {
        let mut builder = self.http.request(method, self.url(path));
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let resp = self.authed(builder).await.send().await?;
        self.check(resp).await
    }

    async fn check(&self, resp: Response) -> Result<Response, UpstreamError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::UNAUTHORIZED {
            warn!("controller rejected credential, clearing cached token");
            self.set_token(None).await;
            return Err(UpstreamError::AuthRequired);
        }
        if status == StatusCode::FORBIDDEN {
            return Err(UpstreamError::Forbidden);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(UpstreamError::NotFound);
        }
        let message = resp
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(200)
            .collect();
        Err(UpstreamError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl CommandTransport for ControllerClient {
    async fn send_command(&self, node_id: &str, command: NodeCommand) -> Result<(), UpstreamError> {
        ControllerClient::send_command(self, node_id, command).await
    }

    async fn trigger_sync(&self) -> Result<(), UpstreamError> {
        ControllerClient::trigger_sync(self).await
    }
}
