//! Typed HTTP client for the palisade daemon's console REST API.

use anyhow::{bail, Context, Result};
use reqwest::Client;

use crate::domain::node::NodeCommand;
use crate::domain::notify::NotificationIntent;
use crate::domain::rules::{AccessRule, RuleDuration, RuleKind};
use crate::domain::types::{CommandAccepted, DaemonHealth, NodeView, PendingView, SyncAccepted};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:9370";

pub struct ConsoleClient {
    base_url: String,
    http: Client,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct CommandBody<'a> {
    node_id: &'a str,
    command: NodeCommand,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRuleBody<'a> {
    pub ip: &'a str,
    #[serde(rename = "type")]
    pub kind: RuleKind,
    pub reason: Option<&'a str>,
    pub duration: &'a str,
}

impl ConsoleClient {
    pub fn new(base_url: Option<&str>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            http,
        })
    }

    pub async fn health(&self) -> Result<DaemonHealth> {
        self.get("/health").await
    }

    pub async fn nodes(&self) -> Result<Vec<NodeView>> {
        self.get("/api/v1/nodes").await
    }

    pub async fn pending(&self) -> Result<Vec<PendingView>> {
        self.get("/api/v1/nodes/pending").await
    }

    pub async fn notifications(&self) -> Result<Vec<NotificationIntent>> {
        self.get("/api/v1/notifications").await
    }

    pub async fn toggle_firewall(&self, node_id: &str, enable: bool) -> Result<CommandAccepted> {
        self.post(
            "/api/v1/nodes/command",
            Some(&CommandBody {
                node_id,
                command: NodeCommand::for_state(enable),
            }),
        )
        .await
    }

    pub async fn trigger_sync(&self) -> Result<SyncAccepted> {
        self.post("/api/v1/access-rules/sync", None::<&()>).await
    }

    pub async fn rules(&self) -> Result<Vec<AccessRule>> {
        self.get("/api/v1/access-rules").await
    }

    pub async fn add_rule(
        &self,
        ip: &str,
        kind: RuleKind,
        reason: Option<&str>,
        duration: RuleDuration,
    ) -> Result<AccessRule> {
        let duration = match duration {
            RuleDuration::Permanent => "permanent",
            RuleDuration::OneHour => "1h",
            RuleDuration::OneDay => "24h",
            RuleDuration::OneWeek => "7d",
        };
        self.post(
            "/api/v1/access-rules",
            Some(&NewRuleBody {
                ip,
                kind,
                reason,
                duration,
            }),
        )
        .await
    }

    pub async fn delete_rule(&self, id: &str) -> Result<()> {
        let url = format!("{}/api/v1/access-rules/{}", self.base_url, id);
        let resp = self
            .http
            .delete(&url)
            .send()
            .await
            .with_context(|| format!("DELETE {}", url))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("{} returned {}: {}", url, status, body.trim());
        }
        Ok(())
    }

    // ── Internal helpers ───────────────────────────────────

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("{} returned {}: {}", url, status, body.trim());
        }

        resp.json()
            .await
            .with_context(|| format!("parsing response from {}", url))
    }

    async fn post<T: serde::de::DeserializeOwned, B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.http.post(&url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let resp = builder
            .send()
            .await
            .with_context(|| format!("POST {}", url))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("{} returned {}: {}", url, status, body.trim());
        }

        resp.json()
            .await
            .with_context(|| format!("parsing response from {}", url))
    }
}
