use async_graphql::{Context, EmptySubscription, Object, Schema};
use std::sync::Arc;

use crate::domain::engine::FleetService;
use crate::domain::notify::{NotificationIntent, NotificationLog};
use crate::domain::rules::{AccessRule, RuleKind};
use crate::domain::types::{FleetSummary, NodeView, PendingView, SyncAccepted};
use crate::upstream::ControllerClient;

pub type PalisadeSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn fleet(&self, ctx: &Context<'_>) -> async_graphql::Result<FleetSummary> {
        let fleet = ctx.data::<Arc<FleetService>>()?;
        Ok(fleet.summary().await)
    }

    async fn nodes(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<NodeView>> {
        let fleet = ctx.data::<Arc<FleetService>>()?;
        Ok(fleet.nodes().await)
    }

    /// Operations still waiting for the node to report back.
    async fn pending_operations(
        &self,
        ctx: &Context<'_>,
    ) -> async_graphql::Result<Vec<PendingView>> {
        let fleet = ctx.data::<Arc<FleetService>>()?;
        Ok(fleet.pending_ops().await)
    }

    async fn notifications(
        &self,
        ctx: &Context<'_>,
    ) -> async_graphql::Result<Vec<NotificationIntent>> {
        let log = ctx.data::<Arc<NotificationLog>>()?;
        Ok(log.snapshot())
    }

    /// Access rules as stored on the controller, optionally filtered by kind.
    async fn access_rules(
        &self,
        ctx: &Context<'_>,
        kind: Option<RuleKind>,
    ) -> async_graphql::Result<Vec<AccessRule>> {
        let upstream = ctx.data::<Arc<ControllerClient>>()?;
        let rules = upstream
            .list_rules()
            .await
            .map_err(|e| async_graphql::Error::new(e.to_string()))?;
        Ok(match kind {
            Some(kind) => rules.into_iter().filter(|r| r.kind == kind).collect(),
            None => rules,
        })
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn toggle_firewall(
        &self,
        ctx: &Context<'_>,
        node_id: String,
        enable: bool,
    ) -> async_graphql::Result<bool> {
        let fleet = ctx.data::<Arc<FleetService>>()?;
        fleet
            .toggle_firewall(&node_id, enable)
            .await
            .map(|_| true)
            .map_err(|e| async_graphql::Error::new(e.to_string()))
    }

    async fn trigger_sync(&self, ctx: &Context<'_>) -> async_graphql::Result<SyncAccepted> {
        let fleet = ctx.data::<Arc<FleetService>>()?;
        fleet
            .trigger_sync()
            .await
            .map(|epoch| SyncAccepted { epoch })
            .map_err(|e| async_graphql::Error::new(e.to_string()))
    }
}

pub fn build_schema(
    fleet: Arc<FleetService>,
    upstream: Arc<ControllerClient>,
    notifications: Arc<NotificationLog>,
) -> PalisadeSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(fleet)
        .data(upstream)
        .data(notifications)
        .finish()
}
