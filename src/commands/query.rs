//! `palisade query` — read snapshots from a running daemon.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use crate::client::ConsoleClient;
use crate::domain::node::{Connectivity, FirewallStatus};
use crate::domain::notify::Severity;

#[derive(Subcommand)]
pub enum QueryCommands {
    /// Daemon health and fleet summary
    Health,
    /// Fleet nodes with confirmed and displayed firewall state
    Nodes,
    /// Operations still waiting for node confirmation
    Pending,
    /// Recent operator notifications
    Notifications,
}

pub fn run(daemon_url: Option<&str>, format: &str, command: &QueryCommands) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_async(daemon_url, format, command))
}

async fn run_async(daemon_url: Option<&str>, format: &str, command: &QueryCommands) -> Result<()> {
    let client = ConsoleClient::new(daemon_url)?;

    match command {
        QueryCommands::Health => {
            let health = client.health().await?;
            if format == "json" {
                return print_json(&health);
            }
            println!("{}", "Daemon Health".bold());
            println!("  version:  {}", health.version);
            println!("  instance: {}", health.instance);
            println!("  uptime:   {}s", health.uptime_secs);
            println!(
                "  fleet:    {}/{} online, {} pending op(s), syncing: {}",
                health.fleet.online_nodes,
                health.fleet.total_nodes,
                health.fleet.pending_operations,
                health.fleet.syncing
            );
            Ok(())
        }
        QueryCommands::Nodes => {
            let nodes = client.nodes().await?;
            if format == "json" {
                return print_json(&nodes);
            }
            if nodes.is_empty() {
                println!("{} No nodes known yet", "::".blue().bold());
                return Ok(());
            }
            println!("{}", "Fleet Nodes".bold());
            println!();
            for node in &nodes {
                let conn = match node.connectivity {
                    Connectivity::Online => "online".green().bold(),
                    Connectivity::Offline => "offline".red().bold(),
                    Connectivity::Warning => "warning".yellow().bold(),
                };
                let firewall = match node.firewall_status {
                    FirewallStatus::Active => "active".green(),
                    FirewallStatus::Inactive => "inactive".normal(),
                    FirewallStatus::Error => "error".red().bold(),
                };
                let pending = node
                    .pending_operation
                    .as_deref()
                    .map(|k| format!(" [{} pending]", k))
                    .unwrap_or_default();
                println!(
                    "  {} ({}) — {} — firewall: {}{}",
                    node.name.bold(),
                    node.ip.dimmed(),
                    conn,
                    firewall,
                    pending.yellow()
                );
                if let Some(err) = &node.firewall_error {
                    println!("      {} {}", "!!".red().bold(), err);
                }
            }
            println!();
            Ok(())
        }
        QueryCommands::Pending => {
            let pending = client.pending().await?;
            if format == "json" {
                return print_json(&pending);
            }
            if pending.is_empty() {
                println!("{} No operations in flight", "::".blue().bold());
                return Ok(());
            }
            println!("{}", "Pending Operations".bold());
            println!();
            for op in &pending {
                let detail = match (op.desired, op.sync_epoch) {
                    (Some(desired), _) => format!("desired: {}", desired),
                    (_, Some(epoch)) => format!("sync wave {}", epoch),
                    _ => String::new(),
                };
                println!(
                    "  {} {} ({}) — {}s in flight",
                    op.kind.bold(),
                    op.node_id,
                    detail.dimmed(),
                    op.age_secs
                );
            }
            println!();
            Ok(())
        }
        QueryCommands::Notifications => {
            let notifications = client.notifications().await?;
            if format == "json" {
                return print_json(&notifications);
            }
            if notifications.is_empty() {
                println!("{} No notifications", "::".blue().bold());
                return Ok(());
            }
            for n in &notifications {
                let tag = match n.severity {
                    Severity::Error => "error".red().bold(),
                    Severity::Warning => "warn ".yellow().bold(),
                    Severity::Success => "ok   ".green().bold(),
                    Severity::Info => "info ".blue().bold(),
                };
                println!(
                    "  {} {} — {} — {}",
                    tag,
                    n.at.format("%H:%M:%S"),
                    n.title,
                    n.message
                );
            }
            Ok(())
        }
    }
}

fn print_json<T: serde::Serialize>(data: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}
