//! `palisade fw enable|disable <node>` / `palisade fw sync`
//!
//! Operator firewall actions against the local daemon. Acceptance is
//! synchronous; the actual outcome arrives later through the node's status
//! events (`palisade query notifications`).

use anyhow::Result;
use colored::Colorize;

use crate::client::ConsoleClient;

pub fn run(daemon_url: Option<&str>, enable: bool, node: &str) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(toggle_async(daemon_url, enable, node))
}

async fn toggle_async(daemon_url: Option<&str>, enable: bool, node: &str) -> Result<()> {
    let client = ConsoleClient::new(daemon_url)?;

    let verb = if enable { "Enabling" } else { "Disabling" };
    println!(
        "{} {} firewall on {}",
        ">>".blue().bold(),
        verb,
        node.bold()
    );

    match client.toggle_firewall(node, enable).await {
        Ok(accepted) => {
            println!(
                "{} {} accepted for {} — confirmation will arrive from the node",
                "ok".green().bold(),
                accepted.command,
                accepted.node_id.bold()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "!!".red().bold(), e);
            std::process::exit(1);
        }
    }
}

pub fn sync(daemon_url: Option<&str>) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(sync_async(daemon_url))
}

async fn sync_async(daemon_url: Option<&str>) -> Result<()> {
    let client = ConsoleClient::new(daemon_url)?;

    println!("{} Triggering fleet-wide rule sync", ">>".blue().bold());

    match client.trigger_sync().await {
        Ok(accepted) => {
            println!(
                "{} Sync wave {} dispatched — per-node results arrive asynchronously",
                "ok".green().bold(),
                accepted.epoch
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "!!".red().bold(), e);
            std::process::exit(1);
        }
    }
}
