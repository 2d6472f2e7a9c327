//! `palisade rules list|add|delete` — access-rule management.
//!
//! Targets are validated locally; a malformed address never reaches the
//! network.

use anyhow::Result;
use colored::Colorize;

use crate::client::ConsoleClient;
use crate::domain::rules::{validate_target, AccessRule, RuleDuration, RuleKind};

pub fn list(daemon_url: Option<&str>, kind: Option<RuleKind>, format: &str) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(list_async(daemon_url, kind, format))
}

async fn list_async(daemon_url: Option<&str>, kind: Option<RuleKind>, format: &str) -> Result<()> {
    let client = ConsoleClient::new(daemon_url)?;
    let mut rules = client.rules().await?;
    if let Some(kind) = kind {
        rules.retain(|r| r.kind == kind);
    }

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }

    if rules.is_empty() {
        println!("{} No access rules", "::".blue().bold());
        return Ok(());
    }

    println!("{}", "Access Rules".bold());
    println!();
    for rule in &rules {
        print_rule(rule);
    }
    println!();
    Ok(())
}

fn print_rule(rule: &AccessRule) {
    let kind = match rule.kind {
        RuleKind::Blacklist => "blacklist".red().bold(),
        RuleKind::Whitelist => "whitelist".green().bold(),
    };
    let expires = rule
        .expire_time
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "permanent".to_string());
    println!(
        "  {} {} ({}) — {} — expires: {} [{}]",
        kind,
        rule.ip.bold(),
        rule.id.dimmed(),
        rule.reason,
        expires,
        format!("{:?}", rule.source).to_lowercase()
    );
}

pub fn add(
    daemon_url: Option<&str>,
    ip: &str,
    whitelist: bool,
    reason: Option<&str>,
    duration: &str,
) -> Result<()> {
    // Validate before any network call is attempted.
    if let Err(e) = validate_target(ip) {
        eprintln!("{} {}", "!!".red().bold(), e);
        std::process::exit(1);
    }
    let duration: RuleDuration = match duration.parse() {
        Ok(d) => d,
        Err(e) => {
            eprintln!("{} {}", "!!".red().bold(), e);
            std::process::exit(1);
        }
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(add_async(daemon_url, ip, whitelist, reason, duration))
}

async fn add_async(
    daemon_url: Option<&str>,
    ip: &str,
    whitelist: bool,
    reason: Option<&str>,
    duration: RuleDuration,
) -> Result<()> {
    let client = ConsoleClient::new(daemon_url)?;
    let kind = if whitelist {
        RuleKind::Whitelist
    } else {
        RuleKind::Blacklist
    };

    match client.add_rule(ip, kind, reason, duration).await {
        Ok(rule) => {
            println!("{} Rule created:", "ok".green().bold());
            print_rule(&rule);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "!!".red().bold(), e);
            std::process::exit(1);
        }
    }
}

pub fn delete(daemon_url: Option<&str>, id: &str) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(delete_async(daemon_url, id))
}

async fn delete_async(daemon_url: Option<&str>, id: &str) -> Result<()> {
    let client = ConsoleClient::new(daemon_url)?;
    match client.delete_rule(id).await {
        Ok(()) => {
            println!("{} Rule {} deleted", "ok".green().bold(), id.bold());
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "!!".red().bold(), e);
            std::process::exit(1);
        }
    }
}
