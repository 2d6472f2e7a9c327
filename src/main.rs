mod api;
mod client;
mod commands;
mod config;
mod domain;
mod server;
mod stream;
mod upstream;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "palisade",
    version,
    about = "Fleet firewall control console and reconciliation daemon"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the console daemon (reconciler + REST + GraphQL)
    Daemon {
        /// Console API listen address (overrides config)
        #[arg(long)]
        http_addr: Option<String>,

        /// Fleet controller base URL (overrides config)
        #[arg(long)]
        controller_url: Option<String>,

        /// Log level (overrides config)
        #[arg(long)]
        log_level: Option<String>,

        /// Path to config file (default: ~/.config/palisade/config.yaml)
        #[arg(long)]
        config: Option<String>,
    },

    /// Node firewall actions
    Fw {
        /// Daemon base URL (defaults to localhost)
        #[arg(long, global = true)]
        daemon_url: Option<String>,

        #[command(subcommand)]
        command: FwCommands,
    },

    /// Access-rule management (blacklist / whitelist)
    Rules {
        /// Daemon base URL (defaults to localhost)
        #[arg(long, global = true)]
        daemon_url: Option<String>,

        /// Output format (table or json)
        #[arg(long, global = true, default_value = "table")]
        format: String,

        #[command(subcommand)]
        command: RulesCommands,
    },

    /// Query a running daemon's snapshots
    Query {
        /// Daemon base URL (defaults to localhost)
        #[arg(long, global = true)]
        daemon_url: Option<String>,

        /// Output format (table or json)
        #[arg(long, global = true, default_value = "table")]
        format: String,

        #[command(subcommand)]
        command: commands::query::QueryCommands,
    },
}

#[derive(Subcommand)]
enum FwCommands {
    /// Enable the firewall on a node
    Enable {
        /// Node id
        node: String,
    },
    /// Disable the firewall on a node
    Disable {
        /// Node id
        node: String,
    },
    /// Re-probe and re-apply firewall state on every node
    Sync,
}

#[derive(Subcommand)]
enum RulesCommands {
    /// List access rules
    List {
        /// Show only blacklist entries
        #[arg(long, conflicts_with = "whitelist")]
        blacklist: bool,

        /// Show only whitelist entries
        #[arg(long)]
        whitelist: bool,
    },
    /// Add an access rule
    Add {
        /// Target: IPv4 address or CIDR block
        ip: String,

        /// Create a whitelist entry (default: blacklist)
        #[arg(long)]
        whitelist: bool,

        /// Why this rule exists
        #[arg(long)]
        reason: Option<String>,

        /// permanent, 1h, 24h or 7d
        #[arg(long, default_value = "permanent")]
        duration: String,
    },
    /// Delete an operator-authored rule
    Delete {
        /// Rule id
        id: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon {
            http_addr,
            controller_url,
            log_level,
            config,
        } => commands::daemon::run(http_addr, controller_url, log_level, config),
        Commands::Fw {
            daemon_url,
            command,
        } => match command {
            FwCommands::Enable { node } => commands::fw::run(daemon_url.as_deref(), true, &node),
            FwCommands::Disable { node } => commands::fw::run(daemon_url.as_deref(), false, &node),
            FwCommands::Sync => commands::fw::sync(daemon_url.as_deref()),
        },
        Commands::Rules {
            daemon_url,
            format,
            command,
        } => match command {
            RulesCommands::List {
                blacklist,
                whitelist,
            } => {
                let kind = if blacklist {
                    Some(domain::rules::RuleKind::Blacklist)
                } else if whitelist {
                    Some(domain::rules::RuleKind::Whitelist)
                } else {
                    None
                };
                commands::rules::list(daemon_url.as_deref(), kind, &format)
            }
            RulesCommands::Add {
                ip,
                whitelist,
                reason,
                duration,
            } => commands::rules::add(
                daemon_url.as_deref(),
                &ip,
                whitelist,
                reason.as_deref(),
                &duration,
            ),
            RulesCommands::Delete { id } => commands::rules::delete(daemon_url.as_deref(), &id),
        },
        Commands::Query {
            daemon_url,
            format,
            command,
        } => commands::query::run(daemon_url.as_deref(), &format, &command),
    }
}
