use anyhow::Result;

use crate::config;

pub fn run(
    http_addr: Option<String>,
    controller_url: Option<String>,
    log_level: Option<String>,
    config_path: Option<String>,
) -> Result<()> {
    let mut daemon_config = config::load(config_path.as_deref())?;

    // CLI flags override config values
    if let Some(addr) = http_addr {
        daemon_config.http_addr = addr;
    }
    if let Some(url) = controller_url {
        daemon_config.controller.base_url = url;
    }
    if let Some(level) = log_level {
        daemon_config.log_level = level;
    }

    // Build tokio runtime explicitly (no #[tokio::main] on fn main)
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(crate::server::run(daemon_config))
}
