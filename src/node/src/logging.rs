//! Log subscriber setup and per-subsystem trace switches

use crate::config::LoggerSection;
use anyhow::{Context, Result};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber; `RUST_LOG` overrides the configured level
pub fn init_tracing(config: &LoggerSection) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("invalid log level {:?}", config.level))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.color)
        .with_target(true);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))
}

/// Extra tracing enabled by `logger.trace`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceToggles {
    /// Per-request HTTP traces on the traffic listener
    pub server: bool,
    /// Every outbound policy-service call
    pub athenz: bool,
    /// Every mapping decision
    pub mapping: bool,
}

impl TraceToggles {
    pub fn parse(list: &str) -> Self {
        let mut toggles = Self::default();
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.to_ascii_lowercase().as_str() {
                "server" => toggles.server = true,
                "athenz" => toggles.athenz = true,
                "mapping" => toggles.mapping = true,
                _ => warn!(entry, "ignoring unknown trace entry"),
            }
        }
        toggles
    }
}
