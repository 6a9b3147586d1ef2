//! Configuration file loading and validation

use anyhow::{Context, Result};
use garm_api_server::health::DEFAULT_HEALTH_PATH;
use garm_api_server::{AthenzConfig, TlsConfig};
use garm_authz::PlatformRules;
use garm_core::CONFIG_VERSION;
use garm_token::TokenConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete daemon configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Must equal [`CONFIG_VERSION`]
    pub version: String,
    pub logger: LoggerSection,
    pub server: ServerSection,
    pub athenz: AthenzConfig,
    pub token: TokenConfig,
    pub map_rule: MappingSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggerSection {
    /// Filter directive; `RUST_LOG` takes precedence
    pub level: String,
    pub json: bool,
    pub color: bool,
    /// Comma list of `server`, `athenz`, `mapping`
    pub trace: String,
}

impl Default for LoggerSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            color: false,
            trace: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: u16,
    pub health_check_port: u16,
    pub health_check_path: String,
    /// Dispatcher timeout per request
    pub timeout: String,
    pub shutdown_duration: String,
    pub probe_wait_time: String,
    pub tls: TlsConfig,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: 443,
            health_check_port: 8080,
            health_check_path: DEFAULT_HEALTH_PATH.to_string(),
            timeout: "3s".to_string(),
            shutdown_duration: "5s".to_string(),
            probe_wait_time: "3s".to_string(),
            tls: TlsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MappingSection {
    pub tld: TldSection,
    /// Groups attached to every authenticated user
    pub user_groups: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TldSection {
    pub name: String,
    pub platform: PlatformRules,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Invalid configuration file {}", path.display()))
    }

    /// Parse and validate configuration text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).context("Failed to parse configuration file")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.version != CONFIG_VERSION {
            anyhow::bail!(
                "invalid garm config version {:?}, expected {}",
                self.version,
                CONFIG_VERSION
            );
        }
        if self.server.port == self.server.health_check_port {
            anyhow::bail!(
                "server port and health check port must differ (both {})",
                self.server.port
            );
        }
        Ok(())
    }
}
