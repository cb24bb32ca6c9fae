//! Configuration file support for l2popd
//!
//! Loads and validates l2popd configuration from TOML files.
//! Default location: /etc/l2pop/l2popd.toml

use crate::dispatcher::{self, DEFAULT_TOPIC_PREFIX};
use crate::error::{L2PopError, Result};
use l2pop_types::{AGENT_TYPE_LINUXBRIDGE, AGENT_TYPE_OVS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/l2pop/l2popd.toml";

/// Population engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Uptime below which an agent is sent the full table on every port
    /// activation, in seconds
    #[serde(default = "default_agent_boot_time")]
    pub agent_boot_time_secs: u64,

    /// Agent types taking part in population
    #[serde(default = "default_supported_agent_types")]
    pub supported_agent_types: Vec<String>,
}

/// Notification delivery configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Prefix of the agent notification topics
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of compact text
    #[serde(default)]
    pub json: bool,
}

/// Complete l2popd configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct L2PopConfig {
    #[serde(default)]
    pub l2pop: PopulationConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default functions
fn default_agent_boot_time() -> u64 {
    180
}

fn default_supported_agent_types() -> Vec<String> {
    vec![AGENT_TYPE_OVS.to_string(), AGENT_TYPE_LINUXBRIDGE.to_string()]
}

fn default_topic_prefix() -> String {
    DEFAULT_TOPIC_PREFIX.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            agent_boot_time_secs: default_agent_boot_time(),
            supported_agent_types: default_supported_agent_types(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            topic_prefix: default_topic_prefix(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl L2PopConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                L2PopError::Config(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!(
                    "l2popd: Config file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(L2PopError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> Result<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| L2PopError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn agent_boot_time(&self) -> Duration {
        Duration::from_secs(self.l2pop.agent_boot_time_secs)
    }

    pub fn fanout_topic(&self) -> String {
        dispatcher::fanout_topic(&self.dispatcher.topic_prefix)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.l2pop.supported_agent_types.is_empty() {
            return Err(L2PopError::Config(
                "supported_agent_types must not be empty".to_string(),
            ));
        }

        if self
            .l2pop
            .supported_agent_types
            .iter()
            .any(|t| t.trim().is_empty())
        {
            return Err(L2PopError::Config(
                "supported_agent_types must not contain blank entries".to_string(),
            ));
        }

        let prefix = &self.dispatcher.topic_prefix;
        if prefix.is_empty() || prefix.contains(char::is_whitespace) || prefix.contains('.') {
            return Err(L2PopError::Config(format!(
                "invalid topic_prefix {:?}",
                prefix
            )));
        }

        if self.logging.level.trim().is_empty() {
            return Err(L2PopError::Config("logging level must be set".to_string()));
        }

        Ok(())
    }
}
