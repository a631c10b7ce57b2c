//! Node settings.
//!
//! [`NodeSettings`] is read from a TOML or JSON file (format taken from the
//! extension) layered with `RUTHENIUM_`-prefixed environment variables, where
//! `__` separates nested keys:
//!
//! ```text
//! RUTHENIUM_HOST__PORT=8107
//! RUTHENIUM_PROTOCOL__BLOCKS_COUNT_LIMIT=10
//! ```
//!
//! Every section is optional and falls back to its defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use ruthenium_core::settings::ProtocolSettings;
use ruthenium_core::types::Address;

use crate::error::NodeError;

pub const DEFAULT_HOST_IP: &str = "127.0.0.1";
pub const DEFAULT_HOST_PORT: u16 = 8106;
pub const DEFAULT_MAX_OUTBOUNDS_COUNT: usize = 8;
pub const DEFAULT_NETWORK_SYNCHRONIZATION_INTERVAL_IN_SECONDS: u64 = 10;
pub const DEFAULT_REGISTRY_SYNCHRONIZATION_INTERVAL_IN_SECONDS: u64 = 3_600;
pub const ENVIRONMENT_PREFIX: &str = "RUTHENIUM";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    pub host: HostSettings,
    pub network: NetworkSettings,
    pub protocol: ProtocolSettings,
    pub validator: ValidatorSettings,
    pub registry: RegistrySettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    pub ip: String,
    pub port: u16,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            ip: DEFAULT_HOST_IP.to_string(),
            port: DEFAULT_HOST_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Upper bound on the neighbors polled for chains and relayed transactions.
    pub max_outbounds_count: usize,
    pub synchronization_interval_in_seconds: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            max_outbounds_count: DEFAULT_MAX_OUTBOUNDS_COUNT,
            synchronization_interval_in_seconds: DEFAULT_NETWORK_SYNCHRONIZATION_INTERVAL_IN_SECONDS,
        }
    }
}

/// A node without a validator address verifies and relays but never closes blocks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorSettings {
    pub address: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub synchronization_interval_in_seconds: u64,
    /// Addresses the local oracle reports as eligible. Empty means every address is.
    pub eligible_addresses: Vec<Address>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            synchronization_interval_in_seconds: DEFAULT_REGISTRY_SYNCHRONIZATION_INTERVAL_IN_SECONDS,
            eligible_addresses: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter directive, e.g. "info" or "ruthenium_consensus=debug".
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = NodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(NodeError::InvalidSettings(format!("unknown log format \"{other}\""))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl NodeSettings {
    /// `~/.config/ruthenium/settings.toml` on Linux, `./ruthenium/settings.toml`
    /// when the platform has no configuration directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ruthenium")
            .join("settings.toml")
    }

    /// Load the settings at `path`, or at [`Self::default_path`] if it exists.
    /// An explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, NodeError> {
        Self::load_with_environment(path, None)
    }

    /// Same as [`Self::load`] with the environment replaced by `environment`.
    pub fn load_with_environment(
        path: Option<&Path>,
        environment: Option<config::Map<String, String>>,
    ) -> Result<Self, NodeError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::from(Self::default_path()).required(false),
        };
        let settings: Self = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENVIRONMENT_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(environment),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the tick engines or the replacement protocol cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        let protocol = &self.protocol;
        if protocol.validation_interval_in_seconds <= 0 {
            return Err(invalid("protocol.validation_interval_in_seconds must be positive"));
        }
        if protocol.validation_timeout_in_seconds <= 0 {
            return Err(invalid("protocol.validation_timeout_in_seconds must be positive"));
        }
        if protocol.verifications_count_per_validation == 0 {
            return Err(invalid("protocol.verifications_count_per_validation must be positive"));
        }
        if protocol.blocks_count_limit == 0 {
            return Err(invalid("protocol.blocks_count_limit must be positive"));
        }
        if !(protocol.half_life_in_days > 0.0) {
            return Err(invalid("protocol.half_life_in_days must be positive"));
        }
        if self.network.synchronization_interval_in_seconds == 0 {
            return Err(invalid("network.synchronization_interval_in_seconds must be positive"));
        }
        if self.registry.synchronization_interval_in_seconds == 0 {
            return Err(invalid("registry.synchronization_interval_in_seconds must be positive"));
        }
        Ok(())
    }

    /// Identifier announced to neighbors as the broadcaster of relayed transactions.
    pub fn host_target(&self) -> String {
        format!("{}:{}", self.host.ip, self.host.port)
    }
}

fn invalid(reason: &str) -> NodeError {
    NodeError::InvalidSettings(reason.to_string())
}
