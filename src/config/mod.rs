//! Configuration module for PoolAgent
//!
//! This module provides configuration types and parsing for the pool agent
//! and its TCP connector.

mod pool;
mod transport;

pub use pool::{DetachPolicy, PoolConfig};
pub use transport::TcpConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Pool limits and eviction
    #[serde(default)]
    pub pool: PoolConfig,

    /// TCP connector options
    #[serde(default)]
    pub transport: TcpConfig,
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse configuration")?;
    config
        .pool
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid pool configuration: {}", e))?;
    Ok(config)
}
