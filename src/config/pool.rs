//! Connection pool configuration
//!
//! Defines the per-destination limits and idle eviction settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time an idle connection may stay unused, in milliseconds
fn default_available_timeout() -> u64 {
    2500
}

/// Default maximum open connections per destination
fn default_max_sockets() -> usize {
    5
}

/// What happens to a connection's slot when it is force-detached
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum DetachPolicy {
    /// The detached connection keeps counting against `max_sockets`
    #[default]
    #[serde(rename = "retain")]
    Retain,
    /// The slot is freed; a queued request may get a fresh connection
    #[serde(rename = "release")]
    Release,
}

/// Connection pool configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Milliseconds an idle connection may remain unused before eviction
    #[serde(default = "default_available_timeout", alias = "availableTimeout")]
    pub available_timeout: u64,

    /// Maximum concurrently open connections per destination
    #[serde(default = "default_max_sockets", alias = "maxSockets")]
    pub max_sockets: usize,

    /// Optional cap on queued requests per destination (unbounded if unset)
    #[serde(default, alias = "maxWaiting")]
    pub max_waiting: Option<usize>,

    /// Slot accounting for force-detached connections
    #[serde(default, alias = "detachPolicy")]
    pub detach_policy: DetachPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            available_timeout: default_available_timeout(),
            max_sockets: default_max_sockets(),
            max_waiting: None,
            detach_policy: DetachPolicy::default(),
        }
    }
}

impl PoolConfig {
    /// Idle eviction delay as a `Duration`
    pub fn available_timeout(&self) -> Duration {
        Duration::from_millis(self.available_timeout)
    }

    /// Validate the pool configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_sockets == 0 {
            return Err("max_sockets must be greater than 0".to_string());
        }
        if self.available_timeout == 0 {
            return Err("available_timeout must be greater than 0".to_string());
        }
        if self.max_waiting == Some(0) {
            return Err("max_waiting must be greater than 0 when set".to_string());
        }
        Ok(())
    }
}
