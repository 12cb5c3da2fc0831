//! Destination identity
//!
//! Every piece of pool state is partitioned by a `PoolKey`.

use crate::error::PoolError;
use std::fmt;
use std::str::FromStr;

/// Identifies one destination's pool: a (host, port) pair
///
/// Hosts are compared exactly as given; `Example.com` and `example.com`
/// are distinct pools.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolKey {
    host: String,
    port: u16,
}

impl PoolKey {
    /// Create a key for `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        PoolKey {
            host: host.into(),
            port,
        }
    }

    /// The destination host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The destination port
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for PoolKey {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PoolError::InvalidKey(s.to_string());

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            let port = tail.strip_prefix(':').ok_or_else(invalid)?;
            (host, port)
        } else {
            let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
            if host.contains(':') {
                // Unbracketed IPv6 literal
                return Err(invalid());
            }
            (host, port)
        };

        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;

        Ok(PoolKey::new(host, port))
    }
}
