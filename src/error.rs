//! Error types for PoolAgent
//!
//! The pool itself never fails a connection: transport failures surface only
//! as close signals. The errors here cover admission, configuration and the
//! binary's edges.

use crate::pool::PoolKey;
use thiserror::Error;

/// Main error type for PoolAgent operations
#[derive(Error, Debug)]
pub enum PoolAgentError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pool admission error
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
}

/// Errors returned when a request cannot be admitted or served
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The per-key wait queue reached its configured cap
    #[error("Wait queue for {key} is full ({limit} waiting)")]
    QueueFull {
        /// Destination whose queue overflowed
        key: PoolKey,
        /// Configured `max_waiting`
        limit: usize,
    },

    /// The agent has been shut down
    #[error("Pool agent is shut down")]
    Shutdown,

    /// A queued request was dropped before receiving a connection
    #[error("Request for {key} was abandoned before a connection was delivered")]
    Abandoned {
        /// Destination the request was queued on
        key: PoolKey,
    },

    /// A destination string could not be parsed as `host:port`
    #[error("Invalid destination: {0}")]
    InvalidKey(String),
}

/// Result alias for crate-level operations
pub type Result<T> = std::result::Result<T, PoolAgentError>;
