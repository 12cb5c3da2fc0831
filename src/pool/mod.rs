//! Connection pool module for PoolAgent
//!
//! This module provides per-destination connection pooling: admission,
//! idle reuse, eviction and the wait queue.

mod agent;
mod key;
pub(crate) mod lifecycle;
mod request;
mod state;
mod stats;

pub use agent::{Admission, PoolAgent};
pub use key::PoolKey;
pub use lifecycle::{ConnectionId, Lifecycle};
pub use request::Request;
pub use stats::{KeyStats, PoolStats, PoolStatsSnapshot};
