//! # PoolAgent - Per-Destination Connection Pooling
//!
//! PoolAgent hands out connections to `host:port` destinations while
//! bounding how many are open per destination. Connections that finish a
//! request are parked and reused oldest-first; connections left idle too
//! long are destroyed; requests arriving while a destination is at capacity
//! wait in FIFO order.
//!
//! ## Features
//!
//! - **Bounded Pools**: At most `max_sockets` connections per destination
//! - **Idle Reuse**: Released connections serve the next request without reconnecting
//! - **Idle Eviction**: Idle connections are destroyed after `available_timeout`
//! - **Wait Queue**: Requests over capacity are served as connections free up
//! - **Pluggable Transports**: Anything implementing [`transport::Connector`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use poolagent::config::PoolConfig;
//! use poolagent::transport::{Connection, TcpConnector};
//! use poolagent::PoolAgent;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let agent = PoolAgent::new(PoolConfig::default(), TcpConnector::with_defaults())?;
//!
//!     let conn = agent.acquire("127.0.0.1", 8080).await?;
//!     // ... use the connection ...
//!     conn.release();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The agent never talks to the network itself. It asks a connector for a
//! connection, attaches a [`pool::Lifecycle`] to it, and from then on reacts
//! to the signals the transport sends back through that handle.
//!
//! ```text
//! Request -> PoolAgent -> Connector -> Connection
//!               ^                          |
//!               +------- Lifecycle --------+
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod pool;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config, PoolConfig};
pub use error::{PoolAgentError, PoolError};
pub use pool::{Admission, PoolAgent, PoolKey, Request};

/// Version of the PoolAgent library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
