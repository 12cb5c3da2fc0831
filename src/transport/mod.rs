//! Transport module for PoolAgent
//!
//! The pool never touches sockets itself. It asks a [`Connector`] for new
//! connections and learns about their lifecycle through the [`Lifecycle`]
//! handle it attaches to each one. A plain TCP implementation is provided.

mod tcp;

pub use tcp::{TcpConnection, TcpConnector};

use crate::config::TcpConfig;
use crate::pool::{Lifecycle, PoolKey};
use std::time::Duration;
use tokio::net::TcpStream;

/// A handle to one transport-level link
///
/// Handles are cheap to clone; the pool keeps one clone while the
/// connection is under its management and gives another to the request
/// that currently owns it.
pub trait Connection: Clone + Send + Sync + 'static {
    /// Register the pool's lifecycle handle. Called once, right after creation.
    fn attach(&self, lifecycle: Lifecycle);

    /// The current request is done with this connection.
    ///
    /// Implementations report this through [`Lifecycle::became_idle`].
    fn release(&self);

    /// Tear the connection down.
    ///
    /// Implementations must eventually report [`Lifecycle::closed`].
    fn destroy(&self);
}

/// Creates connections for a destination
///
/// `connect` runs while the pool holds its internal lock: it must return
/// promptly and must not call back into the pool. Establishing the link
/// happens in the background; failure is reported as a close.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector
    type Conn: Connection;

    /// Start a new connection to `key`
    fn connect(&self, key: &PoolKey) -> Self::Conn;
}

/// Socket options for configuring connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(20),
            keepalive_interval: Some(8),
        }
    }
}

impl SocketOpts {
    /// Create socket options from TCP config
    pub fn from_tcp_config(config: &TcpConfig) -> Self {
        SocketOpts {
            nodelay: config.nodelay,
            keepalive_secs: Some(config.keepalive_secs),
            keepalive_interval: Some(config.keepalive_interval),
        }
    }

    /// Keepalive probe settings, when both timeout and interval are set
    pub fn keepalive(&self) -> Option<socket2::TcpKeepalive> {
        match (self.keepalive_secs, self.keepalive_interval) {
            (Some(time), Some(interval)) => Some(
                socket2::TcpKeepalive::new()
                    .with_time(Duration::from_secs(time))
                    .with_interval(Duration::from_secs(interval)),
            ),
            _ => None,
        }
    }

    /// Apply socket options to a freshly connected stream
    pub fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        let socket = socket2::SockRef::from(stream);
        socket.set_nodelay(self.nodelay)?;
        if let Some(keepalive) = self.keepalive() {
            socket.set_tcp_keepalive(&keepalive)?;
        }
        Ok(())
    }
}
