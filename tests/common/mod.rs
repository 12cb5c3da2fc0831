//! Test utilities and mocks for PoolAgent
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use poolagent::config::PoolConfig;
use poolagent::pool::{Lifecycle, PoolKey};
use poolagent::transport::{Connection, Connector};
use poolagent::PoolAgent;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

struct MockInner {
    label: usize,
    key: PoolKey,
    lifecycle: Mutex<Option<Lifecycle>>,
    destroyed: AtomicBool,
}

/// In-memory connection that reports lifecycle signals synchronously
#[derive(Clone)]
pub struct MockConnection {
    inner: Arc<MockInner>,
}

impl MockConnection {
    /// Creation order within its connector, starting at 1
    pub fn label(&self) -> usize {
        self.inner.label
    }

    /// Destination this connection was created for
    pub fn key(&self) -> &PoolKey {
        &self.inner.key
    }

    /// Whether `destroy` was called
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Whether the pool's lifecycle handle is attached
    pub fn is_attached(&self) -> bool {
        self.inner.lifecycle.lock().is_some()
    }

    /// Simulate the remote end closing the connection
    pub fn close(&self) {
        let lifecycle = self.inner.lifecycle.lock().take();
        if let Some(lifecycle) = lifecycle {
            lifecycle.closed();
        }
    }

    /// Simulate a protocol upgrade taking the connection out of the pool
    pub fn upgrade(&self) {
        let lifecycle = self.inner.lifecycle.lock().take();
        if let Some(lifecycle) = lifecycle {
            lifecycle.force_detach();
        }
    }

    /// The attached lifecycle handle, if any
    pub fn lifecycle(&self) -> Option<Lifecycle> {
        self.inner.lifecycle.lock().clone()
    }

    /// Whether two handles refer to the same connection
    pub fn same(&self, other: &MockConnection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Connection for MockConnection {
    fn attach(&self, lifecycle: Lifecycle) {
        *self.inner.lifecycle.lock() = Some(lifecycle);
    }

    fn release(&self) {
        let lifecycle = self.inner.lifecycle.lock().clone();
        if let Some(lifecycle) = lifecycle {
            lifecycle.became_idle();
        }
    }

    fn destroy(&self) {
        self.inner.destroyed.store(true, Ordering::SeqCst);
        self.close();
    }
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("label", &self.inner.label)
            .field("key", &self.inner.key)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Connector producing [`MockConnection`]s and remembering every one
#[derive(Default)]
pub struct MockConnector {
    created: AtomicUsize,
    connections: Mutex<Vec<MockConnection>>,
}

impl MockConnector {
    /// Number of connections created so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Every connection created so far, in creation order
    pub fn connections(&self) -> Vec<MockConnection> {
        self.connections.lock().clone()
    }
}

impl Connector for MockConnector {
    type Conn = MockConnection;

    fn connect(&self, key: &PoolKey) -> MockConnection {
        let label = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let conn = MockConnection {
            inner: Arc::new(MockInner {
                label,
                key: key.clone(),
                lifecycle: Mutex::new(None),
                destroyed: AtomicBool::new(false),
            }),
        };
        self.connections.lock().push(conn.clone());
        conn
    }
}

/// Records which request received which connection
#[derive(Clone, Default)]
pub struct Served {
    log: Arc<Mutex<Vec<(&'static str, MockConnection)>>>,
}

impl Served {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// A request named `name` that records the connection it receives
    pub fn request(&self, name: &'static str) -> impl FnOnce(MockConnection) + Send + 'static {
        let log = Arc::clone(&self.log);
        move |conn| log.lock().push((name, conn))
    }

    /// Names of served requests, in delivery order
    pub fn names(&self) -> Vec<&'static str> {
        self.log.lock().iter().map(|(name, _)| *name).collect()
    }

    /// Connection delivered to `name`
    pub fn conn(&self, name: &str) -> Option<MockConnection> {
        self.log
            .lock()
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, conn)| conn.clone())
    }

    /// Number of served requests
    pub fn len(&self) -> usize {
        self.log.lock().len()
    }
}

/// Build an agent over a fresh [`MockConnector`]
pub fn mock_agent(max_sockets: usize, available_timeout_ms: u64) -> PoolAgent<MockConnector> {
    let config = PoolConfig {
        max_sockets,
        available_timeout: available_timeout_ms,
        ..Default::default()
    };
    PoolAgent::new(config, MockConnector::default()).unwrap()
}

/// Build an agent over a fresh [`MockConnector`] with a custom config
pub fn mock_agent_with(config: PoolConfig) -> PoolAgent<MockConnector> {
    PoolAgent::new(config, MockConnector::default()).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_listener() {
        let (listener, addr) = create_test_listener().await;
        assert!(addr.port() > 0);
        drop(listener);
    }

    #[test]
    fn test_mock_connector_labels() {
        let connector = MockConnector::default();
        let key = PoolKey::new("h", 1);
        let a = connector.connect(&key);
        let b = connector.connect(&key);

        assert_eq!(a.label(), 1);
        assert_eq!(b.label(), 2);
        assert_eq!(connector.created(), 2);
        assert!(!a.same(&b));
    }
}
