//! TCP transport implementation
//!
//! Provides plain TCP connections for the pool. A connection is handed out
//! as soon as it is created; the socket is established in the background
//! and becomes available through [`TcpConnection::lock`].

use super::{Connection, Connector, SocketOpts};
use crate::config::TcpConfig;
use crate::pool::{Lifecycle, PoolKey};
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// TCP connector for pooled connections
#[derive(Debug, Clone)]
pub struct TcpConnector {
    /// Socket options to apply to connections
    socket_opts: SocketOpts,
    /// Connection timeout
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Create a new TCP connector with default options
    pub fn with_defaults() -> Self {
        TcpConnector {
            socket_opts: SocketOpts::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Create a connector from TCP config
    pub fn from_config(config: &TcpConfig) -> Self {
        TcpConnector {
            socket_opts: SocketOpts::from_tcp_config(config),
            connect_timeout: config.connect_timeout(),
        }
    }

    /// Set socket options
    pub fn with_socket_opts(mut self, opts: SocketOpts) -> Self {
        self.socket_opts = opts;
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Connector for TcpConnector {
    type Conn = TcpConnection;

    fn connect(&self, key: &PoolKey) -> TcpConnection {
        let conn = TcpConnection::new(key.clone());
        // Hold the slot until the connect attempt settles
        let pending = Arc::clone(&conn.inner.stream).try_lock_owned();

        let task_conn = conn.clone();
        let opts = self.socket_opts.clone();
        let timeout = self.connect_timeout;
        let key = key.clone();

        tokio::spawn(async move {
            let mut slot = match pending {
                Ok(slot) => slot,
                Err(_) => Arc::clone(&task_conn.inner.stream).lock_owned().await,
            };

            match tokio::time::timeout(timeout, TcpStream::connect((key.host(), key.port()))).await {
                Ok(Ok(stream)) => {
                    if let Err(e) = opts.apply(&stream) {
                        warn!("Failed to apply socket options: {}", e);
                    }
                    if task_conn.is_closed() {
                        debug!("Connection to {} destroyed while connecting", key);
                        return;
                    }
                    debug!("TCP connection established to {}", key);
                    *slot = Some(stream);
                }
                Ok(Err(e)) => {
                    warn!("Failed to connect to {}: {}", key, e);
                    drop(slot);
                    task_conn.destroy();
                }
                Err(_) => {
                    warn!("Connection timeout to {} after {:?}", key, timeout);
                    drop(slot);
                    task_conn.destroy();
                }
            }
        });

        conn
    }
}

/// Whether the peer has closed or reset the socket, without blocking
fn peer_gone(stream: &TcpStream) -> bool {
    let mut buf = [MaybeUninit::<u8>::uninit(); 1];
    match socket2::SockRef::from(stream).peek(&mut buf) {
        Ok(0) => true,
        Ok(_) => false,
        Err(e) => !matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted),
    }
}

struct Signals {
    lifecycle: Option<Lifecycle>,
    closed: bool,
    /// Peer-close watcher, running while the connection is idle
    watcher: Option<AbortHandle>,
}

struct Inner {
    key: PoolKey,
    stream: Arc<AsyncMutex<Option<TcpStream>>>,
    signals: Mutex<Signals>,
}

/// A pooled TCP connection handle
///
/// Clones share the same socket.
#[derive(Clone)]
pub struct TcpConnection {
    inner: Arc<Inner>,
}

impl TcpConnection {
    fn new(key: PoolKey) -> Self {
        TcpConnection {
            inner: Arc::new(Inner {
                key,
                stream: Arc::new(AsyncMutex::new(None)),
                signals: Mutex::new(Signals {
                    lifecycle: None,
                    closed: false,
                    watcher: None,
                }),
            }),
        }
    }

    /// Destination of this connection
    pub fn key(&self) -> &PoolKey {
        &self.inner.key
    }

    /// Whether the connection has been destroyed or failed to connect
    pub fn is_closed(&self) -> bool {
        self.inner.signals.lock().closed
    }

    /// Lock the socket, waiting for the connect attempt to finish
    ///
    /// The slot is `None` if connecting failed or the connection is closed.
    pub async fn lock(&self) -> OwnedMutexGuard<Option<TcpStream>> {
        self.stop_watching();
        let mut slot = Arc::clone(&self.inner.stream).lock_owned().await;
        if self.is_closed() {
            slot.take();
        }
        slot
    }

    /// Take the socket out of pool management, e.g. for a protocol upgrade
    ///
    /// The connection is force-detached from the pool first; the pool will
    /// not reuse, evict or count its close.
    pub async fn upgrade(&self) -> Option<TcpStream> {
        let lifecycle = self.inner.signals.lock().lifecycle.take();
        if let Some(lifecycle) = lifecycle {
            lifecycle.force_detach();
        }
        self.lock().await.take()
    }

    /// Check a settled socket for a pending EOF or reset
    fn peer_closed(&self) -> bool {
        match self.inner.stream.try_lock() {
            Ok(slot) => slot.as_ref().is_some_and(peer_gone),
            Err(_) => false,
        }
    }

    /// Destroy the connection if the peer closes it while idle
    fn watch_idle(&self) {
        let Ok(runtime) = Handle::try_current() else {
            return;
        };

        let conn = self.clone();
        let watcher = runtime
            .spawn(async move {
                let slot = Arc::clone(&conn.inner.stream).lock_owned().await;
                let gone = match slot.as_ref() {
                    Some(stream) => {
                        let mut buf = [0u8; 1];
                        matches!(stream.peek(&mut buf).await, Ok(0) | Err(_))
                    }
                    None => false,
                };
                drop(slot);

                if gone {
                    debug!("Peer closed idle connection to {}", conn.inner.key);
                    conn.destroy();
                }
            })
            .abort_handle();

        if let Some(previous) = self.inner.signals.lock().watcher.replace(watcher) {
            previous.abort();
        }
    }

    fn stop_watching(&self) {
        if let Some(watcher) = self.inner.signals.lock().watcher.take() {
            watcher.abort();
        }
    }
}

impl Connection for TcpConnection {
    fn attach(&self, lifecycle: Lifecycle) {
        let already_closed = {
            let mut signals = self.inner.signals.lock();
            if signals.closed {
                true
            } else {
                signals.lifecycle = Some(lifecycle.clone());
                false
            }
        };

        // Failed before the pool got to attach
        if already_closed {
            lifecycle.closed();
        }
    }

    fn release(&self) {
        if self.peer_closed() {
            debug!("Peer closed connection to {} before release", self.inner.key);
            self.destroy();
            return;
        }

        let lifecycle = {
            let signals = self.inner.signals.lock();
            if signals.closed {
                None
            } else {
                signals.lifecycle.clone()
            }
        };

        if let Some(lifecycle) = lifecycle {
            // Armed first so a direct hand-off's `lock` stops it
            self.watch_idle();
            lifecycle.became_idle();
        }
    }

    fn destroy(&self) {
        let (lifecycle, watcher) = {
            let mut signals = self.inner.signals.lock();
            if signals.closed {
                return;
            }
            signals.closed = true;
            (signals.lifecycle.take(), signals.watcher.take())
        };
        if let Some(watcher) = watcher {
            watcher.abort();
        }

        match self.inner.stream.try_lock() {
            Ok(mut slot) => {
                slot.take();
            }
            Err(_) => {
                // Close the socket once the current holder lets go
                if let Ok(runtime) = Handle::try_current() {
                    let stream = Arc::clone(&self.inner.stream);
                    runtime.spawn(async move {
                        stream.lock().await.take();
                    });
                }
            }
        }
        debug!("TCP connection to {} destroyed", self.inner.key);

        if let Some(lifecycle) = lifecycle {
            lifecycle.closed();
        }
    }
}

impl fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpConnection")
            .field("key", &self.inner.key)
            .field("closed", &self.is_closed())
            .finish()
    }
}
