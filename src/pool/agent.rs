//! Pool manager
//!
//! `PoolAgent` bounds the number of open connections per destination,
//! reuses idle connections oldest-first, evicts connections that stay idle
//! past `available_timeout`, and queues requests once a destination is at
//! capacity.
//!
//! All bookkeeping happens under one lock and runs to completion per
//! signal. Request callbacks, `Connection::attach` and `Connection::destroy`
//! are always invoked after the lock is released, so they may call back into
//! the agent.

use super::lifecycle::{ConnectionId, Lifecycle, LifecycleEvents};
use super::request::{Request, Waiter};
use super::state::{Admitted, Dispatch, PoolState, Released};
use super::stats::{KeyStats, PoolStats, PoolStatsSnapshot};
use super::PoolKey;
use crate::config::PoolConfig;
use crate::error::{self, PoolAgentError, PoolError};
use crate::transport::{Connection, Connector};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::task::AbortHandle;
use tracing::{debug, info, trace, warn};

/// How `add_request` handled a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Served synchronously from the idle pool
    Reused,
    /// Served synchronously with a newly created connection
    Created,
    /// Waiting for a connection to free up; `position` is 1-based
    Queued {
        /// Place in the destination's wait queue
        position: usize,
    },
}

/// Per-destination connection pool manager
///
/// Cloning is cheap and yields a handle to the same pool. Eviction timers
/// are spawned on the current Tokio runtime, so the agent must be driven
/// from inside one.
pub struct PoolAgent<T: Connector> {
    shared: Arc<Shared<T>>,
}

struct Shared<T: Connector> {
    config: PoolConfig,
    connector: T,
    state: Mutex<PoolState<T::Conn, AbortHandle>>,
    stats: PoolStats,
    this: Weak<Shared<T>>,
}

impl<T: Connector> PoolAgent<T> {
    /// Create a pool agent using `connector` for new connections
    pub fn new(config: PoolConfig, connector: T) -> error::Result<Self> {
        config.validate().map_err(PoolAgentError::Config)?;

        debug!(
            "Creating pool agent: max_sockets={}, available_timeout={}ms, max_waiting={:?}, detach_policy={:?}",
            config.max_sockets, config.available_timeout, config.max_waiting, config.detach_policy
        );

        let shared = Arc::new_cyclic(|this| Shared {
            state: Mutex::new(PoolState::new(&config)),
            config,
            connector,
            stats: PoolStats::new(),
            this: this.clone(),
        });

        Ok(PoolAgent { shared })
    }

    /// Hand `request` a connection to `host:port`
    ///
    /// Reuses the oldest idle connection if there is one, otherwise creates
    /// a connection while under `max_sockets`, otherwise queues the request.
    /// Reused and created connections are delivered before this returns;
    /// queued requests are served later from a lifecycle signal.
    pub fn add_request<R>(&self, request: R, host: &str, port: u16) -> Result<Admission, PoolError>
    where
        R: Request<T::Conn>,
    {
        self.add_request_for(PoolKey::new(host, port), request)
    }

    /// Same as [`add_request`](Self::add_request) with an explicit key
    pub fn add_request_for<R>(&self, key: PoolKey, request: R) -> Result<Admission, PoolError>
    where
        R: Request<T::Conn>,
    {
        self.shared.admit(key, Box::new(request))
    }

    /// Wait for a connection to `host:port`
    ///
    /// Dropping the returned future while queued withdraws the request.
    pub async fn acquire(&self, host: &str, port: u16) -> Result<T::Conn, PoolError> {
        let key = PoolKey::new(host, port);
        let (waiter, checkout) = Waiter::new();
        self.add_request_for(key.clone(), waiter)?;
        checkout.wait().await.ok_or(PoolError::Abandoned { key })
    }

    /// Current gauges for `key`, or `None` if the key holds no state
    pub fn snapshot(&self, key: &PoolKey) -> Option<KeyStats> {
        self.shared.state.lock().snapshot(key)
    }

    /// Destinations that currently hold state
    pub fn keys(&self) -> Vec<PoolKey> {
        self.shared.state.lock().keys()
    }

    /// Gauges summed over every destination
    pub fn totals(&self) -> KeyStats {
        self.shared.state.lock().totals()
    }

    /// Lifetime counters
    pub fn stats(&self) -> PoolStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// The connector used for new connections
    pub fn connector(&self) -> &T {
        &self.shared.connector
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().is_shut_down()
    }

    /// Stop the agent
    ///
    /// New requests are refused, idle connections are destroyed and queued
    /// requests are dropped unserved. In-flight connections are destroyed
    /// when they next become idle.
    pub fn shutdown(&self) {
        let (idle, waiting) = self.shared.state.lock().shutdown();
        info!(
            "Shutting down pool agent: destroying {} idle connections, dropping {} queued requests",
            idle.len(),
            waiting.len()
        );

        drop(waiting);
        for conn in idle {
            conn.destroy();
        }
    }

    /// Log pool health status
    pub fn log_health(&self) {
        let totals = self.totals();
        let stats = self.stats();
        debug!(
            "Pool health: open={}, idle={}, waiting={}, created={}, reused={}, handoffs={}, evicted={}, closed={}, detached={}, rejected={}",
            totals.open,
            totals.idle,
            totals.waiting,
            stats.total_created,
            stats.total_reused,
            stats.total_handoffs,
            stats.total_evicted,
            stats.total_closed,
            stats.total_detached,
            stats.total_rejected
        );
    }
}

impl<T: Connector> Clone for PoolAgent<T> {
    fn clone(&self) -> Self {
        PoolAgent {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Connector> fmt::Debug for PoolAgent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolAgent")
            .field("config", &self.shared.config)
            .field("totals", &self.totals())
            .finish()
    }
}

impl<T: Connector> Shared<T> {
    fn admit(
        &self,
        key: PoolKey,
        request: Box<dyn Request<T::Conn>>,
    ) -> Result<Admission, PoolError> {
        let admitted = self
            .state
            .lock()
            .admit(key.clone(), request, |key| self.connector.connect(key));

        match admitted {
            Ok(Admitted::Reused(dispatch)) => {
                self.stats.record_reused();
                trace!("Reusing idle connection {} for {}", dispatch.id, key);
                self.deliver(dispatch);
                Ok(Admission::Reused)
            }
            Ok(Admitted::Created(dispatch)) => {
                self.stats.record_created();
                debug!("Created connection {} for {}", dispatch.id, key);
                self.deliver(dispatch);
                Ok(Admission::Created)
            }
            Ok(Admitted::Queued { position }) => {
                self.stats.record_queued();
                debug!("Pool for {} at capacity, request queued at {}", key, position);
                Ok(Admission::Queued { position })
            }
            Err(err) => {
                if matches!(err, PoolError::QueueFull { .. }) {
                    self.stats.record_rejected();
                }
                warn!("Request for {} refused: {}", key, err);
                Err(err)
            }
        }
    }

    /// Attach fresh connections, then run the request callback
    fn deliver(&self, dispatch: Dispatch<T::Conn>) {
        let Dispatch {
            id,
            key,
            conn,
            request,
            fresh,
        } = dispatch;

        if fresh {
            conn.attach(Lifecycle::new(self.this.clone(), id));
        }
        trace!("Delivering connection {} for {}", id, key);
        request.on_connection(conn);
    }

    fn arm_eviction(&self, id: ConnectionId, generation: u64) -> AbortHandle {
        let this = self.this.clone();
        let timeout = self.config.available_timeout();

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(shared) = this.upgrade() {
                shared.evict(id, generation);
            }
        })
        .abort_handle()
    }

    fn evict(&self, id: ConnectionId, generation: u64) {
        let expired = self.state.lock().expire(id, generation);
        if let Some(conn) = expired {
            self.stats.record_evicted();
            debug!("Evicting connection {} after {}ms idle", id, self.config.available_timeout);
            conn.destroy();
        }
    }
}

impl<T: Connector> LifecycleEvents for Shared<T> {
    fn on_became_idle(&self, id: ConnectionId) {
        let released = self
            .state
            .lock()
            .release(id, |id, generation| self.arm_eviction(id, generation));

        match released {
            Released::Handoff(dispatch) => {
                self.stats.record_handoff();
                debug!("Handing connection {} to waiting request for {}", id, dispatch.key);
                self.deliver(dispatch);
            }
            Released::Parked { key } => {
                trace!("Connection {} idle for {}", id, key);
            }
            Released::Discard(conn) => {
                debug!("Connection {} released after shutdown, destroying", id);
                conn.destroy();
            }
            Released::Ignored => {
                trace!("Ignoring idle signal for connection {}", id);
            }
        }
    }

    fn on_closed(&self, id: ConnectionId) {
        let removed = self
            .state
            .lock()
            .close(id, |key| self.connector.connect(key));

        let Some(removed) = removed else {
            trace!("Ignoring close signal for connection {}", id);
            return;
        };
        self.stats.record_closed();
        debug!("Connection {} for {} closed", id, removed.key);

        if let Some(refill) = removed.refill {
            self.stats.record_created();
            debug!("Created connection {} for waiting request on {}", refill.id, refill.key);
            self.deliver(refill);
        }
    }

    fn on_force_detach(&self, id: ConnectionId) {
        let removed = self
            .state
            .lock()
            .detach(id, |key| self.connector.connect(key));

        let Some(removed) = removed else {
            trace!("Ignoring detach signal for connection {}", id);
            return;
        };
        self.stats.record_detached();
        debug!(
            "Connection {} for {} detached from pool ({:?} slot)",
            id, removed.key, self.config.detach_policy
        );

        if let Some(refill) = removed.refill {
            self.stats.record_created();
            debug!("Created connection {} for waiting request on {}", refill.id, refill.key);
            self.deliver(refill);
        }
    }
}
