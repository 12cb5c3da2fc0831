//! Transport-facing lifecycle handle
//!
//! When the pool creates a connection it hands the transport a `Lifecycle`.
//! The transport calls back through it whenever the connection becomes idle,
//! closes, or must leave pool management for good. The handle only holds a
//! weak reference to the pool, so a transport outliving its pool is fine.

use std::fmt;
use std::sync::Weak;

/// Identity of a pooled connection, unique within one agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl ConnectionId {
    /// Raw numeric id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Receiver side of the lifecycle signals, implemented by the agent
pub(crate) trait LifecycleEvents: Send + Sync {
    fn on_became_idle(&self, id: ConnectionId);
    fn on_closed(&self, id: ConnectionId);
    fn on_force_detach(&self, id: ConnectionId);
}

/// Signals a transport sends about one pooled connection
///
/// After `closed()` or `force_detach()` the connection is no longer known
/// to the pool and every further signal is ignored.
#[derive(Clone)]
pub struct Lifecycle {
    events: Weak<dyn LifecycleEvents>,
    id: ConnectionId,
}

impl Lifecycle {
    pub(crate) fn new(events: Weak<dyn LifecycleEvents>, id: ConnectionId) -> Self {
        Lifecycle { events, id }
    }

    /// The connection this handle reports for
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The connection finished its request and is free for reuse
    pub fn became_idle(&self) {
        if let Some(events) = self.events.upgrade() {
            events.on_became_idle(self.id);
        }
    }

    /// The connection terminated, for whatever reason
    pub fn closed(&self) {
        if let Some(events) = self.events.upgrade() {
            events.on_closed(self.id);
        }
    }

    /// Remove the connection from pool management without closing it
    pub fn force_detach(&self) {
        if let Some(events) = self.events.upgrade() {
            events.on_force_detach(self.id);
        }
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("id", &self.id)
            .field("attached", &(self.events.strong_count() > 0))
            .finish()
    }
}
