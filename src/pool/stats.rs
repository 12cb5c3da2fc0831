//! Pool counters
//!
//! Lifetime counters for the whole agent plus point-in-time per-key gauges.

use std::ops::Add;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Point-in-time view of one destination's pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyStats {
    /// Connections parked in the idle pool
    pub idle: usize,
    /// Requests in the wait queue
    pub waiting: usize,
    /// Connections counted against `max_sockets` (idle + in flight)
    pub open: usize,
}

impl KeyStats {
    /// Connections currently owned by requests
    pub fn in_flight(&self) -> usize {
        self.open.saturating_sub(self.idle)
    }
}

impl Add for KeyStats {
    type Output = KeyStats;

    fn add(self, other: KeyStats) -> KeyStats {
        KeyStats {
            idle: self.idle + other.idle,
            waiting: self.waiting + other.waiting,
            open: self.open + other.open,
        }
    }
}

/// Lifetime counters for the connection pool
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Connections created through the connector
    pub total_created: AtomicUsize,
    /// Requests served from the idle pool
    pub total_reused: AtomicUsize,
    /// Requests that had to wait
    pub total_queued: AtomicUsize,
    /// Released connections handed straight to a waiter
    pub total_handoffs: AtomicUsize,
    /// Idle connections destroyed by their eviction timer
    pub total_evicted: AtomicUsize,
    /// Close signals processed
    pub total_closed: AtomicUsize,
    /// Force-detach signals processed
    pub total_detached: AtomicUsize,
    /// Requests refused because the wait queue was full
    pub total_rejected: AtomicUsize,
}

impl PoolStats {
    /// Create new pool stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection creation
    pub fn record_created(&self) {
        self.total_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an idle reuse
    pub fn record_reused(&self) {
        self.total_reused.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a queued request
    pub fn record_queued(&self) {
        self.total_queued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a direct hand-off to a waiter
    pub fn record_handoff(&self) {
        self.total_handoffs.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an eviction
    pub fn record_evicted(&self) {
        self.total_evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a close
    pub fn record_closed(&self) {
        self.total_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a force-detach
    pub fn record_detached(&self) {
        self.total_detached.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected request
    pub fn record_rejected(&self) {
        self.total_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current stats snapshot
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            total_created: self.total_created.load(Ordering::Relaxed),
            total_reused: self.total_reused.load(Ordering::Relaxed),
            total_queued: self.total_queued.load(Ordering::Relaxed),
            total_handoffs: self.total_handoffs.load(Ordering::Relaxed),
            total_evicted: self.total_evicted.load(Ordering::Relaxed),
            total_closed: self.total_closed.load(Ordering::Relaxed),
            total_detached: self.total_detached.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of pool statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct PoolStatsSnapshot {
    pub total_created: usize,
    pub total_reused: usize,
    pub total_queued: usize,
    pub total_handoffs: usize,
    pub total_evicted: usize,
    pub total_closed: usize,
    pub total_detached: usize,
    pub total_rejected: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_stats_new() {
        let snapshot = PoolStats::new().snapshot();
        assert_eq!(snapshot, PoolStatsSnapshot::default());
    }

    #[test]
    fn test_pool_stats_record() {
        let stats = PoolStats::new();
        stats.record_created();
        stats.record_created();
        stats.record_reused();
        stats.record_queued();
        stats.record_handoff();
        stats.record_evicted();
        stats.record_closed();
        stats.record_detached();
        stats.record_rejected();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_created, 2);
        assert_eq!(snapshot.total_reused, 1);
        assert_eq!(snapshot.total_queued, 1);
        assert_eq!(snapshot.total_handoffs, 1);
        assert_eq!(snapshot.total_evicted, 1);
        assert_eq!(snapshot.total_closed, 1);
        assert_eq!(snapshot.total_detached, 1);
        assert_eq!(snapshot.total_rejected, 1);
    }

    #[test]
    fn test_key_stats_in_flight() {
        let stats = KeyStats {
            idle: 2,
            waiting: 0,
            open: 5,
        };
        assert_eq!(stats.in_flight(), 3);
    }

    #[test]
    fn test_key_stats_add() {
        let a = KeyStats {
            idle: 1,
            waiting: 2,
            open: 3,
        };
        let b = KeyStats {
            idle: 1,
            waiting: 0,
            open: 1,
        };
        assert_eq!(
            a + b,
            KeyStats {
                idle: 2,
                waiting: 2,
                open: 4
            }
        );
    }
}
