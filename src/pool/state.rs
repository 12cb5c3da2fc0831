//! Per-destination bookkeeping
//!
//! Synchronous state transitions only. `PoolAgent` runs each transition
//! under its lock and carries out the effects it returns (delivering
//! connections, arming timers, destroying connections) once the lock is
//! released.

use super::lifecycle::ConnectionId;
use super::request::Request;
use super::stats::KeyStats;
use super::PoolKey;
use crate::config::{DetachPolicy, PoolConfig};
use crate::error::PoolError;
use std::collections::{HashMap, VecDeque};

/// Cancellation side of an armed eviction timer
pub(crate) trait EvictionTimer {
    fn cancel(&self);
}

impl EvictionTimer for tokio::task::AbortHandle {
    fn cancel(&self) {
        self.abort();
    }
}

pub(crate) type BoxedRequest<C> = Box<dyn Request<C>>;

/// A connection on its way to a request
pub(crate) struct Dispatch<C> {
    pub(crate) id: ConnectionId,
    pub(crate) key: PoolKey,
    pub(crate) conn: C,
    pub(crate) request: BoxedRequest<C>,
    /// Created by this transition; lifecycle not attached yet
    pub(crate) fresh: bool,
}

pub(crate) enum Admitted<C> {
    Reused(Dispatch<C>),
    Created(Dispatch<C>),
    Queued { position: usize },
}

pub(crate) enum Released<C> {
    /// Handed straight to the front waiter
    Handoff(Dispatch<C>),
    /// Parked in the idle pool with a new eviction timer
    Parked { key: PoolKey },
    /// Agent is shut down; destroy instead of parking
    Discard(C),
    /// Unknown, detached, already idle or closing
    Ignored,
}

/// Result of a close or force-detach on a known connection
pub(crate) struct Removed<C> {
    pub(crate) key: PoolKey,
    /// Fresh connection for the front waiter, if a slot opened up
    pub(crate) refill: Option<Dispatch<C>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    InFlight,
    Idle,
    /// Evicted or discarded, waiting for the transport's close signal
    Closing,
}

struct ArmedTimer<H> {
    generation: u64,
    handle: H,
}

struct Member<C, H> {
    key: PoolKey,
    conn: C,
    phase: Phase,
    timer: Option<ArmedTimer<H>>,
}

impl<C, H: EvictionTimer> Member<C, H> {
    fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.cancel();
        }
    }
}

struct KeyState<C> {
    idle: VecDeque<ConnectionId>,
    waiting: VecDeque<BoxedRequest<C>>,
    open: usize,
}

impl<C> Default for KeyState<C> {
    fn default() -> Self {
        KeyState {
            idle: VecDeque::new(),
            waiting: VecDeque::new(),
            open: 0,
        }
    }
}

impl<C: 'static> KeyState<C> {
    fn is_empty(&self) -> bool {
        self.idle.is_empty() && self.waiting.is_empty() && self.open == 0
    }

    fn pop_waiter(&mut self) -> Option<BoxedRequest<C>> {
        while let Some(request) = self.waiting.pop_front() {
            if !request.is_cancelled() {
                return Some(request);
            }
        }
        None
    }

    fn stats(&self) -> KeyStats {
        KeyStats {
            idle: self.idle.len(),
            waiting: self.waiting.len(),
            open: self.open,
        }
    }
}

/// Idle pools, wait queues and open counts for every destination
pub(crate) struct PoolState<C, H> {
    max_sockets: usize,
    max_waiting: Option<usize>,
    detach_policy: DetachPolicy,
    keys: HashMap<PoolKey, KeyState<C>>,
    members: HashMap<ConnectionId, Member<C, H>>,
    next_id: u64,
    next_generation: u64,
    shut_down: bool,
}

impl<C: Clone + 'static, H: EvictionTimer> PoolState<C, H> {
    pub(crate) fn new(config: &PoolConfig) -> Self {
        PoolState {
            max_sockets: config.max_sockets,
            max_waiting: config.max_waiting,
            detach_policy: config.detach_policy,
            keys: HashMap::new(),
            members: HashMap::new(),
            next_id: 1,
            next_generation: 1,
            shut_down: false,
        }
    }

    /// Admission: idle reuse, then creation under the limit, then queueing
    pub(crate) fn admit<F>(
        &mut self,
        key: PoolKey,
        request: BoxedRequest<C>,
        connect: F,
    ) -> Result<Admitted<C>, PoolError>
    where
        F: FnOnce(&PoolKey) -> C,
    {
        if self.shut_down {
            return Err(PoolError::Shutdown);
        }

        let entry = self.keys.entry(key.clone()).or_default();

        while let Some(id) = entry.idle.pop_front() {
            if let Some(member) = self.members.get_mut(&id) {
                member.disarm();
                member.phase = Phase::InFlight;
                return Ok(Admitted::Reused(Dispatch {
                    id,
                    key,
                    conn: member.conn.clone(),
                    request,
                    fresh: false,
                }));
            }
        }

        if entry.open < self.max_sockets {
            let id = ConnectionId(self.next_id);
            self.next_id += 1;
            let conn = connect(&key);
            entry.open += 1;
            self.members.insert(
                id,
                Member {
                    key: key.clone(),
                    conn: conn.clone(),
                    phase: Phase::InFlight,
                    timer: None,
                },
            );
            return Ok(Admitted::Created(Dispatch {
                id,
                key,
                conn,
                request,
                fresh: true,
            }));
        }

        if let Some(limit) = self.max_waiting {
            if entry.waiting.len() >= limit {
                entry.waiting.retain(|waiting| !waiting.is_cancelled());
                if entry.waiting.len() >= limit {
                    return Err(PoolError::QueueFull { key, limit });
                }
            }
        }

        entry.waiting.push_back(request);
        Ok(Admitted::Queued {
            position: entry.waiting.len(),
        })
    }

    /// The connection is free: serve the front waiter or park it idle
    pub(crate) fn release<A>(&mut self, id: ConnectionId, arm: A) -> Released<C>
    where
        A: FnOnce(ConnectionId, u64) -> H,
    {
        let Some(member) = self.members.get_mut(&id) else {
            return Released::Ignored;
        };
        if member.phase != Phase::InFlight {
            return Released::Ignored;
        }
        if self.shut_down {
            member.phase = Phase::Closing;
            return Released::Discard(member.conn.clone());
        }
        let Some(entry) = self.keys.get_mut(&member.key) else {
            return Released::Ignored;
        };

        if let Some(request) = entry.pop_waiter() {
            return Released::Handoff(Dispatch {
                id,
                key: member.key.clone(),
                conn: member.conn.clone(),
                request,
                fresh: false,
            });
        }

        entry.idle.push_back(id);
        member.phase = Phase::Idle;
        let generation = self.next_generation;
        self.next_generation += 1;
        member.timer = Some(ArmedTimer {
            generation,
            handle: arm(id, generation),
        });
        Released::Parked {
            key: member.key.clone(),
        }
    }

    /// The transport closed the connection
    pub(crate) fn close<F>(&mut self, id: ConnectionId, connect: F) -> Option<Removed<C>>
    where
        F: FnOnce(&PoolKey) -> C,
    {
        let mut member = self.members.remove(&id)?;
        member.disarm();
        let key = member.key;

        if let Some(entry) = self.keys.get_mut(&key) {
            if member.phase == Phase::Idle {
                entry.idle.retain(|idle| *idle != id);
            }
            entry.open = entry.open.saturating_sub(1);
        }

        let refill = self.refill(&key, connect);
        self.prune(&key);
        Some(Removed { key, refill })
    }

    /// The connection leaves pool management without closing
    pub(crate) fn detach<F>(&mut self, id: ConnectionId, connect: F) -> Option<Removed<C>>
    where
        F: FnOnce(&PoolKey) -> C,
    {
        let mut member = self.members.remove(&id)?;
        member.disarm();
        let key = member.key;
        let release_slot = self.detach_policy == DetachPolicy::Release;

        if let Some(entry) = self.keys.get_mut(&key) {
            if member.phase == Phase::Idle {
                entry.idle.retain(|idle| *idle != id);
            }
            if release_slot {
                entry.open = entry.open.saturating_sub(1);
            }
        }

        let refill = if release_slot {
            self.refill(&key, connect)
        } else {
            None
        };
        self.prune(&key);
        Some(Removed { key, refill })
    }

    /// An eviction timer fired; returns the connection to destroy
    ///
    /// Stale fires (the connection was reused and maybe parked again since)
    /// are recognised by generation and ignored.
    pub(crate) fn expire(&mut self, id: ConnectionId, generation: u64) -> Option<C> {
        let member = self.members.get_mut(&id)?;
        if member.phase != Phase::Idle {
            return None;
        }
        match &member.timer {
            Some(timer) if timer.generation == generation => {}
            _ => return None,
        }

        member.timer = None;
        member.phase = Phase::Closing;
        if let Some(entry) = self.keys.get_mut(&member.key) {
            entry.idle.retain(|idle| *idle != id);
        }
        Some(member.conn.clone())
    }

    /// Stop admitting; hand back idle connections and queued requests
    pub(crate) fn shutdown(&mut self) -> (Vec<C>, Vec<BoxedRequest<C>>) {
        self.shut_down = true;

        let mut idle = Vec::new();
        let mut waiting = Vec::new();
        for entry in self.keys.values_mut() {
            for id in entry.idle.drain(..) {
                if let Some(member) = self.members.get_mut(&id) {
                    member.disarm();
                    member.phase = Phase::Closing;
                    idle.push(member.conn.clone());
                }
            }
            waiting.extend(entry.waiting.drain(..));
        }
        self.keys.retain(|_, entry| !entry.is_empty());

        (idle, waiting)
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub(crate) fn snapshot(&self, key: &PoolKey) -> Option<KeyStats> {
        self.keys.get(key).map(KeyState::stats)
    }

    pub(crate) fn keys(&self) -> Vec<PoolKey> {
        let mut keys: Vec<PoolKey> = self.keys.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub(crate) fn totals(&self) -> KeyStats {
        self.keys
            .values()
            .map(KeyState::stats)
            .fold(KeyStats::default(), |acc, stats| acc + stats)
    }

    /// Fill a freed slot for the front waiter
    fn refill<F>(&mut self, key: &PoolKey, connect: F) -> Option<Dispatch<C>>
    where
        F: FnOnce(&PoolKey) -> C,
    {
        if self.shut_down {
            return None;
        }
        let entry = self.keys.get_mut(key)?;
        if entry.open >= self.max_sockets {
            return None;
        }
        let request = entry.pop_waiter()?;

        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        let conn = connect(key);
        entry.open += 1;
        self.members.insert(
            id,
            Member {
                key: key.clone(),
                conn: conn.clone(),
                phase: Phase::InFlight,
                timer: None,
            },
        );
        Some(Dispatch {
            id,
            key: key.clone(),
            conn,
            request,
            fresh: true,
        })
    }

    fn prune(&mut self, key: &PoolKey) {
        if self.keys.get(key).is_some_and(KeyState::is_empty) {
            self.keys.remove(key);
        }
    }
}
