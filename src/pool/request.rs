//! Requests waiting on connections
//!
//! A request is owned by the dispatch layer. The pool only needs a way to
//! hand it exactly one connection, either synchronously during admission or
//! later when a connection frees up.

use crate::transport::Connection;
use tokio::sync::oneshot;

/// A single-shot consumer of one connection
pub trait Request<C>: Send + 'static {
    /// Deliver the connection. Called exactly once.
    fn on_connection(self: Box<Self>, conn: C);

    /// Whether the requester has gone away while queued
    ///
    /// Cancelled requests are dropped from the wait queue instead of being
    /// served.
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl<C, F> Request<C> for F
where
    F: FnOnce(C) + Send + 'static,
{
    fn on_connection(self: Box<Self>, conn: C) {
        (*self)(conn)
    }
}

/// Request backed by a oneshot channel, used by `PoolAgent::acquire`
pub(crate) struct Waiter<C> {
    tx: oneshot::Sender<C>,
}

impl<C: Connection> Waiter<C> {
    pub(crate) fn new() -> (Self, Checkout<C>) {
        let (tx, rx) = oneshot::channel();
        (Waiter { tx }, Checkout { rx })
    }
}

impl<C: Connection> Request<C> for Waiter<C> {
    fn on_connection(self: Box<Self>, conn: C) {
        // Receiver dropped between dequeue and delivery
        if let Err(conn) = self.tx.send(conn) {
            conn.release();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving end of a `Waiter`
///
/// Dropping a checkout that was already served releases the connection back
/// to the pool.
pub(crate) struct Checkout<C: Connection> {
    rx: oneshot::Receiver<C>,
}

impl<C: Connection> Checkout<C> {
    /// Wait for delivery; `None` if the waiter was dropped unserved
    pub(crate) async fn wait(mut self) -> Option<C> {
        (&mut self.rx).await.ok()
    }
}

impl<C: Connection> Drop for Checkout<C> {
    fn drop(&mut self) {
        self.rx.close();
        if let Ok(conn) = self.rx.try_recv() {
            conn.release();
        }
    }
}
