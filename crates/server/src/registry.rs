// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live connection registry.
//!
//! One [`Connection`] per accepted transport. The registry is the only shared
//! mutable structure in the server: `register`, transport teardown, and the
//! eviction sweep mutate it; fan-out takes a snapshot under the read lock and
//! sends after releasing it, so a concurrent removal never blocks delivery.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::{AuthFailure, Identity};
use crate::protocol::Frame;

// ---------------------------------------------------------------------------
// Transport handle
// ---------------------------------------------------------------------------

/// Server-side handle to one socket's outbound half.
///
/// Frames go through a channel of [`OUTBOX_CAPACITY`] to the socket's writer
/// task. Sending never waits: a peer that lets its queue fill up is closed
/// as a slow consumer. Closing is terminal and sends after close are dropped.
#[derive(Debug, Clone)]
pub struct Transport {
    tx: mpsc::Sender<Frame>,
    closed: CancellationToken,
}

/// Receiving end of a [`Transport`], owned by the socket writer.
#[derive(Debug)]
pub struct Outbox {
    rx: mpsc::Receiver<Frame>,
    closed: CancellationToken,
}

/// Frames a writer may fall behind by before its transport is closed.
pub const OUTBOX_CAPACITY: usize = 256;

impl Transport {
    pub fn channel() -> (Transport, Outbox) {
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        let closed = CancellationToken::new();
        (Transport { tx, closed: closed.clone() }, Outbox { rx, closed })
    }

    /// Queue a frame. Returns `false` if the transport is gone.
    ///
    /// A full queue closes the transport; frames already queued still drain.
    pub fn send(&self, frame: Frame) -> bool {
        if self.closed.is_cancelled() {
            return false;
        }
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(capacity = OUTBOX_CAPACITY, "outbox full, closing slow consumer");
                self.closed.cancel();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    /// Token cancelled when the transport closes.
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}

impl Outbox {
    /// Next queued frame; `None` once the transport is closed.
    ///
    /// Frames queued before the close are still handed out first.
    pub async fn recv(&mut self) -> Option<Frame> {
        tokio::select! {
            biased;
            frame = self.rx.recv() => frame,
            _ = self.closed.cancelled() => None,
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Opaque connection id, generated at accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Game room identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handler-owned per-connection state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionMeta {
    pub current_game: Option<RoomId>,
}

/// Fixed-window event counter used by the rate-limit middleware.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RateWindow {
    pub(crate) started: Instant,
    pub(crate) count: u32,
}

/// One live socket plus its auth and handler state.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    transport: Transport,
    identity: OnceLock<Identity>,
    connected_at: Instant,
    last_heartbeat: Mutex<Instant>,
    meta: Mutex<ConnectionMeta>,
    rate: Mutex<RateWindow>,
}

impl Connection {
    fn new(transport: Transport) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            transport,
            identity: OnceLock::new(),
            connected_at: now,
            last_heartbeat: Mutex::new(now),
            meta: Mutex::new(ConnectionMeta::default()),
            rate: Mutex::new(RateWindow { started: now, count: 0 }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.get()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.get().is_some()
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Queue a frame for this connection. No-op once closed.
    pub fn send(&self, frame: Frame) -> bool {
        self.transport.send(frame)
    }

    /// Record inbound activity.
    pub fn touch(&self) {
        *self.last_heartbeat.lock() = Instant::now();
    }

    pub fn last_heartbeat(&self) -> Instant {
        *self.last_heartbeat.lock()
    }

    pub fn meta(&self) -> MutexGuard<'_, ConnectionMeta> {
        self.meta.lock()
    }

    pub(crate) fn rate_window(&self) -> MutexGuard<'_, RateWindow> {
        self.rate.lock()
    }

    pub fn close(&self) {
        self.transport.close();
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    /// Token cancelled when this connection's transport closes.
    pub fn closed_token(&self) -> CancellationToken {
        self.transport.closed_token()
    }

    fn bind_identity(&self, identity: Identity) -> Result<(), AuthFailure> {
        self.identity.set(identity).map_err(|_| AuthFailure::AlreadyAuthenticated)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Arc<Connection>>,
    by_identity: HashMap<Identity, HashSet<ConnectionId>>,
}

/// Process-wide set of live connections.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new unauthenticated connection and greet it with its id.
    pub async fn register(&self, transport: Transport) -> Arc<Connection> {
        let conn = Arc::new(Connection::new(transport));
        self.inner.write().await.connections.insert(conn.id, Arc::clone(&conn));
        conn.send(Frame::established(conn.id.to_string()));
        debug!(conn_id = %conn.id, "connection registered");
        conn
    }

    pub async fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.inner.read().await.connections.get(&id).cloned()
    }

    /// Bind `identity` to a registered connection, exactly once.
    pub async fn authenticate(
        &self,
        conn: &Connection,
        identity: Identity,
    ) -> Result<(), AuthFailure> {
        let mut inner = self.inner.write().await;
        if !inner.connections.contains_key(&conn.id) {
            return Err(AuthFailure::Rejected("connection closed".to_owned()));
        }
        conn.bind_identity(identity.clone())?;
        inner.by_identity.entry(identity).or_default().insert(conn.id);
        Ok(())
    }

    /// Remove a connection and close its transport. Idempotent.
    pub async fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut inner = self.inner.write().await;
        let conn = inner.connections.remove(&id)?;
        if let Some(identity) = conn.identity() {
            if let Some(ids) = inner.by_identity.get_mut(identity) {
                ids.remove(&id);
                if ids.is_empty() {
                    inner.by_identity.remove(identity);
                }
            }
        }
        drop(inner);
        conn.close();
        debug!(conn_id = %id, "connection removed");
        Some(conn)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn authenticated_count(&self) -> usize {
        self.inner.read().await.by_identity.values().map(HashSet::len).sum()
    }

    /// Clone of every live connection.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.inner.read().await.connections.values().cloned().collect()
    }

    /// Send to every authenticated connection.
    pub async fn broadcast(&self, frame: Frame) -> usize {
        self.broadcast_where(frame, |_| true).await
    }

    /// Send to every authenticated connection for which `filter` holds.
    ///
    /// Unauthenticated connections never receive broadcasts. Returns the
    /// number of transports the frame was queued on.
    pub async fn broadcast_where<F>(&self, frame: Frame, filter: F) -> usize
    where
        F: Fn(&Connection) -> bool,
    {
        let targets = self.snapshot().await;
        targets
            .iter()
            .map(Arc::as_ref)
            .filter(|c| c.is_authenticated() && filter(*c))
            .filter(|c| c.send(frame.clone()))
            .count()
    }

    /// Send to every connection bound to `identity`.
    pub async fn send_to_user(&self, identity: &Identity, frame: Frame) -> usize {
        let targets: Vec<Arc<Connection>> = {
            let inner = self.inner.read().await;
            let Some(ids) = inner.by_identity.get(identity) else {
                return 0;
            };
            ids.iter().filter_map(|id| inner.connections.get(id).cloned()).collect()
        };
        targets.iter().filter(|c| c.send(frame.clone())).count()
    }

    /// Send a heartbeat ping to every open connection.
    pub async fn ping_all(&self, now_ms: u64) -> usize {
        let targets = self.snapshot().await;
        targets.iter().filter(|c| c.send(Frame::ping(now_ms))).count()
    }

    /// Close and remove connections idle for longer than `timeout` at `now`.
    pub async fn evict_stale(&self, now: Instant, timeout: Duration) -> Vec<ConnectionId> {
        let stale: Vec<ConnectionId> = self
            .snapshot()
            .await
            .iter()
            .filter(|c| now.saturating_duration_since(c.last_heartbeat()) > timeout)
            .map(|c| c.id)
            .collect();
        for id in &stale {
            self.remove(*id).await;
        }
        stale
    }

    /// Close every transport and empty the registry.
    pub async fn close_all(&self) -> usize {
        let mut inner = self.inner.write().await;
        inner.by_identity.clear();
        let drained: Vec<Arc<Connection>> = inner.connections.drain().map(|(_, c)| c).collect();
        drop(inner);
        for conn in &drained {
            conn.close();
        }
        drained.len()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
