// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-node table of live sockets.
//!
//! The map is guarded by one reader-writer lock. Connection handles are
//! cloned out of the map before any socket or bus I/O, so no lock on the
//! map is ever held across an await on the network.
//!
//! Each connection has a bounded outbound queue drained by its own writer
//! task, which is the only code that writes text and pings to the socket.
//! Enqueueing never waits on the peer: a socket that stops reading fills
//! its queue and is removed without delaying anybody else.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use livedesk_core::{
    Bus, ConnectionKind, Envelope, LivedeskError, agent_key, project_key, session_key,
};

use crate::socket::{Frame, FrameWriter};

/// A write that has not completed by now is treated as a dead socket.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Budget for the courtesy close frame on removal.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Frames a connection may have waiting before it counts as too slow.
pub const OUTBOUND_CAPACITY: usize = 256;

struct Outbound {
    frame: Frame,
    /// Receives the write result when the sender waits for it.
    done: Option<oneshot::Sender<Result<(), LivedeskError>>>,
}

/// Identity of a socket to be registered.
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub kind: ConnectionKind,
    pub tenant_id: Option<String>,
    /// Set for visitors.
    pub session_id: Option<String>,
    /// Set for agents.
    pub agent_id: Option<String>,
    /// Projects an agent may serve; for visitors, the widget's project.
    pub project_ids: Vec<String>,
}

impl NewConnection {
    pub fn visitor(
        tenant_id: impl Into<String>,
        project_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            kind: ConnectionKind::Visitor,
            tenant_id: Some(tenant_id.into()),
            session_id: Some(session_id.into()),
            agent_id: None,
            project_ids: vec![project_id.into()],
        }
    }

    pub fn agent(
        tenant_id: impl Into<String>,
        agent_id: impl Into<String>,
        project_ids: Vec<String>,
    ) -> Self {
        Self {
            kind: ConnectionKind::Agent,
            tenant_id: Some(tenant_id.into()),
            session_id: None,
            agent_id: Some(agent_id.into()),
            project_ids,
        }
    }
}

/// Immutable attributes of a registered connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: String,
    pub kind: ConnectionKind,
    pub tenant_id: Option<String>,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub project_ids: Vec<String>,
    pub node_id: String,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionInfo {
    /// Every routing set this connection is a member of.
    pub fn routing_keys(&self) -> Vec<String> {
        match self.kind {
            ConnectionKind::Visitor => self.session_id.iter().map(|s| session_key(s)).collect(),
            ConnectionKind::Agent | ConnectionKind::AiAgent => self
                .agent_id
                .iter()
                .map(|a| agent_key(a))
                .chain(self.project_ids.iter().map(|p| project_key(p)))
                .collect(),
        }
    }

    /// The project a visitor's widget belongs to.
    pub fn primary_project(&self) -> Option<&str> {
        self.project_ids.first().map(String::as_str)
    }
}

/// A live socket.
pub struct Connection {
    info: ConnectionInfo,
    writer: Mutex<Box<dyn FrameWriter>>,
    outbound: mpsc::Sender<Outbound>,
    /// Milliseconds since the registry epoch at which the peer was last heard.
    last_seen_ms: AtomicU64,
    cancel: CancellationToken,
}

impl Connection {
    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn kind(&self) -> ConnectionKind {
        self.info.kind
    }

    /// Cancelled when the connection is removed. Read loops select on it.
    pub fn cancelled(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn closed(&self) -> LivedeskError {
        LivedeskError::Transport {
            connection_id: self.info.id.clone(),
            message: "connection closed".into(),
        }
    }

    /// Serialized write. Aborted by removal or after [`WRITE_TIMEOUT`].
    async fn write(&self, frame: Frame) -> Result<(), LivedeskError> {
        if self.cancel.is_cancelled() {
            return Err(self.closed());
        }

        let mut writer = tokio::select! {
            w = self.writer.lock() => w,
            _ = self.cancel.cancelled() => return Err(self.closed()),
        };
        tokio::select! {
            result = tokio::time::timeout(WRITE_TIMEOUT, writer.write(frame)) => match result {
                Ok(inner) => inner,
                Err(_) => Err(LivedeskError::Transport {
                    connection_id: self.info.id.clone(),
                    message: format!("write stalled for {WRITE_TIMEOUT:?}"),
                }),
            },
            _ = self.cancel.cancelled() => Err(self.closed()),
        }
    }

    /// Cancel pending I/O, then try to say goodbye.
    async fn close(&self) {
        self.cancel.cancel();
        let mut writer = self.writer.lock().await;
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, writer.write(Frame::Close)).await;
    }
}

/// Per-node connection table bound to the bus routing sets.
pub struct ConnectionRegistry {
    node_id: String,
    bus: Arc<dyn Bus>,
    ttl: Duration,
    epoch: Instant,
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// `ttl` is the lifetime of a routing-set entry between refreshes.
    pub fn new(node_id: impl Into<String>, bus: Arc<dyn Bus>, ttl: Duration) -> Self {
        Self {
            node_id: node_id.into(),
            bus,
            ttl,
            epoch: Instant::now(),
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn bus(&self) -> &Arc<dyn Bus> {
        &self.bus
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Allocate an id, start its writer task, insert the socket locally,
    /// then join its routing sets.
    pub async fn register(
        self: &Arc<Self>,
        new: NewConnection,
        writer: Box<dyn FrameWriter>,
    ) -> Arc<Connection> {
        let info = ConnectionInfo {
            id: format!("{}:{}", self.node_id, uuid::Uuid::new_v4()),
            kind: new.kind,
            tenant_id: new.tenant_id,
            session_id: new.session_id,
            agent_id: new.agent_id,
            project_ids: new.project_ids,
            node_id: self.node_id.clone(),
            connected_at: Utc::now(),
        };
        let (outbound, queue) = mpsc::channel(OUTBOUND_CAPACITY);
        let conn = Arc::new(Connection {
            info,
            writer: Mutex::new(writer),
            outbound,
            last_seen_ms: AtomicU64::new(self.now_ms()),
            cancel: CancellationToken::new(),
        });
        tokio::spawn(drain_outbound(
            Arc::downgrade(self),
            Arc::clone(&conn),
            queue,
        ));

        self.connections
            .write()
            .await
            .insert(conn.id().to_string(), Arc::clone(&conn));

        self.refresh_routing(&conn).await;
        self.report_counts().await;

        tracing::info!(
            connection_id = %conn.id(),
            kind = %conn.kind(),
            session_id = ?conn.info.session_id,
            agent_id = ?conn.info.agent_id,
            "connection registered"
        );
        conn
    }

    /// Drop a connection: cancel its I/O, close the socket, leave every
    /// routing set. Returns `false` when the id was already gone.
    pub async fn remove(&self, connection_id: &str) -> bool {
        let Some(conn) = self.connections.write().await.remove(connection_id) else {
            return false;
        };

        conn.close().await;

        for key in conn.info.routing_keys() {
            if let Err(e) = self.bus.set_remove(&key, conn.id()).await {
                // TTL expiry cleans up whatever we fail to remove here.
                tracing::warn!(connection_id = %conn.id(), key = %key, error = %e, "failed to leave routing set");
            }
        }
        self.report_counts().await;

        tracing::info!(connection_id = %conn.id(), kind = %conn.kind(), "connection removed");
        true
    }

    pub async fn get(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.connections.read().await.get(connection_id).cloned()
    }

    /// Subset of `ids` that live on this node, in the given order.
    pub async fn local(&self, ids: &[String]) -> Vec<Arc<Connection>> {
        let map = self.connections.read().await;
        ids.iter().filter_map(|id| map.get(id).cloned()).collect()
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Local sockets held by one agent.
    pub async fn agent_connection_count(&self, agent_id: &str) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.info.agent_id.as_deref() == Some(agent_id))
            .count()
    }

    /// Local socket counts by kind.
    pub async fn counts(&self) -> HashMap<ConnectionKind, usize> {
        let mut counts = HashMap::new();
        for conn in self.connections.read().await.values() {
            *counts.entry(conn.kind()).or_insert(0) += 1;
        }
        counts
    }

    /// Write one envelope to one socket and wait for the write. A failed
    /// write removes the connection and reports the transport error.
    pub async fn send(
        self: &Arc<Self>,
        connection_id: &str,
        envelope: &Envelope,
    ) -> Result<(), LivedeskError> {
        let conn = self.get(connection_id).await.ok_or(LivedeskError::NotFound {
            kind: "connection",
            id: connection_id.to_string(),
        })?;
        self.send_to(&conn, envelope).await
    }

    /// [`send`](Self::send) for a handle already in hand.
    pub async fn send_to(
        self: &Arc<Self>,
        conn: &Arc<Connection>,
        envelope: &Envelope,
    ) -> Result<(), LivedeskError> {
        let (done, written) = oneshot::channel();
        self.enqueue(conn, Frame::Text(encode(envelope)?), Some(done))?;
        written.await.unwrap_or_else(|_| Err(conn.closed()))
    }

    /// Queue one envelope without waiting for it to be written. Frames
    /// queued to one connection are written in queue order.
    pub fn dispatch(
        self: &Arc<Self>,
        conn: &Arc<Connection>,
        envelope: &Envelope,
    ) -> Result<(), LivedeskError> {
        self.enqueue(conn, Frame::Text(encode(envelope)?), None)
    }

    /// A full queue means the peer stopped reading; it is evicted.
    fn enqueue(
        self: &Arc<Self>,
        conn: &Arc<Connection>,
        frame: Frame,
        done: Option<oneshot::Sender<Result<(), LivedeskError>>>,
    ) -> Result<(), LivedeskError> {
        match conn.outbound.try_send(Outbound { frame, done }) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    connection_id = %conn.id(),
                    capacity = OUTBOUND_CAPACITY,
                    "outbound queue full, removing connection"
                );
                let registry = Arc::clone(self);
                let id = conn.id().to_string();
                tokio::spawn(async move {
                    registry.remove(&id).await;
                });
                Err(LivedeskError::Transport {
                    connection_id: conn.id().to_string(),
                    message: "outbound queue full".into(),
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(conn.closed()),
        }
    }

    /// Record that the peer is alive and refresh its routing-set TTLs.
    pub async fn touch(&self, connection_id: &str) {
        if let Some(conn) = self.get(connection_id).await {
            conn.last_seen_ms.store(self.now_ms(), Ordering::Relaxed);
            self.refresh_routing(&conn).await;
        }
    }

    async fn refresh_routing(&self, conn: &Connection) {
        for key in conn.info.routing_keys() {
            if let Err(e) = self.bus.set_add(&key, conn.id(), self.ttl).await {
                tracing::warn!(connection_id = %conn.id(), key = %key, error = %e, "failed to join routing set");
            }
        }
    }

    /// One heartbeat pass: reap sockets silent for longer than
    /// `stale_after`, ping the rest and refresh their routing entries.
    /// Returns the number of connections reaped.
    pub async fn heartbeat(self: &Arc<Self>, stale_after: Duration) -> usize {
        let snapshot: Vec<Arc<Connection>> =
            self.connections.read().await.values().cloned().collect();
        let now = self.now_ms();
        let stale_ms = u64::try_from(stale_after.as_millis()).unwrap_or(u64::MAX);

        let mut stale = HashSet::new();
        for conn in &snapshot {
            let idle = now.saturating_sub(conn.last_seen_ms.load(Ordering::Relaxed));
            if idle > stale_ms {
                stale.insert(conn.id().to_string());
            }
        }

        for id in &stale {
            tracing::info!(connection_id = %id, "connection stale, reaping");
            self.remove(id).await;
        }

        for conn in snapshot.iter().filter(|c| !stale.contains(c.id())) {
            if self.enqueue(conn, Frame::Ping, None).is_ok() {
                self.refresh_routing(conn).await;
            }
        }

        stale.len()
    }

    /// Run [`heartbeat`](Self::heartbeat) every `interval` until cancelled.
    pub async fn run_heartbeat(
        self: Arc<Self>,
        interval: Duration,
        stale_after: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.heartbeat(stale_after).await;
                }
                _ = cancel.cancelled() => break,
            }
        }
    }

    /// Remove every connection. Used on shutdown.
    pub async fn drain(&self) -> usize {
        let ids: Vec<String> = self.connections.read().await.keys().cloned().collect();
        let mut drained = 0;
        for id in ids {
            if self.remove(&id).await {
                drained += 1;
            }
        }
        tracing::info!(drained, "connection registry drained");
        drained
    }

    async fn report_counts(&self) {
        let counts = self.counts().await;
        for kind in [ConnectionKind::Visitor, ConnectionKind::Agent] {
            livedesk_prometheus::set_connections(kind, counts.get(&kind).copied().unwrap_or(0));
        }
    }
}

fn encode(envelope: &Envelope) -> Result<String, LivedeskError> {
    envelope
        .to_json()
        .map_err(|e| LivedeskError::Internal(format!("failed to encode envelope: {e}")))
}

/// Writer task of one connection. Ends when the connection is removed or
/// a write fails, in which case it removes the connection.
async fn drain_outbound(
    registry: Weak<ConnectionRegistry>,
    conn: Arc<Connection>,
    mut queue: mpsc::Receiver<Outbound>,
) {
    loop {
        let next = tokio::select! {
            next = queue.recv() => next,
            _ = conn.cancel.cancelled() => None,
        };
        let Some(Outbound { frame, done }) = next else {
            break;
        };

        let result = conn.write(frame).await;
        let failure = result.as_ref().err().map(ToString::to_string);
        if let Some(done) = done {
            // The sender may have stopped waiting.
            let _ = done.send(result);
        }
        if let Some(error) = failure {
            tracing::debug!(connection_id = %conn.id(), error = %error, "write failed, removing connection");
            if let Some(registry) = registry.upgrade() {
                registry.remove(conn.id()).await;
            }
            break;
        }
    }
}
