// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fan-out router: the single consumer of the bus subscription on a node.
//!
//! For every envelope it picks routing sets from a fixed decision table,
//! reads their members from the bus, intersects them with the local
//! registry and queues the envelope to what is left. Connections that live
//! on other nodes are skipped; their own router delivers to them.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use livedesk_bus::Backoff;
use livedesk_core::{
    Bus, ConnectionKind, DeliveryMode, Envelope, EnvelopeStream, EnvelopeType, LivedeskError,
    agent_key, project_key, session_key,
};

use crate::registry::ConnectionRegistry;

/// Which members of a routing set may receive the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipients {
    Any,
    AgentsOnly,
}

/// Routing sets selected for one envelope, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub targets: Vec<(String, Recipients)>,
}

impl Route {
    fn new() -> Self {
        Self {
            targets: Vec::new(),
        }
    }

    fn to(mut self, key: String, recipients: Recipients) -> Self {
        self.targets.push((key, recipients));
        self
    }
}

/// The routing decision table.
///
/// | type | origin | sets |
/// |---|---|---|
/// | conversational | visitor, no target agent | session, project (agents) |
/// | conversational | visitor, target agent | session, agent |
/// | conversational | agent | session |
/// | conversational | ai-agent | session, project (agents) |
/// | alarm_*, agent_handoff_request | any | project (agents) |
/// | agent_assigned | direct / unset | agent |
/// | agent_assigned | broadcast-in-session | session |
///
/// An explicit `broadcast_to_project_agents` delivery mode always routes
/// to the project's agents only. Returns `None` for envelopes that cannot
/// be routed (missing target, direct-only types).
pub fn route(env: &Envelope) -> Option<Route> {
    let session = || session_key(&env.session_id);
    let project = || env.project_id.as_deref().map(project_key);
    let agent = || env.agent_id.as_deref().map(agent_key);

    if env.delivery == Some(DeliveryMode::BroadcastToProjectAgents) {
        return project().map(|key| Route::new().to(key, Recipients::AgentsOnly));
    }

    match env.kind {
        EnvelopeType::SessionUpdate => None,
        kind if kind.is_project_broadcast() => {
            project().map(|key| Route::new().to(key, Recipients::AgentsOnly))
        }
        EnvelopeType::AgentAssigned => match env.delivery {
            Some(DeliveryMode::BroadcastInSession) => {
                Some(Route::new().to(session(), Recipients::Any))
            }
            _ => agent().map(|key| Route::new().to(key, Recipients::Any)),
        },
        _ => {
            let base = Route::new().to(session(), Recipients::Any);
            let route = match env.origin {
                Some(ConnectionKind::Agent) => base,
                Some(ConnectionKind::AiAgent) => match project() {
                    Some(key) => base.to(key, Recipients::AgentsOnly),
                    None => base,
                },
                Some(ConnectionKind::Visitor) | None => match (agent(), project()) {
                    (Some(key), _) => base.to(key, Recipients::Any),
                    (None, Some(key)) => base.to(key, Recipients::AgentsOnly),
                    (None, None) => base,
                },
            };
            Some(route)
        }
    }
}

/// Consumes the node's bus subscription and delivers to local sockets.
pub struct FanoutRouter {
    registry: Arc<ConnectionRegistry>,
    bus: Arc<dyn Bus>,
    channel: String,
    max_backoff: Duration,
}

impl FanoutRouter {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        channel: impl Into<String>,
        max_backoff: Duration,
    ) -> Self {
        let bus = Arc::clone(registry.bus());
        Self {
            registry,
            bus,
            channel: channel.into(),
            max_backoff,
        }
    }

    /// Queue one envelope to every matching local socket, at most once per
    /// socket. Returns the number of sockets it was queued to. Never waits
    /// on a socket write.
    pub async fn deliver(&self, env: &Envelope) -> usize {
        let Some(route) = route(env) else {
            tracing::debug!(kind = %env.kind, session_id = %env.session_id, "envelope has no route, dropped");
            return 0;
        };

        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for (key, recipients) in &route.targets {
            let members = match self.bus.set_members(key).await {
                Ok(members) => members,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "failed to read routing set");
                    continue;
                }
            };
            for conn in self.registry.local(&members).await {
                if *recipients == Recipients::AgentsOnly && conn.kind() != ConnectionKind::Agent {
                    continue;
                }
                if seen.insert(conn.id().to_string()) {
                    targets.push(conn);
                }
            }
        }

        // Per-socket order equals bus order: envelopes are queued in the
        // order they are consumed.
        let delivered = targets
            .iter()
            .filter(|conn| self.registry.dispatch(conn, env).is_ok())
            .count();

        tracing::debug!(
            kind = %env.kind,
            session_id = %env.session_id,
            targets = targets.len(),
            delivered,
            "envelope routed"
        );
        livedesk_prometheus::record_delivery(delivered as u64);
        delivered
    }

    /// Subscribe, then spawn the consume loop. The subscription is live
    /// when this returns, so publishes made afterwards are seen.
    pub async fn start(
        self: Arc<Self>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, LivedeskError> {
        let stream = self.bus.subscribe(&self.channel).await?;
        tracing::info!(channel = %self.channel, node_id = %self.registry.node_id(), "fan-out router subscribed");
        Ok(tokio::spawn(self.run(Some(stream), cancel)))
    }

    /// Consume until cancelled, resubscribing with exponential backoff
    /// whenever the subscription fails or ends.
    pub async fn run(self: Arc<Self>, initial: Option<EnvelopeStream>, cancel: CancellationToken) {
        let mut backoff = Backoff::new(Duration::from_secs(1), self.max_backoff);
        let mut current = initial;

        loop {
            let mut stream = match current.take() {
                Some(stream) => stream,
                None => match self.bus.subscribe(&self.channel).await {
                    Ok(stream) => {
                        tracing::info!(channel = %self.channel, "bus subscription re-established");
                        backoff.reset();
                        stream
                    }
                    Err(e) => {
                        let delay = backoff.next_delay();
                        tracing::warn!(error = %e, retry_in = ?delay, "bus subscribe failed");
                        if sleep_or_cancel(delay, &cancel).await {
                            break;
                        }
                        continue;
                    }
                },
            };

            loop {
                tokio::select! {
                    next = stream.next() => match next {
                        Some(env) => {
                            self.deliver(&env).await;
                        }
                        None => break,
                    },
                    _ = cancel.cancelled() => {
                        tracing::info!("fan-out router stopped");
                        return;
                    }
                }
            }

            let delay = backoff.next_delay();
            tracing::warn!(retry_in = ?delay, "bus subscription lost, reconnecting");
            if sleep_or_cancel(delay, &cancel).await {
                break;
            }
        }
        tracing::info!("fan-out router stopped");
    }
}

/// Sleep for `delay`; `true` if cancelled first.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = cancel.cancelled() => true,
    }
}
