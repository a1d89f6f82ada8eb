// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `livedesk serve` command implementation.
//!
//! Connects the bus, builds the per-node components (registry, fan-out
//! router, pipeline, assignment and alarm engines, session gateway), starts
//! the background tickers and serves the gateway until a shutdown signal.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use livedesk_agentic::AgenticPipeline;
use livedesk_alarm::AlarmEngine;
use livedesk_assignment::{AssignmentEngine, BusPresenceStore};
use livedesk_bus::Publisher;
use livedesk_config::LivedeskConfig;
use livedesk_core::{KnowledgeChunk, KnowledgeSource, LivedeskError};
use livedesk_fanout::{ConnectionRegistry, FanoutRouter};
use livedesk_gateway::{GatewayState, HealthState, SessionGateway, TokenVerifier, start_server};
use livedesk_notify::NotificationSink;
use livedesk_prometheus::PrometheusExporter;

use crate::shutdown;

/// Knowledge source used when no knowledge base is attached to the node.
/// Every search comes back empty, so questions fall through to handoff
/// detection.
struct DetachedKnowledge;

#[async_trait]
impl KnowledgeSource for DetachedKnowledge {
    async fn search(
        &self,
        _tenant_id: &str,
        project_id: &str,
        _query: &str,
        _top_k: usize,
    ) -> Result<Vec<KnowledgeChunk>, LivedeskError> {
        debug!(project_id, "no knowledge base attached");
        Ok(Vec::new())
    }
}

/// The components of one running node.
struct Node {
    state: GatewayState,
    registry: Arc<ConnectionRegistry>,
    router_task: JoinHandle<()>,
    router_cancel: CancellationToken,
}

/// Builds every component and starts the fan-out router.
async fn build_node(
    config: &LivedeskConfig,
    node_id: String,
    prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
) -> Result<Node, LivedeskError> {
    let bus = livedesk_bus::connect(&config.bus).await?;

    let registry = Arc::new(ConnectionRegistry::new(
        &node_id,
        Arc::clone(&bus),
        Duration::from_secs(config.bus.connection_ttl_secs),
    ));
    let router_cancel = CancellationToken::new();
    let router_task = Arc::new(FanoutRouter::new(
        Arc::clone(&registry),
        &config.bus.channel,
        Duration::from_secs(config.bus.reconnect_max_backoff_secs),
    ))
    .start(router_cancel.clone())
    .await?;

    let presence = Arc::new(BusPresenceStore::new(
        Arc::clone(&bus),
        Duration::from_secs(config.assignment.presence_idle_secs),
    ));
    let sink = NotificationSink::new(Publisher::new(
        bus,
        config.bus.channel.as_str(),
        Duration::from_millis(config.bus.publish_retry_backoff_ms),
    ));
    let alarms = Arc::new(AlarmEngine::new(
        sink.clone(),
        Duration::from_secs(config.alarm.max_level_grace_secs),
    ));
    let assignments = Arc::new(AssignmentEngine::new(
        presence.clone(),
        sink.clone(),
        Arc::clone(&alarms),
        config.assignment.clone(),
        config.agentic.notification_alerts,
    ));
    let pipeline = Arc::new(AgenticPipeline::new(
        &config.agentic,
        &config.knowledge,
        config.brands.clone(),
        Arc::new(DetachedKnowledge),
    ));
    let gateway = Arc::new(SessionGateway::new(
        Arc::clone(&registry),
        sink,
        pipeline,
        Arc::clone(&assignments),
        presence.clone(),
        config.assignment.default_max_chats,
    ));

    let state = GatewayState {
        gateway,
        verifier: Arc::new(TokenVerifier::from_config(&config.auth)),
        assignments,
        alarms,
        health: HealthState {
            start_time: Instant::now(),
            node_id,
            prometheus_render,
        },
    };

    Ok(Node {
        state,
        registry,
        router_task,
        router_cancel,
    })
}

/// Spawns the heartbeat, escalation ticker and assignment sweeper. All stop
/// when `cancel` fires.
fn spawn_background(
    node: &Node,
    config: &LivedeskConfig,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let ping = Duration::from_secs(config.livechat.ping_interval_secs);
    let stale_after = Duration::from_secs(config.livechat.stale_after_secs);
    let tick = Duration::from_secs(config.alarm.tick_interval_secs);

    vec![
        tokio::spawn(
            Arc::clone(&node.registry).run_heartbeat(ping, stale_after, cancel.clone()),
        ),
        tokio::spawn(Arc::clone(&node.state.alarms).run_ticker(tick, cancel.clone())),
        tokio::spawn(Arc::clone(&node.state.assignments).run_sweeper(cancel.clone())),
    ]
}

/// Runs the `livedesk serve` command.
///
/// Shutdown order: stop accepting sockets, stop the tickers, drain the
/// registry (closing every local socket and leaving the routing sets), then
/// stop the fan-out router.
pub async fn run_serve(config: LivedeskConfig) -> Result<(), LivedeskError> {
    init_tracing(&config.server.log_level);

    let node_id = config
        .server
        .node_id
        .clone()
        .unwrap_or_else(|| format!("node-{}", uuid::Uuid::new_v4()));
    info!(node_id = %node_id, backend = ?config.bus.backend, "starting livedesk serve");

    let prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>> =
        if config.prometheus.enabled {
            match PrometheusExporter::install() {
                Ok(exporter) => Some(Arc::new(move || exporter.render())),
                Err(e) => {
                    warn!(error = %e, "metrics disabled");
                    None
                }
            }
        } else {
            None
        };

    let node = build_node(&config, node_id, prometheus_render).await?;

    let shutdown = shutdown::install_signal_handler();
    let tickers = CancellationToken::new();
    let background = spawn_background(&node, &config, &tickers);

    let mut server = {
        let host = config.server.host.clone();
        let port = config.server.port;
        let state = node.state.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { start_server(&host, port, state, shutdown).await })
    };

    let served = tokio::select! {
        result = &mut server => Some(result),
        _ = shutdown.cancelled() => None,
    };

    tickers.cancel();
    for task in background {
        let _ = task.await;
    }
    node.registry.drain().await;

    let result = match served {
        Some(result) => result,
        None => server.await,
    };

    node.router_cancel.cancel();
    let _ = node.router_task.await;

    info!("livedesk serve shutdown complete");
    result.map_err(|e| LivedeskError::Internal(format!("gateway task failed: {e}")))?
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("livedesk={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn built_node_reports_health() {
        let config = LivedeskConfig::default();
        let node = build_node(&config, "node-test".into(), None).await.unwrap();

        let response = livedesk_gateway::router(node.state.clone())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        node.router_cancel.cancel();
        node.router_task.await.unwrap();
    }

    #[tokio::test]
    async fn detached_knowledge_is_empty() {
        let hits = DetachedKnowledge.search("t1", "p1", "hours", 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn background_tasks_stop_on_cancel() {
        let config = LivedeskConfig::default();
        let node = build_node(&config, "node-test".into(), None).await.unwrap();
        let cancel = CancellationToken::new();
        let tasks = spawn_background(&node, &config, &cancel);
        cancel.cancel();
        for task in tasks {
            tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .expect("task should stop")
                .unwrap();
        }
        node.router_cancel.cancel();
    }
}
