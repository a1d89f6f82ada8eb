// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestNode` assembles one complete node (registry, fan-out router,
//! pipeline, assignment and alarm engines, session gateway) on a bus handle
//! the test supplies. Several nodes built on the same [`MemoryBus`] behave
//! like a cluster sharing one Redis: routing sets, agent presence and
//! pub/sub are common, everything else is per node.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use livedesk_agentic::AgenticPipeline;
use livedesk_alarm::AlarmEngine;
use livedesk_assignment::{AssignmentEngine, BusPresenceStore};
use livedesk_bus::{MemoryBus, Publisher};
use livedesk_config::LivedeskConfig;
use livedesk_config::model::BrandConfig;
use livedesk_core::{AgentSkill, Bus, KnowledgeChunk, LivedeskError, PresenceStore};
use livedesk_fanout::{ConnectionRegistry, FanoutRouter};
use livedesk_gateway::{AgentIdentity, Peer, SessionGateway, VisitorClaims};
use livedesk_notify::NotificationSink;

use crate::mock_knowledge::StaticKnowledge;
use crate::mock_writer::MockWriter;
use crate::recording_store::RecordingChatStore;

pub const TENANT: &str = "t1";
pub const PROJECT: &str = "p1";

/// Builder for a [`TestNode`].
pub struct TestNodeBuilder {
    node_id: String,
    config: LivedeskConfig,
    knowledge: Vec<KnowledgeChunk>,
}

impl TestNodeBuilder {
    fn new(node_id: &str) -> Self {
        let mut config = LivedeskConfig::default();
        config.bus.channel = "pubsub:test".into();
        config.bus.publish_retry_backoff_ms = 1;
        Self {
            node_id: node_id.to_string(),
            config,
            knowledge: Vec::new(),
        }
    }

    /// Replace the whole configuration. The node id given to the builder wins.
    pub fn with_config(mut self, config: LivedeskConfig) -> Self {
        self.config = config;
        self
    }

    /// Adjust the configuration in place.
    pub fn configure(mut self, f: impl FnOnce(&mut LivedeskConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn with_brand(mut self, project_id: &str, brand: BrandConfig) -> Self {
        self.config.brands.insert(project_id.to_string(), brand);
        self
    }

    /// Chunks every knowledge search returns.
    pub fn with_knowledge(mut self, chunks: Vec<KnowledgeChunk>) -> Self {
        self.knowledge = chunks;
        self
    }

    /// Build the node on `bus` and start its fan-out router.
    pub async fn build(self, bus: Arc<MemoryBus>) -> Result<TestNode, LivedeskError> {
        let config = self.config;
        let shared: Arc<dyn Bus> = bus.clone();
        let cancel = CancellationToken::new();

        let registry = Arc::new(ConnectionRegistry::new(
            &self.node_id,
            Arc::clone(&shared),
            Duration::from_secs(config.bus.connection_ttl_secs),
        ));
        Arc::new(FanoutRouter::new(
            Arc::clone(&registry),
            &config.bus.channel,
            Duration::from_millis(50),
        ))
        .start(cancel.clone())
        .await?;

        let sink = NotificationSink::new(Publisher::new(
            Arc::clone(&shared),
            config.bus.channel.as_str(),
            Duration::from_millis(config.bus.publish_retry_backoff_ms),
        ));
        let presence = Arc::new(BusPresenceStore::new(
            Arc::clone(&shared),
            Duration::from_secs(config.assignment.presence_idle_secs),
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
        let knowledge = Arc::new(StaticKnowledge::new(self.knowledge));
        let pipeline = Arc::new(AgenticPipeline::new(
            &config.agentic,
            &config.knowledge,
            config.brands.clone(),
            knowledge.clone(),
        ));
        let chat_store = Arc::new(RecordingChatStore::new());
        let gateway = Arc::new(
            SessionGateway::new(
                Arc::clone(&registry),
                sink,
                pipeline,
                Arc::clone(&assignments),
                presence.clone(),
                config.assignment.default_max_chats,
            )
            .with_chat_store(chat_store.clone()),
        );

        tracing::debug!(node_id = %self.node_id, "test node started");

        Ok(TestNode {
            node_id: self.node_id,
            bus,
            registry,
            gateway,
            assignments,
            alarms,
            presence,
            knowledge,
            chat_store,
            cancel,
        })
    }
}

/// One running node.
pub struct TestNode {
    pub node_id: String,
    pub bus: Arc<MemoryBus>,
    pub registry: Arc<ConnectionRegistry>,
    pub gateway: Arc<SessionGateway>,
    pub assignments: Arc<AssignmentEngine>,
    pub alarms: Arc<AlarmEngine>,
    pub presence: Arc<BusPresenceStore>,
    pub knowledge: Arc<StaticKnowledge>,
    pub chat_store: Arc<RecordingChatStore>,
    cancel: CancellationToken,
}

impl TestNode {
    pub fn builder(node_id: &str) -> TestNodeBuilder {
        TestNodeBuilder::new(node_id)
    }

    /// A node with default configuration on its own bus.
    pub async fn standalone() -> Result<Self, LivedeskError> {
        Self::builder("node-1")
            .build(Arc::new(MemoryBus::new()))
            .await
    }

    /// Connect a visitor of [`TENANT`]/[`PROJECT`] to `session_id`.
    pub async fn visitor(&self, session_id: &str) -> (Peer, MockWriter) {
        let now = Utc::now().timestamp();
        let claims = VisitorClaims {
            session_id: session_id.to_string(),
            widget_id: "widget-1".into(),
            tenant_id: TENANT.into(),
            project_id: PROJECT.into(),
            visitor_name: Some("Visitor".into()),
            exp: now + 3600,
            iat: now,
        };
        let writer = MockWriter::new();
        let peer = self.gateway.connect_visitor(&claims, writer.boxed()).await;
        (peer, writer)
    }

    /// Connect an agent of [`TENANT`] serving [`PROJECT`], then give its
    /// presence record `skills` and `active_chats`.
    pub async fn agent(
        &self,
        agent_id: &str,
        skills: &[AgentSkill],
        active_chats: u32,
    ) -> (Peer, MockWriter) {
        let identity = AgentIdentity {
            agent_id: agent_id.to_string(),
            tenant_id: TENANT.into(),
            email: format!("{agent_id}@example.com"),
            project_ids: vec![PROJECT.into()],
        };
        let writer = MockWriter::new();
        let peer = self.gateway.connect_agent(&identity, writer.boxed()).await;

        if let Ok(Some(mut record)) = self.presence.get(agent_id).await {
            record.skills = skills.to_vec();
            record.active_chats = active_chats;
            if let Err(e) = self.presence.put(record).await {
                tracing::warn!(agent_id, error = %e, "failed to seed presence");
            }
        }
        (peer, writer)
    }

    /// Send a chat frame as `peer`. Agents address [`PROJECT`] explicitly.
    pub async fn say(&self, peer: &Peer, session_id: &str, content: &str) {
        let frame = json!({
            "type": "chat",
            "session_id": session_id,
            "project_id": PROJECT,
            "data": { "content": content },
        });
        self.gateway.handle_text(peer, &frame.to_string()).await;
    }

    /// Send a raw client frame.
    pub async fn send_raw(&self, peer: &Peer, frame: serde_json::Value) {
        self.gateway.handle_text(peer, &frame.to_string()).await;
    }

    pub async fn disconnect(&self, peer: Peer) {
        self.gateway.disconnect(peer).await;
    }

    /// Stop the router and close every local socket.
    pub async fn shutdown(&self) -> usize {
        self.cancel.cancel();
        self.registry.drain().await
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
