// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification sink.
//!
//! The one place where domain events (automatic replies, assignment offers,
//! acceptances, alarms) become [`Envelope`]s. Each method fixes the
//! envelope type, origin and delivery mode so the fan-out router can route
//! on keys alone. Everything goes through the shared [`Publisher`], so a
//! notification that cannot be published is dropped with a warning rather
//! than failing the caller.

use livedesk_bus::Publisher;
use livedesk_core::{ConnectionKind, DeliveryMode, Envelope, EnvelopeType};
use serde_json::{Value, json};
use strum::Display;
use tracing::debug;

/// Display name used on automatic replies.
pub const AI_AUTHOR_NAME: &str = "AI Assistant";

/// The conversation a notification belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionScope {
    pub tenant_id: String,
    pub project_id: String,
    pub session_id: String,
}

impl SessionScope {
    pub fn new(
        tenant_id: impl Into<String>,
        project_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            project_id: project_id.into(),
            session_id: session_id.into(),
        }
    }

    fn envelope(&self, kind: EnvelopeType) -> Envelope {
        Envelope::new(kind, &self.session_id).with_scope(&self.tenant_id, &self.project_id)
    }
}

/// Alarm lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AlarmEvent {
    Triggered,
    Escalated,
    Acknowledged,
}

impl AlarmEvent {
    fn envelope_type(self) -> EnvelopeType {
        match self {
            AlarmEvent::Triggered => EnvelopeType::AlarmTriggered,
            AlarmEvent::Escalated => EnvelopeType::AlarmEscalated,
            AlarmEvent::Acknowledged => EnvelopeType::AlarmAcknowledged,
        }
    }
}

#[derive(Clone)]
pub struct NotificationSink {
    publisher: Publisher,
}

impl NotificationSink {
    pub fn new(publisher: Publisher) -> Self {
        Self { publisher }
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Automatic reply into the session, visible to the visitor and the
    /// project's agents.
    pub async fn ai_reply(
        &self,
        scope: &SessionScope,
        content: &str,
        message_type: &str,
        citations: &[String],
    ) -> bool {
        let mut data = json!({
            "content": content,
            "message_type": message_type,
            "author_type": ConnectionKind::AiAgent,
            "author_name": AI_AUTHOR_NAME,
        });
        if !citations.is_empty() {
            data["citations"] = json!(citations);
        }
        self.send(
            scope
                .envelope(EnvelopeType::Chat)
                .from_origin(ConnectionKind::AiAgent)
                .with_data(data),
        )
        .await
    }

    /// Status line shown in the conversation ("connecting you with an agent").
    pub async fn system_message(&self, scope: &SessionScope, content: &str) -> bool {
        self.ai_reply(scope, content, "system", &[]).await
    }

    /// Offer of a session to one agent.
    pub async fn agent_assigned(&self, scope: &SessionScope, agent_id: &str, data: Value) -> bool {
        self.send(
            scope
                .envelope(EnvelopeType::AgentAssigned)
                .with_agent(agent_id)
                .with_delivery(DeliveryMode::DirectToAgent)
                .with_data(data),
        )
        .await
    }

    /// The accepting agent joined; tells the visitor side of the session.
    pub async fn assignment_accepted(
        &self,
        scope: &SessionScope,
        agent_id: &str,
        data: Value,
    ) -> bool {
        self.send(
            scope
                .envelope(EnvelopeType::AgentAssigned)
                .with_agent(agent_id)
                .with_delivery(DeliveryMode::BroadcastInSession)
                .with_data(data),
        )
        .await
    }

    /// Asks every agent of the project to pick up the session.
    pub async fn handoff_request(&self, scope: &SessionScope, data: Value) -> bool {
        self.send(
            scope
                .envelope(EnvelopeType::AgentHandoffRequest)
                .with_delivery(DeliveryMode::BroadcastToProjectAgents)
                .with_data(data),
        )
        .await
    }

    /// Alarm event for the agents of `project_id`. `session_id` is empty for
    /// alarms not bound to a conversation.
    pub async fn alarm(
        &self,
        event: AlarmEvent,
        tenant_id: &str,
        project_id: &str,
        session_id: &str,
        data: Value,
    ) -> bool {
        self.send(
            Envelope::new(event.envelope_type(), session_id)
                .with_scope(tenant_id, project_id)
                .with_delivery(DeliveryMode::BroadcastToProjectAgents)
                .with_data(data),
        )
        .await
    }

    async fn send(&self, envelope: Envelope) -> bool {
        debug!(
            kind = %envelope.kind,
            session_id = %envelope.session_id,
            agent_id = envelope.agent_id.as_deref().unwrap_or(""),
            "notification"
        );
        self.publisher.publish(envelope).await
    }
}
