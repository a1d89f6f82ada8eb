// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The routed message record and the routing-index key scheme.
//!
//! An [`Envelope`] is the only type that crosses the bus. The same JSON
//! shape is written to sockets, so clients see exactly what nodes see.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::{ConnectionKind, DeliveryMode};

/// Envelope discriminator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeType {
    Chat,
    Typing,
    Read,
    Join,
    Leave,
    AgentAssigned,
    AgentHandoffRequest,
    AlarmTriggered,
    AlarmAcknowledged,
    AlarmEscalated,
    AiResponse,
    /// Direct socket notices (welcome, pong, errors). Never published.
    SessionUpdate,
}

impl EnvelopeType {
    /// Conversation events routed by session/agent membership.
    pub fn is_conversational(self) -> bool {
        matches!(
            self,
            Self::Chat | Self::Typing | Self::Read | Self::Join | Self::Leave | Self::AiResponse
        )
    }

    /// Events delivered to the agents of a project, never to visitors.
    pub fn is_project_broadcast(self) -> bool {
        matches!(
            self,
            Self::AlarmTriggered
                | Self::AlarmAcknowledged
                | Self::AlarmEscalated
                | Self::AgentHandoffRequest
        )
    }
}

/// A routed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Target agent when the envelope is directed at one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<ConnectionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryMode>,
    /// Originating connection, so clients can drop their own echo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    /// Assigned at publish.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new(kind: EnvelopeType, session_id: impl Into<String>) -> Self {
        Self {
            kind,
            session_id: session_id.into(),
            tenant_id: None,
            project_id: None,
            agent_id: None,
            origin: None,
            delivery: None,
            connection_id: None,
            timestamp: None,
            data: serde_json::Value::Null,
        }
    }

    pub fn with_scope(mut self, tenant_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn from_origin(mut self, origin: ConnectionKind) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = Some(delivery);
        self
    }

    pub fn with_connection(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = Some(connection_id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Stamp the publish time. Later stamps overwrite earlier ones.
    pub fn stamp(&mut self, at: DateTime<Utc>) {
        self.timestamp = Some(at);
    }

    /// Encode for the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from the wire.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Routing set of every connection in a visitor session.
pub fn session_key(session_id: &str) -> String {
    format!("session:{session_id}")
}

/// Routing set of every socket an agent has open.
pub fn agent_key(agent_id: &str) -> String {
    format!("agent:{agent_id}")
}

/// Routing set of every agent socket subscribed to a project.
pub fn project_key(project_id: &str) -> String {
    format!("project:{project_id}")
}
