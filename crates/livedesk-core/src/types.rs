// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the broker, the agentic pipeline and the engines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by bus health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Backend is fully operational.
    Healthy,
    /// Backend is operational but experiencing issues.
    Degraded(String),
    /// Backend is not operational.
    Unhealthy(String),
}

/// Who sits on the far side of a socket, and who authored an envelope.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionKind {
    Visitor,
    Agent,
    AiAgent,
}

/// How the fan-out router should pick recipients for an envelope.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    BroadcastInSession,
    DirectToAgent,
    BroadcastToProjectAgents,
}

/// Category of a customer's request for a human.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    #[default]
    General,
    Technical,
    Billing,
    Complaint,
    Urgent,
    Support,
}

/// How pressing a customer's request is.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    #[default]
    Low,
    Normal,
    High,
    Critical,
}

/// Priority of an assignment or alarm. Derived one-to-one from [`Urgency`].
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl From<Urgency> for Priority {
    fn from(urgency: Urgency) -> Self {
        match urgency {
            Urgency::Low => Priority::Low,
            Urgency::Normal => Priority::Normal,
            Urgency::High => Priority::High,
            Urgency::Critical => Priority::Critical,
        }
    }
}

/// Availability an agent advertises to the assignment engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Away,
    Busy,
    Dnd,
    Offline,
}

/// A skill tag used to match agents to request types.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AgentSkill {
    General,
    Technical,
    Billing,
    Support,
    Sales,
    Complaint,
}

/// An agent's current availability, load and skills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPresence {
    pub agent_id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub name: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub skills: Vec<AgentSkill>,
    /// Projects the agent may take conversations for.
    #[serde(default)]
    pub project_ids: Vec<String>,
    pub active_chats: u32,
    pub max_chats: u32,
    /// Rolling average time to first response, in seconds.
    #[serde(default)]
    pub avg_response_secs: f64,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub last_assignment: Option<DateTime<Utc>>,
}

impl AgentPresence {
    /// A freshly connected agent: online, idle, never assigned.
    pub fn online(
        agent_id: impl Into<String>,
        tenant_id: impl Into<String>,
        max_chats: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            tenant_id: tenant_id.into(),
            name: String::new(),
            status: AgentStatus::Online,
            skills: vec![AgentSkill::General],
            project_ids: Vec::new(),
            active_chats: 0,
            max_chats,
            avg_response_secs: 0.0,
            last_activity: now,
            last_assignment: None,
        }
    }

    /// `active_chats / max_chats`, clamped to `[0, 1]`. An agent with no
    /// capacity is always fully loaded.
    pub fn workload(&self) -> f64 {
        if self.max_chats == 0 {
            return 1.0;
        }
        (f64::from(self.active_chats) / f64::from(self.max_chats)).min(1.0)
    }

    pub fn with_projects<I, S>(mut self, project_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.project_ids = project_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_skill(&self, skill: AgentSkill) -> bool {
        self.skills.contains(&skill)
    }

    /// Whether the agent is authorized for `project_id`.
    pub fn serves(&self, project_id: &str) -> bool {
        self.project_ids.iter().any(|p| p == project_id)
    }
}

/// Where a knowledge chunk came from, for citation formatting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Document,
    Webpage,
    #[default]
    Other,
}

/// One hit returned by a knowledge search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub content: String,
    /// Similarity in `[0, 1]`.
    pub score: f64,
    pub source: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub kind: ChunkKind,
}
