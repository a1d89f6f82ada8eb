// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent presence store trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::LivedeskError;
use crate::types::{AgentPresence, AgentStatus};

/// Directory of agent availability, load and skills.
#[async_trait]
pub trait PresenceStore: Send + Sync + 'static {
    /// All presence records for a tenant, in any status.
    async fn list(&self, tenant_id: &str) -> Result<Vec<AgentPresence>, LivedeskError>;

    async fn get(&self, agent_id: &str) -> Result<Option<AgentPresence>, LivedeskError>;

    /// Insert a record, or refresh status, activity and projects of an
    /// existing one. Load and skills of an existing record are kept.
    async fn upsert(&self, presence: AgentPresence) -> Result<(), LivedeskError>;

    /// Record activity at `at` without changing status. Returns `false`
    /// when there is no record for the agent.
    async fn touch(&self, agent_id: &str, at: DateTime<Utc>) -> Result<bool, LivedeskError>;

    async fn update_status(&self, agent_id: &str, status: AgentStatus)
    -> Result<(), LivedeskError>;

    async fn update_workload(&self, agent_id: &str, active_chats: u32)
    -> Result<(), LivedeskError>;

    /// Record that an assignment was offered to the agent at `at`.
    async fn record_assignment(
        &self,
        agent_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), LivedeskError>;
}
