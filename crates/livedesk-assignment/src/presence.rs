// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent presence directory kept on the bus, shared by every node.
//!
//! Each record is stored as JSON under `presence:<agent_id>` and expires
//! `idle` after the agent's last activity, so an agent nobody hears from
//! drops out on its own. A per-tenant index set `presence:tenant:<id>`
//! names the agents to read back; members whose record is gone are
//! removed from it on read.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use livedesk_core::{AgentPresence, AgentStatus, Bus, LivedeskError, PresenceStore};
use tokio::sync::Mutex;
use tracing::{debug, warn};

fn record_key(agent_id: &str) -> String {
    format!("presence:{agent_id}")
}

fn tenant_key(tenant_id: &str) -> String {
    format!("presence:tenant:{tenant_id}")
}

/// Presence records on a shared [`Bus`].
pub struct BusPresenceStore {
    bus: Arc<dyn Bus>,
    idle: Duration,
    /// Serializes read-modify-write cycles issued by this node.
    writes: Mutex<()>,
}

impl BusPresenceStore {
    pub fn new(bus: Arc<dyn Bus>, idle: Duration) -> Self {
        Self {
            bus,
            idle,
            writes: Mutex::new(()),
        }
    }

    /// Stores `record` as given, replacing skills and load too.
    pub async fn put(&self, record: AgentPresence) -> Result<(), LivedeskError> {
        let _guard = self.writes.lock().await;
        self.save(&record).await
    }

    fn missing(agent_id: &str) -> LivedeskError {
        LivedeskError::NotFound {
            kind: "agent",
            id: agent_id.to_string(),
        }
    }

    /// Time left before the record counts as idle.
    fn remaining(&self, record: &AgentPresence, now: DateTime<Utc>) -> Duration {
        let idle_for = (now - record.last_activity)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.idle.saturating_sub(idle_for)
    }

    async fn load(&self, agent_id: &str) -> Result<Option<AgentPresence>, LivedeskError> {
        let Some(raw) = self.bus.value_get(&record_key(agent_id)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(agent_id, error = %e, "unreadable presence record ignored");
                Ok(None)
            }
        }
    }

    async fn save(&self, record: &AgentPresence) -> Result<(), LivedeskError> {
        let ttl = self.remaining(record, Utc::now());
        if ttl.is_zero() {
            debug!(agent_id = %record.agent_id, "presence record already idle, dropped");
            self.bus.value_delete(&record_key(&record.agent_id)).await?;
            return self
                .bus
                .set_remove(&tenant_key(&record.tenant_id), &record.agent_id)
                .await;
        }
        let raw = serde_json::to_string(record)
            .map_err(|e| LivedeskError::Internal(format!("failed to encode presence: {e}")))?;
        self.bus
            .value_set(&record_key(&record.agent_id), &raw, ttl)
            .await?;
        self.bus
            .set_add(&tenant_key(&record.tenant_id), &record.agent_id, self.idle)
            .await
    }

    /// Applies `change` to the stored record. Returns `false` when there is none.
    async fn modify<F>(&self, agent_id: &str, change: F) -> Result<bool, LivedeskError>
    where
        F: FnOnce(&mut AgentPresence) + Send,
    {
        let _guard = self.writes.lock().await;
        let Some(mut record) = self.load(agent_id).await? else {
            return Ok(false);
        };
        change(&mut record);
        self.save(&record).await?;
        Ok(true)
    }
}

#[async_trait]
impl PresenceStore for BusPresenceStore {
    async fn list(&self, tenant_id: &str) -> Result<Vec<AgentPresence>, LivedeskError> {
        let index = tenant_key(tenant_id);
        let mut agents = Vec::new();
        for agent_id in self.bus.set_members(&index).await? {
            match self.load(&agent_id).await? {
                Some(record) if record.tenant_id == tenant_id => agents.push(record),
                _ => {
                    if let Err(e) = self.bus.set_remove(&index, &agent_id).await {
                        debug!(agent_id = %agent_id, error = %e, "stale presence index entry kept");
                    }
                }
            }
        }
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(agents)
    }

    async fn get(&self, agent_id: &str) -> Result<Option<AgentPresence>, LivedeskError> {
        self.load(agent_id).await
    }

    async fn upsert(&self, presence: AgentPresence) -> Result<(), LivedeskError> {
        let _guard = self.writes.lock().await;
        let record = match self.load(&presence.agent_id).await? {
            Some(mut existing) => {
                existing.status = presence.status;
                existing.last_activity = presence.last_activity;
                if !presence.name.is_empty() {
                    existing.name = presence.name;
                }
                if !presence.project_ids.is_empty() {
                    existing.project_ids = presence.project_ids;
                }
                existing
            }
            None => presence,
        };
        self.save(&record).await
    }

    async fn touch(&self, agent_id: &str, at: DateTime<Utc>) -> Result<bool, LivedeskError> {
        self.modify(agent_id, |record| {
            record.last_activity = record.last_activity.max(at);
        })
        .await
    }

    async fn update_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
    ) -> Result<(), LivedeskError> {
        let found = self
            .modify(agent_id, |record| {
                record.status = status;
                record.last_activity = Utc::now();
            })
            .await?;
        if found { Ok(()) } else { Err(Self::missing(agent_id)) }
    }

    async fn update_workload(
        &self,
        agent_id: &str,
        active_chats: u32,
    ) -> Result<(), LivedeskError> {
        let found = self
            .modify(agent_id, |record| record.active_chats = active_chats)
            .await?;
        if found { Ok(()) } else { Err(Self::missing(agent_id)) }
    }

    async fn record_assignment(
        &self,
        agent_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), LivedeskError> {
        let found = self
            .modify(agent_id, |record| record.last_assignment = Some(at))
            .await?;
        if found { Ok(()) } else { Err(Self::missing(agent_id)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livedesk_bus::MemoryBus;

    const IDLE: Duration = Duration::from_secs(600);

    fn store() -> BusPresenceStore {
        BusPresenceStore::new(Arc::new(MemoryBus::new()), IDLE)
    }

    #[tokio::test]
    async fn upsert_refreshes_without_resetting_load() {
        let store = store();
        let now = Utc::now();
        store
            .upsert(AgentPresence::online("a1", "t1", 5, now).with_projects(["p1"]))
            .await
            .unwrap();
        store.update_workload("a1", 3).await.unwrap();
        store.update_status("a1", AgentStatus::Away).await.unwrap();

        store.upsert(AgentPresence::online("a1", "t1", 5, now)).await.unwrap();
        let record = store.get("a1").await.unwrap().unwrap();
        assert_eq!(record.status, AgentStatus::Online);
        assert_eq!(record.active_chats, 3);
        assert_eq!(record.project_ids, vec!["p1"]);
    }

    #[tokio::test]
    async fn put_replaces_skills_and_load() {
        let store = store();
        store.upsert(AgentPresence::online("a1", "t1", 5, Utc::now())).await.unwrap();

        let mut record = store.get("a1").await.unwrap().unwrap();
        record.skills = vec![livedesk_core::AgentSkill::Billing];
        record.active_chats = 4;
        store.put(record).await.unwrap();

        let stored = store.get("a1").await.unwrap().unwrap();
        assert_eq!(stored.skills, vec![livedesk_core::AgentSkill::Billing]);
        assert_eq!(stored.active_chats, 4);
    }

    #[tokio::test]
    async fn list_is_tenant_scoped_and_sorted() {
        let store = store();
        let now = Utc::now();
        for (agent, tenant) in [("b", "t1"), ("a", "t1"), ("c", "t2")] {
            store.upsert(AgentPresence::online(agent, tenant, 5, now)).await.unwrap();
        }
        let ids: Vec<String> = store.list("t1").await.unwrap().into_iter().map(|p| p.agent_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn updates_on_unknown_agent_fail() {
        let store = store();
        let err = store.update_workload("ghost", 1).await.unwrap_err();
        assert!(matches!(err, LivedeskError::NotFound { kind: "agent", .. }));
        assert!(!store.touch("ghost", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn records_are_shared_between_stores_on_one_bus() {
        let bus: Arc<dyn Bus> = Arc::new(MemoryBus::new());
        let node1 = BusPresenceStore::new(Arc::clone(&bus), IDLE);
        let node2 = BusPresenceStore::new(bus, IDLE);

        node2
            .upsert(AgentPresence::online("a1", "t1", 5, Utc::now()))
            .await
            .unwrap();
        node1.update_workload("a1", 2).await.unwrap();

        let seen = node2.list("t1").await.unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].active_chats, 2);
    }

    #[tokio::test]
    async fn idle_records_are_not_stored() {
        let store = store();
        let now = Utc::now();
        store
            .upsert(AgentPresence::online("old", "t1", 5, now - chrono::Duration::minutes(20)))
            .await
            .unwrap();
        store.upsert(AgentPresence::online("new", "t1", 5, now)).await.unwrap();

        assert!(store.get("old").await.unwrap().is_none());
        let ids: Vec<String> = store.list("t1").await.unwrap().into_iter().map(|p| p.agent_id).collect();
        assert_eq!(ids, vec!["new"]);
    }

    #[tokio::test(start_paused = true)]
    async fn touch_keeps_an_agent_past_the_idle_window() {
        let store = store();
        store
            .upsert(AgentPresence::online("quiet", "t1", 5, Utc::now()))
            .await
            .unwrap();
        store
            .upsert(AgentPresence::online("gone", "t1", 5, Utc::now()))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(500)).await;
        assert!(store.touch("quiet", Utc::now()).await.unwrap());
        tokio::time::advance(Duration::from_secs(200)).await;

        assert!(store.get("quiet").await.unwrap().is_some());
        assert!(store.get("gone").await.unwrap().is_none());
        let ids: Vec<String> = store.list("t1").await.unwrap().into_iter().map(|p| p.agent_id).collect();
        assert_eq!(ids, vec!["quiet"]);
    }
}
