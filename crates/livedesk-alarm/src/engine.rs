// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The alarm engine.
//!
//! Active alarms live in one map keyed by alarm id. A ticker walks the map,
//! raising each unacknowledged alarm one level per policy interval until
//! it reaches the policy's max level, where it is kept for a grace period
//! and then dropped. Notifications are published after the lock is
//! released.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use livedesk_core::{LivedeskError, Priority, Urgency};
use livedesk_notify::{AlarmEvent, NotificationSink};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::policy::{AlarmLevel, EscalationPolicy};

/// Number of acknowledgments remembered for idempotent repeats.
const ACK_MEMORY: usize = 1024;

/// What raised the alarm.
#[derive(Debug, Clone)]
pub struct AlarmTrigger {
    pub tenant_id: String,
    pub project_id: String,
    /// Empty when the alarm is not bound to a conversation.
    pub session_id: String,
    pub assignment_id: Option<String>,
    pub agent_id: Option<String>,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub urgency: Urgency,
}

impl AlarmTrigger {
    /// Only high and critical priorities, or critical urgency, raise alarms.
    pub fn qualifies(&self) -> bool {
        self.priority >= Priority::High || self.urgency == Urgency::Critical
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveAlarm {
    pub id: String,
    pub tenant_id: String,
    pub project_id: String,
    pub session_id: String,
    pub assignment_id: Option<String>,
    pub agent_id: Option<String>,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub current_level: AlarmLevel,
    pub started_at: DateTime<Utc>,
    pub last_escalation: DateTime<Utc>,
    pub escalation_count: u32,
    /// Set once the alarm sits at its max level.
    pub max_level_since: Option<DateTime<Utc>>,
    pub policy: EscalationPolicy,
}

impl ActiveAlarm {
    fn payload(&self) -> Value {
        json!({
            "alarm_id": self.id,
            "assignment_id": self.assignment_id,
            "agent_id": self.agent_id,
            "session_id": self.session_id,
            "title": self.title,
            "message": self.message,
            "priority": self.priority,
            "current_level": self.current_level,
            "escalation_count": self.escalation_count,
            "started_at": self.started_at,
            "channels": self.policy.channels,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Acknowledgment {
    pub alarm_id: String,
    pub agent_id: String,
    pub acknowledged_at: DateTime<Utc>,
    pub response: String,
    pub final_level: AlarmLevel,
    pub escalation_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlarmStats {
    pub total_active: usize,
    pub by_level: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    pub average_age_secs: f64,
    /// Keyed `"{n}_escalations"`.
    pub escalation_counts: BTreeMap<String, usize>,
}

#[derive(Default)]
struct State {
    active: HashMap<String, ActiveAlarm>,
    acknowledged: HashMap<String, Acknowledgment>,
    /// Acknowledged ids, oldest first.
    ack_order: VecDeque<String>,
}

pub struct AlarmEngine {
    sink: NotificationSink,
    grace: Duration,
    state: Mutex<State>,
}

impl AlarmEngine {
    pub fn new(sink: NotificationSink, max_level_grace: Duration) -> Self {
        Self {
            sink,
            grace: max_level_grace,
            state: Mutex::new(State::default()),
        }
    }

    /// Records a new alarm and announces it to the project's agents.
    /// Returns `None` when the trigger does not qualify.
    pub async fn trigger(&self, trigger: AlarmTrigger) -> Option<ActiveAlarm> {
        if !trigger.qualifies() {
            debug!(priority = %trigger.priority, "below alarm priority, not raised");
            return None;
        }

        let now = Utc::now();
        let policy = EscalationPolicy::for_priority(trigger.priority);
        let alarm = ActiveAlarm {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: trigger.tenant_id,
            project_id: trigger.project_id,
            session_id: trigger.session_id,
            assignment_id: trigger.assignment_id,
            agent_id: trigger.agent_id,
            title: trigger.title,
            message: trigger.message,
            priority: trigger.priority,
            current_level: policy.initial_level,
            started_at: now,
            last_escalation: now,
            escalation_count: 0,
            max_level_since: (policy.max_escalations() == 0).then_some(now),
            policy,
        };

        self.state
            .lock()
            .await
            .active
            .insert(alarm.id.clone(), alarm.clone());

        info!(
            alarm_id = %alarm.id,
            assignment_id = alarm.assignment_id.as_deref().unwrap_or(""),
            level = %alarm.current_level,
            priority = %alarm.priority,
            "alarm triggered"
        );
        livedesk_prometheus::record_alarm("triggered");
        self.announce(AlarmEvent::Triggered, &alarm, alarm.payload())
            .await;
        Some(alarm)
    }

    /// Points an alarm at the successor of a declined or expired offer.
    pub async fn rebind(&self, alarm_id: &str, assignment_id: &str, agent_id: Option<&str>) {
        if let Some(alarm) = self.state.lock().await.active.get_mut(alarm_id) {
            alarm.assignment_id = Some(assignment_id.to_string());
            alarm.agent_id = agent_id.map(str::to_string);
        }
    }

    /// Escalates due alarms and drops those past their grace period.
    /// Returns the number of escalations.
    pub async fn tick(&self, now: DateTime<Utc>) -> usize {
        let (escalated, expired) = {
            let mut state = self.state.lock().await;
            let mut escalated = Vec::new();
            let mut expired = Vec::new();

            for alarm in state.active.values_mut() {
                if let Some(since) = alarm.max_level_since {
                    if elapsed(since, now) >= self.grace {
                        expired.push(alarm.id.clone());
                    }
                    continue;
                }
                if elapsed(alarm.last_escalation, now) < alarm.policy.interval {
                    continue;
                }
                alarm.current_level = alarm.current_level.next();
                alarm.escalation_count += 1;
                alarm.last_escalation = now;
                if alarm.current_level >= alarm.policy.max_level {
                    alarm.max_level_since = Some(now);
                }
                escalated.push(alarm.clone());
            }

            for id in &expired {
                state.active.remove(id);
            }
            (escalated, expired)
        };

        for id in &expired {
            info!(alarm_id = %id, "alarm expired at max level");
            livedesk_prometheus::record_alarm("expired");
        }
        for alarm in &escalated {
            info!(
                alarm_id = %alarm.id,
                level = %alarm.current_level,
                escalation_count = alarm.escalation_count,
                "alarm escalated"
            );
            livedesk_prometheus::record_alarm("escalated");
            self.announce(AlarmEvent::Escalated, alarm, alarm.payload())
                .await;
        }
        escalated.len()
    }

    /// Removes the alarm and tells the project. Repeating an acknowledgment
    /// returns the original one.
    pub async fn acknowledge(
        &self,
        alarm_id: &str,
        agent_id: &str,
        response: &str,
    ) -> Result<Acknowledgment, LivedeskError> {
        let (alarm, ack) = {
            let mut state = self.state.lock().await;
            if let Some(previous) = state.acknowledged.get(alarm_id) {
                return Ok(previous.clone());
            }
            let alarm = state.active.remove(alarm_id).ok_or_else(|| LivedeskError::NotFound {
                kind: "alarm",
                id: alarm_id.to_string(),
            })?;
            let ack = Acknowledgment {
                alarm_id: alarm.id.clone(),
                agent_id: agent_id.to_string(),
                acknowledged_at: Utc::now(),
                response: response.to_string(),
                final_level: alarm.current_level,
                escalation_count: alarm.escalation_count,
            };
            while state.ack_order.len() >= ACK_MEMORY {
                if let Some(oldest) = state.ack_order.pop_front() {
                    state.acknowledged.remove(&oldest);
                }
            }
            state.ack_order.push_back(alarm.id.clone());
            state.acknowledged.insert(alarm.id.clone(), ack.clone());
            (alarm, ack)
        };

        info!(alarm_id = %alarm.id, agent_id, "alarm acknowledged");
        livedesk_prometheus::record_alarm("acknowledged");
        let data = json!({
            "alarm_id": alarm.id,
            "assignment_id": alarm.assignment_id,
            "acknowledged_by": ack.agent_id,
            "acknowledged_at": ack.acknowledged_at,
            "response": ack.response,
            "final_level": ack.final_level,
            "escalation_count": ack.escalation_count,
            "total_duration_secs": elapsed(alarm.started_at, ack.acknowledged_at).as_secs_f64(),
        });
        self.announce(AlarmEvent::Acknowledged, &alarm, data).await;
        Ok(ack)
    }

    pub async fn get(&self, alarm_id: &str) -> Option<ActiveAlarm> {
        self.state.lock().await.active.get(alarm_id).cloned()
    }

    /// Active alarms of a tenant, oldest first.
    pub async fn active(&self, tenant_id: &str) -> Vec<ActiveAlarm> {
        let mut alarms: Vec<ActiveAlarm> = self
            .state
            .lock()
            .await
            .active
            .values()
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
            .collect();
        alarms.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        alarms
    }

    pub async fn stats(&self, tenant_id: &str, now: DateTime<Utc>) -> AlarmStats {
        let alarms = self.active(tenant_id).await;
        let mut stats = AlarmStats {
            total_active: alarms.len(),
            ..AlarmStats::default()
        };
        let mut total_age = 0.0;
        for alarm in &alarms {
            *stats.by_level.entry(alarm.current_level.to_string()).or_default() += 1;
            *stats.by_priority.entry(alarm.priority.to_string()).or_default() += 1;
            *stats
                .escalation_counts
                .entry(format!("{}_escalations", alarm.escalation_count))
                .or_default() += 1;
            total_age += elapsed(alarm.started_at, now).as_secs_f64();
        }
        if !alarms.is_empty() {
            stats.average_age_secs = total_age / alarms.len() as f64;
        }
        stats
    }

    /// Runs [`tick`](Self::tick) every `interval` until `cancel` fires.
    pub async fn run_ticker(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        info!(interval_secs = interval.as_secs(), "alarm ticker started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Utc::now()).await;
                }
                _ = cancel.cancelled() => {
                    info!("alarm ticker shutting down");
                    break;
                }
            }
        }
    }

    async fn announce(&self, event: AlarmEvent, alarm: &ActiveAlarm, data: Value) {
        self.sink
            .alarm(
                event,
                &alarm.tenant_id,
                &alarm.project_id,
                &alarm.session_id,
                data,
            )
            .await;
    }
}

fn elapsed(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    (to - from).to_std().unwrap_or(Duration::ZERO)
}
