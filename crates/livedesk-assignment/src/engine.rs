// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Offers, acceptance, decline and timeout of handoff assignments.
//!
//! Every assignment reaches exactly one terminal status. Transitions are
//! decided under the map lock; presence updates and notifications happen
//! after it is released. A declined or expired offer is succeeded by a new
//! assignment for the next candidate, which inherits the alarm and the
//! list of agents already tried.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use livedesk_alarm::{AlarmEngine, AlarmTrigger};
use livedesk_config::model::AssignmentConfig;
use livedesk_core::{LivedeskError, PresenceStore, Priority, RequestType, Urgency};
use livedesk_notify::{NotificationSink, SessionScope};
use serde::Serialize;
use serde_json::json;
use strum::Display;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::selection::{Criteria, rank, required_skill};

pub const CONNECTING_MESSAGE: &str =
    "Connecting you with an agent. Someone will be with you shortly.";
pub const NO_AGENT_MESSAGE: &str =
    "No agent is currently available. We have notified the team and will get back to you as soon as possible.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Accepted,
    Declined,
    TimedOut,
    Canceled,
}

impl AssignmentStatus {
    pub fn is_terminal(self) -> bool {
        self != AssignmentStatus::Pending
    }
}

/// A request for a human on one session.
#[derive(Debug, Clone)]
pub struct AssignmentRequest {
    pub tenant_id: String,
    pub project_id: String,
    pub session_id: String,
    pub customer_id: String,
    pub request_type: RequestType,
    pub urgency: Urgency,
    pub preferred_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub id: String,
    pub tenant_id: String,
    pub project_id: String,
    pub session_id: String,
    pub customer_id: String,
    pub agent_id: String,
    pub request_type: RequestType,
    pub urgency: Urgency,
    pub priority: Priority,
    pub status: AssignmentStatus,
    pub score: f64,
    pub assigned_at: DateTime<Utc>,
    pub timeout_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declined_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decline_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm_id: Option<String>,
    /// Agents that declined or let an earlier offer for this session expire.
    pub excluded: Vec<String>,
    /// Set when the accepting agent left the conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Assignment {
    fn scope(&self) -> SessionScope {
        SessionScope::new(&self.tenant_id, &self.project_id, &self.session_id)
    }

    fn request(&self) -> AssignmentRequest {
        AssignmentRequest {
            tenant_id: self.tenant_id.clone(),
            project_id: self.project_id.clone(),
            session_id: self.session_id.clone(),
            customer_id: self.customer_id.clone(),
            request_type: self.request_type,
            urgency: self.urgency,
            preferred_agent: self.fallback_agent_id.clone(),
        }
    }
}

/// Result of asking for an agent.
#[derive(Debug, Clone)]
pub enum Offer {
    Offered(Assignment),
    /// Nobody eligible; the team was notified and the alarm, if any, stays.
    Unavailable { alarm_id: Option<String> },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssignmentStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_request_type: BTreeMap<String, usize>,
    pub by_urgency: BTreeMap<String, usize>,
    pub average_acceptance_secs: f64,
}

/// Alarm carried by a new offer.
enum OfferAlarm {
    /// First offer for the request; raise a fresh alarm.
    Raise,
    /// Successor offer; keep the predecessor's alarm, if any.
    Inherit(Option<String>),
}

pub struct AssignmentEngine {
    presence: Arc<dyn PresenceStore>,
    sink: NotificationSink,
    alarms: Arc<AlarmEngine>,
    config: AssignmentConfig,
    alerts: bool,
    assignments: Mutex<HashMap<String, Assignment>>,
}

impl AssignmentEngine {
    /// `alerts` controls whether offers raise alarms.
    pub fn new(
        presence: Arc<dyn PresenceStore>,
        sink: NotificationSink,
        alarms: Arc<AlarmEngine>,
        config: AssignmentConfig,
        alerts: bool,
    ) -> Self {
        Self {
            presence,
            sink,
            alarms,
            config,
            alerts,
            assignments: Mutex::new(HashMap::new()),
        }
    }

    pub fn timeout_for(&self, urgency: Urgency) -> Duration {
        let secs = match urgency {
            Urgency::Critical => self.config.critical_timeout_secs,
            Urgency::High => self.config.high_timeout_secs,
            Urgency::Normal => self.config.normal_timeout_secs,
            Urgency::Low => self.config.low_timeout_secs,
        };
        Duration::from_secs(secs)
    }

    /// Selects an agent, raises the alarm and offers the session.
    pub async fn request(&self, request: AssignmentRequest) -> Result<Offer, LivedeskError> {
        let scope = SessionScope::new(&request.tenant_id, &request.project_id, &request.session_id);
        match self.offer(&request, Vec::new(), OfferAlarm::Raise).await? {
            Some(assignment) => {
                self.sink.system_message(&scope, CONNECTING_MESSAGE).await;
                Ok(Offer::Offered(assignment))
            }
            None => {
                let alarm_id = self.raise_unassigned_alarm(&request).await;
                self.unavailable(&scope, &request, alarm_id.as_deref()).await;
                Ok(Offer::Unavailable { alarm_id })
            }
        }
    }

    /// The offered agent takes the session. Accepting twice is a no-op.
    pub async fn accept(
        &self,
        assignment_id: &str,
        agent_id: &str,
    ) -> Result<Assignment, LivedeskError> {
        let now = Utc::now();
        let accepted = {
            let mut map = self.assignments.lock().await;
            let assignment = map.get_mut(assignment_id).ok_or_else(|| not_found(assignment_id))?;
            if assignment.agent_id != agent_id {
                return Err(LivedeskError::Conflict(format!(
                    "assignment {assignment_id} was offered to another agent"
                )));
            }
            match assignment.status {
                AssignmentStatus::Accepted => return Ok(assignment.clone()),
                AssignmentStatus::Pending => {}
                other => {
                    return Err(LivedeskError::Conflict(format!(
                        "assignment {assignment_id} is {other}"
                    )));
                }
            }
            assignment.status = AssignmentStatus::Accepted;
            assignment.accepted_at = Some(now);
            assignment.clone()
        };

        info!(
            assignment_id,
            agent_id,
            session_id = %accepted.session_id,
            "assignment accepted"
        );
        livedesk_prometheus::record_assignment("accepted");

        if let Some(alarm_id) = &accepted.alarm_id {
            if let Err(e) = self.alarms.acknowledge(alarm_id, agent_id, "accepted").await {
                debug!(alarm_id = %alarm_id, error = %e, "alarm already gone on accept");
            }
        }
        let agent_name = match self.presence.get(agent_id).await {
            Ok(Some(p)) => p.name,
            _ => String::new(),
        };
        self.sink
            .assignment_accepted(
                &accepted.scope(),
                agent_id,
                json!({
                    "assignment_id": accepted.id,
                    "agent_id": agent_id,
                    "agent_name": agent_name,
                    "status": AssignmentStatus::Accepted,
                }),
            )
            .await;
        Ok(accepted)
    }

    /// The offered agent passes. Declining a finished assignment returns it
    /// unchanged.
    pub async fn decline(
        &self,
        assignment_id: &str,
        agent_id: &str,
        reason: &str,
    ) -> Result<Assignment, LivedeskError> {
        let declined = {
            let mut map = self.assignments.lock().await;
            let assignment = map.get_mut(assignment_id).ok_or_else(|| not_found(assignment_id))?;
            if assignment.status.is_terminal() {
                return Ok(assignment.clone());
            }
            if assignment.agent_id != agent_id {
                return Err(LivedeskError::Conflict(format!(
                    "assignment {assignment_id} was offered to another agent"
                )));
            }
            assignment.status = AssignmentStatus::Declined;
            assignment.declined_at = Some(Utc::now());
            assignment.decline_reason = Some(reason.to_string());
            assignment.clone()
        };

        info!(assignment_id, agent_id, reason, "assignment declined");
        livedesk_prometheus::record_assignment("declined");
        self.release(&declined.agent_id).await;
        self.reassign(&declined).await?;
        Ok(declined)
    }

    /// Expires pending offers whose deadline passed and re-offers their
    /// sessions. Returns the number expired.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<Assignment> = {
            let mut map = self.assignments.lock().await;
            map.values_mut()
                .filter(|a| a.status == AssignmentStatus::Pending && a.timeout_at <= now)
                .map(|a| {
                    a.status = AssignmentStatus::TimedOut;
                    a.clone()
                })
                .collect()
        };

        for assignment in &expired {
            info!(
                assignment_id = %assignment.id,
                agent_id = %assignment.agent_id,
                "assignment timed out"
            );
            livedesk_prometheus::record_assignment("timed_out");
            self.release(&assignment.agent_id).await;
            if let Err(e) = self.reassign(assignment).await {
                warn!(assignment_id = %assignment.id, error = %e, "reassignment failed");
            }
        }
        expired.len()
    }

    /// Cancels pending offers of a session whose visitor went away.
    pub async fn cancel_session(&self, session_id: &str) -> usize {
        let canceled: Vec<Assignment> = {
            let mut map = self.assignments.lock().await;
            map.values_mut()
                .filter(|a| a.session_id == session_id && a.status == AssignmentStatus::Pending)
                .map(|a| {
                    a.status = AssignmentStatus::Canceled;
                    a.clone()
                })
                .collect()
        };
        for assignment in &canceled {
            info!(assignment_id = %assignment.id, session_id, "assignment canceled");
            livedesk_prometheus::record_assignment("canceled");
            self.release(&assignment.agent_id).await;
            if let Some(alarm_id) = &assignment.alarm_id {
                if let Err(e) = self.alarms.acknowledge(alarm_id, "system", "visitor left").await {
                    debug!(alarm_id = %alarm_id, error = %e, "alarm already gone on cancel");
                }
            }
        }
        canceled.len()
    }

    /// The accepting agent left the conversation; frees their capacity.
    pub async fn finish(&self, session_id: &str, agent_id: &str) -> bool {
        let finished = {
            let mut map = self.assignments.lock().await;
            match map.values_mut().find(|a| {
                a.session_id == session_id
                    && a.agent_id == agent_id
                    && a.status == AssignmentStatus::Accepted
                    && a.finished_at.is_none()
            }) {
                Some(a) => {
                    a.finished_at = Some(Utc::now());
                    true
                }
                None => false,
            }
        };
        if finished {
            self.release(agent_id).await;
        }
        finished
    }

    /// Agent that accepted the session and is still in it.
    pub async fn active_agent_for_session(&self, session_id: &str) -> Option<String> {
        self.assignments
            .lock()
            .await
            .values()
            .filter(|a| {
                a.session_id == session_id
                    && a.status == AssignmentStatus::Accepted
                    && a.finished_at.is_none()
            })
            .max_by_key(|a| a.accepted_at)
            .map(|a| a.agent_id.clone())
    }

    pub async fn get(&self, assignment_id: &str) -> Option<Assignment> {
        self.assignments.lock().await.get(assignment_id).cloned()
    }

    /// Pending offers of a tenant, oldest first.
    pub async fn pending(&self, tenant_id: &str) -> Vec<Assignment> {
        self.collect(|a| a.tenant_id == tenant_id && a.status == AssignmentStatus::Pending)
            .await
    }

    pub async fn for_agent(&self, agent_id: &str) -> Vec<Assignment> {
        self.collect(|a| a.agent_id == agent_id).await
    }

    pub async fn stats(&self, tenant_id: &str) -> AssignmentStats {
        let all = self.collect(|a| a.tenant_id == tenant_id).await;
        let mut stats = AssignmentStats {
            total: all.len(),
            ..AssignmentStats::default()
        };
        let mut accept_secs = Vec::new();
        for a in &all {
            *stats.by_status.entry(a.status.to_string()).or_default() += 1;
            *stats.by_request_type.entry(a.request_type.to_string()).or_default() += 1;
            *stats.by_urgency.entry(a.urgency.to_string()).or_default() += 1;
            if let Some(at) = a.accepted_at {
                accept_secs.push((at - a.assigned_at).num_milliseconds() as f64 / 1000.0);
            }
        }
        if !accept_secs.is_empty() {
            stats.average_acceptance_secs =
                accept_secs.iter().sum::<f64>() / accept_secs.len() as f64;
        }
        stats
    }

    /// Runs [`sweep`](Self::sweep) every `sweep_interval_ms` until cancelled.
    pub async fn run_sweeper(self: Arc<Self>, cancel: CancellationToken) {
        let period = Duration::from_millis(self.config.sweep_interval_ms.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_ms = period.as_millis() as u64, "assignment sweeper started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep(Utc::now()).await;
                }
                _ = cancel.cancelled() => {
                    info!("assignment sweeper shutting down");
                    break;
                }
            }
        }
    }

    /// Ranks candidates and records a pending offer to the best one. The
    /// offer is stored and announced only once its alarm points at it.
    async fn offer(
        &self,
        request: &AssignmentRequest,
        excluded: Vec<String>,
        alarm: OfferAlarm,
    ) -> Result<Option<Assignment>, LivedeskError> {
        let now = Utc::now();
        let agents = self.presence.list(&request.tenant_id).await?;
        let criteria = Criteria {
            project: &request.project_id,
            skill: required_skill(request.request_type),
            exclude: &excluded,
            preferred: request.preferred_agent.as_deref(),
        };
        let ranked = rank(&agents, &criteria, now);
        let Some(primary) = ranked.first() else {
            debug!(session_id = %request.session_id, "no eligible agent");
            return Ok(None);
        };

        let timeout = chrono::Duration::from_std(self.timeout_for(request.urgency))
            .map_err(|e| LivedeskError::Internal(format!("assignment timeout out of range: {e}")))?;
        let mut assignment = Assignment {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: request.tenant_id.clone(),
            project_id: request.project_id.clone(),
            session_id: request.session_id.clone(),
            customer_id: request.customer_id.clone(),
            agent_id: primary.agent_id.clone(),
            request_type: request.request_type,
            urgency: request.urgency,
            priority: Priority::from(request.urgency),
            status: AssignmentStatus::Pending,
            score: primary.score,
            assigned_at: now,
            timeout_at: now + timeout,
            accepted_at: None,
            declined_at: None,
            decline_reason: None,
            fallback_agent_id: ranked.get(1).map(|c| c.agent_id.clone()),
            alarm_id: None,
            excluded,
            finished_at: None,
        };
        assignment.alarm_id = match alarm {
            OfferAlarm::Raise => self.raise_alarm(&assignment).await,
            OfferAlarm::Inherit(Some(alarm_id)) => {
                self.alarms
                    .rebind(&alarm_id, &assignment.id, Some(&assignment.agent_id))
                    .await;
                Some(alarm_id)
            }
            OfferAlarm::Inherit(None) => None,
        };

        self.assignments
            .lock()
            .await
            .insert(assignment.id.clone(), assignment.clone());

        self.reserve(&assignment.agent_id, now).await;
        info!(
            assignment_id = %assignment.id,
            agent_id = %assignment.agent_id,
            session_id = %assignment.session_id,
            score = assignment.score,
            "assignment offered"
        );
        livedesk_prometheus::record_assignment("pending");
        self.sink
            .agent_assigned(
                &assignment.scope(),
                &assignment.agent_id,
                json!({ "assignment": assignment }),
            )
            .await;
        Ok(Some(assignment))
    }

    /// Offers the session of a failed assignment to the next candidate.
    async fn reassign(&self, previous: &Assignment) -> Result<(), LivedeskError> {
        let mut excluded = previous.excluded.clone();
        excluded.push(previous.agent_id.clone());

        let request = previous.request();
        let alarm = OfferAlarm::Inherit(previous.alarm_id.clone());
        match self.offer(&request, excluded, alarm).await? {
            Some(_) => Ok(()),
            None => {
                self.unavailable(&previous.scope(), &request, previous.alarm_id.as_deref())
                    .await;
                Ok(())
            }
        }
    }

    async fn unavailable(
        &self,
        scope: &SessionScope,
        request: &AssignmentRequest,
        alarm_id: Option<&str>,
    ) {
        info!(session_id = %scope.session_id, "no agent currently available");
        livedesk_prometheus::record_assignment("unavailable");
        self.sink.system_message(scope, NO_AGENT_MESSAGE).await;
        self.sink
            .handoff_request(
                scope,
                json!({
                    "customer_id": request.customer_id,
                    "request_type": request.request_type,
                    "urgency": request.urgency,
                    "alarm_id": alarm_id,
                }),
            )
            .await;
    }

    async fn raise_alarm(&self, assignment: &Assignment) -> Option<String> {
        if !self.alerts {
            return None;
        }
        self.alarms
            .trigger(AlarmTrigger {
                tenant_id: assignment.tenant_id.clone(),
                project_id: assignment.project_id.clone(),
                session_id: assignment.session_id.clone(),
                assignment_id: Some(assignment.id.clone()),
                agent_id: Some(assignment.agent_id.clone()),
                title: format!("{} request waiting", assignment.request_type),
                message: format!("Customer {} asked for an agent", assignment.customer_id),
                priority: assignment.priority,
                urgency: assignment.urgency,
            })
            .await
            .map(|alarm| alarm.id)
    }

    async fn raise_unassigned_alarm(&self, request: &AssignmentRequest) -> Option<String> {
        if !self.alerts {
            return None;
        }
        self.alarms
            .trigger(AlarmTrigger {
                tenant_id: request.tenant_id.clone(),
                project_id: request.project_id.clone(),
                session_id: request.session_id.clone(),
                assignment_id: None,
                agent_id: None,
                title: format!("{} request unassigned", request.request_type),
                message: format!(
                    "Customer {} is waiting and no agent is available",
                    request.customer_id
                ),
                priority: Priority::from(request.urgency),
                urgency: request.urgency,
            })
            .await
            .map(|alarm| alarm.id)
    }

    async fn reserve(&self, agent_id: &str, now: DateTime<Utc>) {
        match self.presence.get(agent_id).await {
            Ok(Some(p)) => {
                let result = async {
                    self.presence.update_workload(agent_id, p.active_chats + 1).await?;
                    self.presence.record_assignment(agent_id, now).await
                }
                .await;
                if let Err(e) = result {
                    warn!(agent_id, error = %e, "failed to reserve agent capacity");
                }
            }
            Ok(None) => debug!(agent_id, "agent vanished before reservation"),
            Err(e) => warn!(agent_id, error = %e, "presence lookup failed"),
        }
    }

    async fn release(&self, agent_id: &str) {
        if let Ok(Some(p)) = self.presence.get(agent_id).await {
            if let Err(e) = self
                .presence
                .update_workload(agent_id, p.active_chats.saturating_sub(1))
                .await
            {
                warn!(agent_id, error = %e, "failed to release agent capacity");
            }
        }
    }

    async fn collect(&self, keep: impl Fn(&Assignment) -> bool) -> Vec<Assignment> {
        let mut out: Vec<Assignment> = self
            .assignments
            .lock()
            .await
            .values()
            .filter(|a| keep(a))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.assigned_at.cmp(&b.assigned_at).then_with(|| a.id.cmp(&b.id)));
        out
    }
}

fn not_found(id: &str) -> LivedeskError {
    LivedeskError::NotFound {
        kind: "assignment",
        id: id.to_string(),
    }
}
