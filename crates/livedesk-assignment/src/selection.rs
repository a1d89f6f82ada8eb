// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Candidate filtering and scoring.
//!
//! `score = 0.2 * skill + 0.3 * (1 - workload) + 0.2 * response + 0.2 * recency`
//!
//! - skill: 1.0 when the agent has the required skill, 0.8 when it only
//!   has `general`
//! - response: `1 / (1 + avg_response_secs / 60)`
//! - recency: minutes since the last offer over 200, capped at 1; agents
//!   never offered a chat score 1
//!
//! Ties go to the agent offered a chat longest ago, then to the lowest id.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use livedesk_core::{AgentPresence, AgentSkill, AgentStatus, RequestType};

const W_SKILL: f64 = 0.2;
const W_LOAD: f64 = 0.3;
const W_RESPONSE: f64 = 0.2;
const W_RECENT: f64 = 0.2;

const GENERALIST_MATCH: f64 = 0.8;
const RECENCY_FULL_MINUTES: f64 = 200.0;

/// Skill an agent needs to take a request of this type.
pub fn required_skill(request_type: RequestType) -> AgentSkill {
    match request_type {
        RequestType::Technical => AgentSkill::Technical,
        RequestType::Billing => AgentSkill::Billing,
        RequestType::Complaint => AgentSkill::Complaint,
        RequestType::Support => AgentSkill::Support,
        RequestType::General | RequestType::Urgent => AgentSkill::General,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Criteria<'a> {
    /// Only agents serving this project are eligible.
    pub project: &'a str,
    pub skill: AgentSkill,
    pub exclude: &'a [String],
    pub preferred: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub agent_id: String,
    pub score: f64,
    pub last_assignment: Option<DateTime<Utc>>,
    pub preferred: bool,
}

/// Eligible agents, best first.
pub fn rank(agents: &[AgentPresence], criteria: &Criteria<'_>, now: DateTime<Utc>) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = agents
        .iter()
        .filter(|a| a.status == AgentStatus::Online && a.workload() < 1.0)
        .filter(|a| a.serves(criteria.project))
        .filter(|a| !criteria.exclude.iter().any(|id| *id == a.agent_id))
        .filter_map(|a| {
            let skill = skill_match(a, criteria.skill)?;
            Some(Candidate {
                agent_id: a.agent_id.clone(),
                score: score(a, skill, now),
                last_assignment: a.last_assignment,
                preferred: criteria.preferred == Some(a.agent_id.as_str()),
            })
        })
        .collect();
    candidates.sort_by(compare);
    candidates
}

fn skill_match(agent: &AgentPresence, skill: AgentSkill) -> Option<f64> {
    if agent.has_skill(skill) {
        Some(1.0)
    } else if agent.has_skill(AgentSkill::General) {
        Some(GENERALIST_MATCH)
    } else {
        None
    }
}

fn score(agent: &AgentPresence, skill: f64, now: DateTime<Utc>) -> f64 {
    let response = 1.0 / (1.0 + agent.avg_response_secs.max(0.0) / 60.0);
    let recency = agent.last_assignment.map_or(1.0, |at| {
        let minutes = (now - at).num_seconds().max(0) as f64 / 60.0;
        (minutes / RECENCY_FULL_MINUTES).min(1.0)
    });
    W_SKILL * skill + W_LOAD * (1.0 - agent.workload()) + W_RESPONSE * response + W_RECENT * recency
}

fn compare(a: &Candidate, b: &Candidate) -> Ordering {
    b.preferred
        .cmp(&a.preferred)
        .then_with(|| b.score.total_cmp(&a.score))
        .then_with(|| a.last_assignment.cmp(&b.last_assignment))
        .then_with(|| a.agent_id.cmp(&b.agent_id))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use proptest::prelude::*;

    use super::*;

    fn now() -> DateTime<Utc> {
        "2026-03-01T12:00:00Z".parse().unwrap()
    }

    fn agent(id: &str, active: u32) -> AgentPresence {
        let mut a = AgentPresence::online(id, "t1", 5, now()).with_projects(["p1"]);
        a.active_chats = active;
        a
    }

    fn general() -> Criteria<'static> {
        Criteria {
            project: "p1",
            skill: AgentSkill::General,
            exclude: &[],
            preferred: None,
        }
    }

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.agent_id.as_str()).collect()
    }

    #[test]
    fn lighter_load_wins() {
        let ranked = rank(&[agent("busy", 4), agent("idle", 1)], &general(), now());
        assert_eq!(ids(&ranked), vec!["idle", "busy"]);
        // 0.2 + 0.3 * 0.8 + 0.2 + 0.2
        assert!((ranked[0].score - 0.84).abs() < 1e-9);
    }

    #[test]
    fn offline_full_and_excluded_agents_are_skipped() {
        let mut away = agent("away", 0);
        away.status = AgentStatus::Away;
        let full = agent("full", 5);
        let excluded = vec!["gone".to_string()];
        let criteria = Criteria {
            exclude: &excluded,
            ..general()
        };
        let ranked = rank(&[away, full, agent("gone", 0), agent("ok", 0)], &criteria, now());
        assert_eq!(ids(&ranked), vec!["ok"]);
    }

    #[test]
    fn agents_outside_the_project_are_skipped() {
        let elsewhere = agent("elsewhere", 0).with_projects(["p2"]);
        let unscoped = agent("unscoped", 0).with_projects(Vec::<String>::new());
        let both = agent("both", 3).with_projects(["p2", "p1"]);
        let ranked = rank(&[elsewhere, unscoped, both, agent("local", 4)], &general(), now());
        assert_eq!(ids(&ranked), vec!["both", "local"]);
    }

    #[test]
    fn specialists_beat_generalists_and_others_are_filtered() {
        let mut billing = agent("billing", 0);
        billing.skills = vec![AgentSkill::Billing];
        let mut sales = agent("sales", 0);
        sales.skills = vec![AgentSkill::Sales];
        let criteria = Criteria {
            skill: required_skill(RequestType::Billing),
            ..general()
        };
        let ranked = rank(&[agent("generalist", 0), sales, billing], &criteria, now());
        assert_eq!(ids(&ranked), vec!["billing", "generalist"]);
    }

    #[test]
    fn recent_offer_lowers_score_and_breaks_ties() {
        let mut recent = agent("a", 0);
        recent.last_assignment = Some(now() - Duration::minutes(20));
        let mut older = agent("b", 0);
        older.last_assignment = Some(now() - Duration::minutes(300));
        let ranked = rank(&[recent, older], &general(), now());
        assert_eq!(ids(&ranked), vec!["b", "a"]);

        let mut x = agent("x", 0);
        x.last_assignment = Some(now() - Duration::minutes(500));
        let mut y = agent("y", 0);
        y.last_assignment = Some(now() - Duration::minutes(400));
        let ranked = rank(&[y, x], &general(), now());
        assert_eq!(ranked[0].score, ranked[1].score);
        assert_eq!(ids(&ranked), vec!["x", "y"]);
    }

    #[test]
    fn equal_agents_fall_back_to_id() {
        let ranked = rank(&[agent("b", 0), agent("a", 0)], &general(), now());
        assert_eq!(ids(&ranked), vec!["a", "b"]);
    }

    #[test]
    fn preferred_agent_goes_first() {
        let criteria = Criteria {
            preferred: Some("busy"),
            ..general()
        };
        let ranked = rank(&[agent("idle", 0), agent("busy", 4)], &criteria, now());
        assert_eq!(ids(&ranked), vec!["busy", "idle"]);
    }

    #[test]
    fn slow_responders_rank_lower() {
        let mut slow = agent("a", 0);
        slow.avg_response_secs = 120.0;
        let ranked = rank(&[slow, agent("b", 0)], &general(), now());
        assert_eq!(ids(&ranked), vec!["b", "a"]);
    }

    proptest! {
        #[test]
        fn scores_are_bounded(active in 0u32..5, avg in 0.0f64..3600.0, minutes in 0i64..10_000) {
            let mut a = agent("a", active);
            a.avg_response_secs = avg;
            a.last_assignment = Some(now() - Duration::minutes(minutes));
            let ranked = rank(&[a], &general(), now());
            prop_assert_eq!(ranked.len(), 1);
            prop_assert!(ranked[0].score > 0.0 && ranked[0].score <= 0.9 + 1e-9);
        }
    }
}
