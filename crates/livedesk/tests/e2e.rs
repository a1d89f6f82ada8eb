// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end integration tests for the Livedesk chat broker.
//!
//! Every test runs complete nodes on an in-memory bus: sockets are mock
//! writers, the knowledge base is a fixed corpus, and several nodes share
//! one bus the way a cluster shares one Redis.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use chrono::Utc;
use http::{Request, StatusCode};
use tower::ServiceExt;

use livedesk_assignment::AssignmentStatus;
use livedesk_assignment::engine::{CONNECTING_MESSAGE, NO_AGENT_MESSAGE};
use livedesk_bus::MemoryBus;
use livedesk_config::model::BrandConfig;
use livedesk_core::{
    AgentSkill, Bus, ConnectionKind, Envelope, EnvelopeType, PresenceStore, session_key,
};
use livedesk_gateway::{AgentClaims, GatewayState, HealthState, TokenVerifier, router};
use livedesk_test_utils::{PROJECT, StaticKnowledge, TENANT, TestNode};

const WAIT: Duration = Duration::from_secs(5);

fn ai_replies(envs: &[Envelope]) -> Vec<&Envelope> {
    envs.iter()
        .filter(|e| e.kind == EnvelopeType::Chat && e.origin == Some(ConnectionKind::AiAgent))
        .collect()
}

fn globex() -> BrandConfig {
    BrandConfig {
        company_name: Some("Globex".into()),
        ..BrandConfig::default()
    }
}

fn business_hours() -> Vec<livedesk_core::KnowledgeChunk> {
    vec![StaticKnowledge::chunk(
        "Our business hours are 9am to 5pm, Monday to Friday.",
        0.82,
        "FAQ",
    )]
}

// ---- Test 1: greeting gets a branded reply ----

#[tokio::test]
async fn e2e_greeting_gets_branded_reply() {
    let node = TestNode::builder("node-1")
        .with_brand(PROJECT, globex())
        .build(Arc::new(MemoryBus::new()))
        .await
        .unwrap();
    let (visitor, inbox) = node.visitor("s1").await;

    let started = Instant::now();
    node.say(&visitor, "s1", "hello there!").await;

    assert!(
        inbox
            .wait_for(WAIT, |envs| !ai_replies(envs).is_empty())
            .await,
        "no automatic reply"
    );
    assert!(started.elapsed() < WAIT);

    let envs = inbox.envelopes();
    let reply = ai_replies(&envs)[0];
    assert_eq!(reply.session_id, "s1");
    let content = reply.data["content"].as_str().unwrap();
    assert!(content.contains("Globex"), "unexpected greeting: {content}");
    assert_eq!(reply.data["message_type"], "greeting");

    // The visitor's own message is echoed exactly once.
    let echoes = envs
        .iter()
        .filter(|e| e.kind == EnvelopeType::Chat && e.origin == Some(ConnectionKind::Visitor))
        .count();
    assert_eq!(echoes, 1);
    assert!(node.assignments.pending(TENANT).await.is_empty());
}

// ---- Test 2: question answered from the knowledge base ----

#[tokio::test]
async fn e2e_question_gets_knowledge_answer() {
    let node = TestNode::builder("node-1")
        .with_knowledge(business_hours())
        .build(Arc::new(MemoryBus::new()))
        .await
        .unwrap();
    let (visitor, inbox) = node.visitor("s1").await;

    node.say(&visitor, "s1", "what are your business hours?").await;

    assert!(inbox.wait_for(WAIT, |envs| !ai_replies(envs).is_empty()).await);
    let envs = inbox.envelopes();
    let reply = ai_replies(&envs)[0];
    assert!(reply.data["content"].as_str().unwrap().contains("9am to 5pm"));
    assert_eq!(reply.data["citations"][0], "Document: FAQ");

    assert_eq!(node.knowledge.queries().len(), 1);
    assert_eq!(node.assignments.stats(TENANT).await.total, 0);
}

// ---- Test 3: explicit request is handed off to a human ----

#[tokio::test]
async fn e2e_handoff_offers_session_and_raises_alarm() {
    let node = TestNode::standalone().await.unwrap();
    let (_agent, agent_inbox) = node.agent("agent-a", &[AgentSkill::General], 1).await;
    let (visitor, inbox) = node.visitor("s1").await;

    node.say(&visitor, "s1", "I need to speak to a human agent, this is urgent!")
        .await;

    let assigned = agent_inbox
        .expect(EnvelopeType::AgentAssigned, WAIT)
        .await
        .expect("agent should be offered the session");
    assert_eq!(assigned.agent_id.as_deref(), Some("agent-a"));
    assert_eq!(assigned.session_id, "s1");

    let alarm = agent_inbox
        .expect(EnvelopeType::AlarmTriggered, WAIT)
        .await
        .expect("project agents should be alerted");
    assert_eq!(alarm.data["priority"], "high");
    assert_eq!(alarm.project_id.as_deref(), Some(PROJECT));

    assert!(
        inbox
            .wait_for(WAIT, |envs| ai_replies(envs)
                .iter()
                .any(|e| e.data["content"] == CONNECTING_MESSAGE))
            .await
    );

    let pending = node.assignments.pending(TENANT).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].agent_id, "agent-a");
    assert_eq!(node.alarms.active(TENANT).await.len(), 1);

    // The visitor never sees the offer or the alarm.
    assert!(inbox.of_kind(EnvelopeType::AlarmTriggered).is_empty());
}

// ---- Test 4: decline moves the offer to the fallback agent ----

#[tokio::test]
async fn e2e_decline_moves_offer_to_fallback() {
    let node = TestNode::standalone().await.unwrap();
    let (_a, inbox_a) = node.agent("agent-a", &[AgentSkill::General], 0).await;
    let (_b, inbox_b) = node.agent("agent-b", &[AgentSkill::General], 2).await;
    let (visitor, _inbox) = node.visitor("s1").await;

    node.say(&visitor, "s1", "I need to speak to a human agent, this is urgent!")
        .await;
    let offer = inbox_a
        .expect(EnvelopeType::AgentAssigned, WAIT)
        .await
        .expect("agent-a should be offered first");
    let first_id = offer.data["assignment"]["id"].as_str().unwrap().to_string();
    let alarm_id = node.assignments.get(&first_id).await.unwrap().alarm_id;
    assert!(alarm_id.is_some());

    let declined = node
        .assignments
        .decline(&first_id, "agent-a", "on a call")
        .await
        .unwrap();
    assert_eq!(declined.status, AssignmentStatus::Declined);

    assert!(
        inbox_b
            .wait_for(WAIT, |envs| envs.iter().any(|e| {
                e.kind == EnvelopeType::AgentAssigned && e.agent_id.as_deref() == Some("agent-b")
            }))
            .await,
        "fallback agent should be offered the session"
    );

    let pending = node.assignments.pending(TENANT).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].agent_id, "agent-b");
    assert!(pending[0].excluded.contains(&"agent-a".to_string()));
    assert_eq!(pending[0].alarm_id, alarm_id);

    // The alarm stays active until someone accepts.
    let alarm_id = alarm_id.unwrap();
    assert!(node.alarms.get(&alarm_id).await.is_some());

    // Declining again is a no-op returning the terminal state.
    let again = node
        .assignments
        .decline(&first_id, "agent-a", "still busy")
        .await
        .unwrap();
    assert_eq!(again.status, AssignmentStatus::Declined);
    assert_eq!(node.assignments.pending(TENANT).await.len(), 1);
}

// ---- Test 5: unanswered offer times out with nobody left ----

#[tokio::test]
async fn e2e_timeout_sweep_with_no_successor() {
    let node = TestNode::standalone().await.unwrap();
    let (_a, inbox_a) = node.agent("agent-a", &[AgentSkill::General], 0).await;
    let (visitor, inbox) = node.visitor("s1").await;

    node.say(&visitor, "s1", "I need to speak to a human agent, this is urgent!")
        .await;
    inbox_a
        .expect(EnvelopeType::AgentAssigned, WAIT)
        .await
        .expect("agent-a should be offered the session");
    let offered = node.assignments.pending(TENANT).await.remove(0);
    assert_eq!(
        (offered.timeout_at - offered.assigned_at).num_seconds(),
        60,
        "high urgency waits 60 seconds"
    );

    // Nothing expires early.
    assert_eq!(node.assignments.sweep(Utc::now()).await, 0);

    let expired = node
        .assignments
        .sweep(offered.timeout_at + chrono::Duration::seconds(1))
        .await;
    assert_eq!(expired, 1);
    assert_eq!(
        node.assignments.get(&offered.id).await.unwrap().status,
        AssignmentStatus::TimedOut
    );

    assert!(
        inbox
            .wait_for(WAIT, |envs| ai_replies(envs)
                .iter()
                .any(|e| e.data["content"] == NO_AGENT_MESSAGE))
            .await,
        "visitor should hear that nobody is available"
    );
    assert!(node.assignments.pending(TENANT).await.is_empty());
}

// ---- Test 6: two nodes, one bus ----

#[tokio::test]
async fn e2e_cross_node_delivery() {
    let bus = Arc::new(MemoryBus::new());
    let node1 = TestNode::builder("node-1").build(bus.clone()).await.unwrap();
    let node2 = TestNode::builder("node-2").build(bus.clone()).await.unwrap();

    let (visitor, visitor_inbox) = node1.visitor("s1").await;
    let (_agent, agent_inbox) = node2.agent("agent-a", &[AgentSkill::General], 0).await;

    node1.say(&visitor, "s1", "ok thanks, will check later").await;

    let seen = agent_inbox
        .expect(EnvelopeType::Chat, WAIT)
        .await
        .expect("agent on node-2 should receive the visitor message");
    assert_eq!(seen.session_id, "s1");
    assert_eq!(seen.origin, Some(ConnectionKind::Visitor));
    assert_eq!(seen.data["content"], "ok thanks, will check later");
    assert!(seen.timestamp.is_some());

    assert!(
        visitor_inbox
            .wait_for(WAIT, |envs| envs.iter().any(|e| e.kind == EnvelopeType::Chat))
            .await
    );

    // Let any duplicate arrive before counting.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(visitor_inbox.of_kind(EnvelopeType::Chat).len(), 1);
    assert_eq!(agent_inbox.of_kind(EnvelopeType::Chat).len(), 1);

    // Only the publishing node persists the message.
    assert_eq!(node1.chat_store.for_session("s1").len(), 1);
    assert!(node2.chat_store.messages().is_empty());
}

// ---- Test 6b: an agent on another node is offered the handoff ----

#[tokio::test]
async fn e2e_cross_node_handoff() {
    let bus = Arc::new(MemoryBus::new());
    let node1 = TestNode::builder("node-1").build(bus.clone()).await.unwrap();
    let node2 = TestNode::builder("node-2").build(bus.clone()).await.unwrap();

    let (_agent, agent_inbox) = node2.agent("agent-a", &[AgentSkill::General], 0).await;
    let (visitor, _inbox) = node1.visitor("s1").await;

    node1
        .say(&visitor, "s1", "I need to speak to a human agent, this is urgent!")
        .await;

    let assigned = agent_inbox
        .expect(EnvelopeType::AgentAssigned, WAIT)
        .await
        .expect("agent on node-2 should be offered the session");
    assert_eq!(assigned.agent_id.as_deref(), Some("agent-a"));

    let pending = node1.assignments.pending(TENANT).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].agent_id, "agent-a");

    // Both nodes see the reservation.
    let record = node2.presence.get("agent-a").await.unwrap().unwrap();
    assert_eq!(record.active_chats, 1);
}

// ---- Test 7: accepted sessions route straight to the agent ----

#[tokio::test]
async fn e2e_accepted_session_is_sticky() {
    let node = TestNode::standalone().await.unwrap();
    let (_a, inbox_a) = node.agent("agent-a", &[AgentSkill::General], 0).await;
    let (visitor, inbox) = node.visitor("s1").await;

    node.say(&visitor, "s1", "I need to speak to a human agent, this is urgent!")
        .await;
    inbox_a
        .expect(EnvelopeType::AgentAssigned, WAIT)
        .await
        .expect("offer");
    let offered = node.assignments.pending(TENANT).await.remove(0);
    node.assignments.accept(&offered.id, "agent-a").await.unwrap();

    // The visitor side hears about the accepting agent.
    assert!(
        inbox
            .wait_for(WAIT, |envs| envs.iter().any(|e| {
                e.kind == EnvelopeType::AgentAssigned && e.agent_id.as_deref() == Some("agent-a")
            }))
            .await
    );
    assert!(node.alarms.active(TENANT).await.is_empty());

    inbox_a.clear();
    node.say(&visitor, "s1", "hello again, I need to speak to a human agent")
        .await;

    assert!(
        inbox_a
            .wait_for(WAIT, |envs| envs.iter().any(|e| {
                e.kind == EnvelopeType::Chat && e.agent_id.as_deref() == Some("agent-a")
            }))
            .await
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(ai_replies(&inbox_a.envelopes()).is_empty());
    assert!(node.assignments.pending(TENANT).await.is_empty());
    assert_eq!(node.assignments.stats(TENANT).await.total, 1);
}

// ---- Test 8: visitor leaving cancels the pending offer ----

#[tokio::test]
async fn e2e_visitor_leaving_cancels_offer() {
    let node = TestNode::standalone().await.unwrap();
    let (_a, inbox_a) = node.agent("agent-a", &[AgentSkill::General], 0).await;
    let (visitor, _inbox) = node.visitor("s1").await;

    node.say(&visitor, "s1", "I need to speak to a human agent, this is urgent!")
        .await;
    inbox_a
        .expect(EnvelopeType::AgentAssigned, WAIT)
        .await
        .expect("offer");
    let offered = node.assignments.pending(TENANT).await.remove(0);

    node.disconnect(visitor).await;

    assert_eq!(
        node.assignments.get(&offered.id).await.unwrap().status,
        AssignmentStatus::Canceled
    );
    assert!(node.alarms.active(TENANT).await.is_empty());
}

// ---- Test 9: REST accept with an agent token ----

fn gateway_state(node: &TestNode, verifier: Arc<TokenVerifier>) -> GatewayState {
    GatewayState {
        gateway: node.gateway.clone(),
        verifier,
        assignments: node.assignments.clone(),
        alarms: node.alarms.clone(),
        health: HealthState {
            start_time: Instant::now(),
            node_id: node.node_id.clone(),
            prometheus_render: None,
        },
    }
}

#[tokio::test]
async fn e2e_rest_accept_and_alarm_listing() {
    let node = TestNode::standalone().await.unwrap();
    let (_a, inbox_a) = node.agent("agent-a", &[AgentSkill::General], 0).await;
    let (visitor, _inbox) = node.visitor("s1").await;
    node.say(&visitor, "s1", "I need to speak to a human agent, this is urgent!")
        .await;
    inbox_a
        .expect(EnvelopeType::AgentAssigned, WAIT)
        .await
        .expect("offer");
    let offered = node.assignments.pending(TENANT).await.remove(0);

    let verifier = Arc::new(TokenVerifier::new(
        Some("jwt-secret".into()),
        Some("widget-secret".into()),
    ));
    let now = Utc::now().timestamp();
    let token = verifier
        .sign_agent(&AgentClaims {
            sub: "user-a".into(),
            tenant_id: TENANT.into(),
            agent_id: "agent-a".into(),
            email: "agent-a@example.com".into(),
            role_bindings: BTreeMap::from([(PROJECT.to_string(), vec!["agent".to_string()])]),
            exp: now + 3600,
            iat: now,
        })
        .unwrap();
    let app = router(gateway_state(&node, verifier));

    let response = app
        .clone()
        .oneshot(
            Request::get("/v1/alarms")
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let listing: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(listing["alarms"].as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(
            Request::post(format!("/v1/assignments/{}/accept", offered.id))
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let accepted: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(accepted["status"], "accepted");

    let response = app
        .oneshot(
            Request::post(format!("/v1/assignments/{}/accept", offered.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---- Test 10: shutdown drains every socket ----

#[tokio::test]
async fn e2e_shutdown_drains_connections() {
    let bus = Arc::new(MemoryBus::new());
    let node = TestNode::builder("node-1").build(bus.clone()).await.unwrap();
    let (_visitor, _inbox) = node.visitor("s1").await;
    let (_agent, _agent_inbox) = node.agent("agent-a", &[AgentSkill::General], 0).await;
    assert_eq!(node.registry.len().await, 2);

    assert_eq!(node.shutdown().await, 2);
    assert!(node.registry.is_empty().await);

    assert!(
        bus.set_members(&session_key("s1"))
            .await
            .unwrap()
            .is_empty()
    );
}
