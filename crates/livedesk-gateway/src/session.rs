// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound side of a socket: registration, client frames, lifecycle.
//!
//! Everything a client sends is turned into an [`Envelope`] and published;
//! delivery back to sockets (including the sender's own echo) is left to
//! the fan-out router. Only `session_update` frames (welcome, pong, errors)
//! are written directly.
//!
//! Visitor chat messages are classified by the agentic pipeline before
//! they are published. The visitor's message goes out first, the
//! pipeline's reply or handoff follows.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use livedesk_agentic::{AgenticPipeline, Outcome, Utterance};
use livedesk_assignment::{AssignmentEngine, AssignmentRequest, Offer};
use livedesk_bus::Publisher;
use livedesk_core::{
    AgentPresence, AgentStatus, ChatStore, ConnectionKind, DeliveryMode, Envelope, EnvelopeType,
    LivedeskError, PresenceStore, agent_key, session_key,
};
use livedesk_fanout::{Connection, ConnectionInfo, ConnectionRegistry, FrameWriter, NewConnection};
use livedesk_notify::{NotificationSink, SessionScope};

use crate::auth::{AgentIdentity, VisitorClaims};

const DEFAULT_VISITOR_NAME: &str = "Visitor";

/// A frame sent by a client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Chat(FrameBody),
    Typing(FrameBody),
    Read(FrameBody),
    Join(FrameBody),
    Leave(FrameBody),
    Ping,
    AgentStatus { status: AgentStatus },
}

/// Addressing and payload of a conversational frame. Visitors may omit
/// the addressing; their session is fixed by their token.
#[derive(Debug, Default, Deserialize)]
pub struct FrameBody {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// A registered socket plus what the gateway needs to stamp its frames.
pub struct Peer {
    conn: Arc<Connection>,
    display_name: String,
}

impl Peer {
    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn id(&self) -> &str {
        self.conn.id()
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

/// Per-node inbound processor shared by every socket.
pub struct SessionGateway {
    registry: Arc<ConnectionRegistry>,
    publisher: Publisher,
    sink: NotificationSink,
    pipeline: Arc<AgenticPipeline>,
    assignments: Arc<AssignmentEngine>,
    presence: Arc<dyn PresenceStore>,
    chat_store: Option<Arc<dyn ChatStore>>,
    default_max_chats: u32,
}

impl SessionGateway {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        sink: NotificationSink,
        pipeline: Arc<AgenticPipeline>,
        assignments: Arc<AssignmentEngine>,
        presence: Arc<dyn PresenceStore>,
        default_max_chats: u32,
    ) -> Self {
        Self {
            registry,
            publisher: sink.publisher().clone(),
            sink,
            pipeline,
            assignments,
            presence,
            chat_store: None,
            default_max_chats,
        }
    }

    /// Chat messages are appended here after they are published.
    pub fn with_chat_store(mut self, store: Arc<dyn ChatStore>) -> Self {
        self.chat_store = Some(store);
        self
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub async fn connect_visitor(
        &self,
        claims: &VisitorClaims,
        writer: Box<dyn FrameWriter>,
    ) -> Peer {
        let conn = self
            .registry
            .register(
                NewConnection::visitor(&claims.tenant_id, &claims.project_id, &claims.session_id),
                writer,
            )
            .await;
        let peer = Peer {
            display_name: claims
                .visitor_name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| DEFAULT_VISITOR_NAME.to_string()),
            conn,
        };
        self.direct(
            &peer,
            json!({
                "type": "connected",
                "message": "Connected to chat session",
                "connection_id": peer.id(),
            }),
        )
        .await;
        peer
    }

    /// Registers an agent socket. The first socket of an agent puts them
    /// online in the presence store.
    pub async fn connect_agent(
        &self,
        identity: &AgentIdentity,
        writer: Box<dyn FrameWriter>,
    ) -> Peer {
        let conn = self
            .registry
            .register(
                NewConnection::agent(
                    &identity.tenant_id,
                    &identity.agent_id,
                    identity.project_ids.clone(),
                ),
                writer,
            )
            .await;

        if self.registry.agent_connection_count(&identity.agent_id).await == 1 {
            let record = self.online_record(conn.info(), &identity.email);
            if let Err(e) = self.presence.upsert(record).await {
                warn!(agent_id = %identity.agent_id, error = %e, "failed to mark agent online");
            }
        }

        let peer = Peer {
            display_name: if identity.email.is_empty() {
                identity.agent_id.clone()
            } else {
                identity.email.clone()
            },
            conn,
        };
        self.direct(
            &peer,
            json!({
                "type": "connected",
                "message": "Connected to console",
                "agent_id": identity.agent_id,
                "connection_id": peer.id(),
            }),
        )
        .await;
        peer
    }

    /// Handles one text frame. Malformed or forbidden frames are answered
    /// with an error notice and otherwise dropped.
    pub async fn handle_text(&self, peer: &Peer, raw: &str) {
        self.touch(peer).await;

        let frame: ClientFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(connection_id = %peer.id(), error = %e, "malformed frame dropped");
                self.reject(peer, "malformed frame").await;
                return;
            }
        };

        let result = match peer.conn.kind() {
            ConnectionKind::Visitor => self.visitor_frame(peer, frame).await,
            ConnectionKind::Agent | ConnectionKind::AiAgent => self.agent_frame(peer, frame).await,
        };
        if let Err(e) = result {
            debug!(connection_id = %peer.id(), error = %e, "frame rejected");
            self.reject(peer, &e.to_string()).await;
        }
    }

    /// Peer heard from: refreshes its routing entries and, for agents,
    /// their presence. An agent whose record went idle is put back online.
    pub async fn touch(&self, peer: &Peer) {
        self.registry.touch(peer.id()).await;

        let info = peer.conn.info();
        let Some(agent_id) = info.agent_id.as_deref() else {
            return;
        };
        match self.presence.touch(agent_id, Utc::now()).await {
            Ok(true) => {}
            Ok(false) => {
                let record = self.online_record(info, &peer.display_name);
                match self.presence.upsert(record).await {
                    Ok(()) => info!(agent_id, "agent presence restored"),
                    Err(e) => warn!(agent_id, error = %e, "failed to restore agent presence"),
                }
            }
            Err(e) => debug!(agent_id, error = %e, "presence activity not recorded"),
        }
    }

    /// Tears the socket down and settles what depended on it: the last
    /// socket of a session cancels its pending offers, the last socket of
    /// an agent takes them offline.
    pub async fn disconnect(&self, peer: Peer) {
        self.registry.remove(peer.id()).await;
        let info = peer.conn.info();

        match info.kind {
            ConnectionKind::Visitor => {
                let Some(session_id) = info.session_id.as_deref() else {
                    return;
                };
                if self.routing_set_empty(&session_key(session_id)).await {
                    let canceled = self.assignments.cancel_session(session_id).await;
                    if canceled > 0 {
                        info!(session_id, canceled, "visitor left, pending offers canceled");
                    }
                }
            }
            ConnectionKind::Agent | ConnectionKind::AiAgent => {
                let Some(agent_id) = info.agent_id.as_deref() else {
                    return;
                };
                if self.routing_set_empty(&agent_key(agent_id)).await {
                    match self.presence.update_status(agent_id, AgentStatus::Offline).await {
                        Ok(()) => info!(agent_id, "agent offline"),
                        Err(e) => debug!(agent_id, error = %e, "presence not updated on leave"),
                    }
                }
            }
        }
    }

    async fn visitor_frame(&self, peer: &Peer, frame: ClientFrame) -> Result<(), LivedeskError> {
        let (kind, body) = match frame {
            ClientFrame::Chat(body) => (EnvelopeType::Chat, body),
            ClientFrame::Typing(body) => (EnvelopeType::Typing, body),
            ClientFrame::Read(body) => (EnvelopeType::Read, body),
            ClientFrame::Ping => {
                self.pong(peer).await;
                return Ok(());
            }
            ClientFrame::Join(_) | ClientFrame::Leave(_) | ClientFrame::AgentStatus { .. } => {
                return Err(LivedeskError::Unauthorized(
                    "frame not permitted for visitors".into(),
                ));
            }
        };

        let info = peer.conn.info();
        let (Some(tenant_id), Some(project_id), Some(session_id)) = (
            info.tenant_id.as_deref(),
            info.primary_project(),
            info.session_id.as_deref(),
        ) else {
            return Err(LivedeskError::Internal("visitor connection without scope".into()));
        };
        let scope = SessionScope::new(tenant_id, project_id, session_id);

        let mut env = Envelope::new(kind, session_id)
            .with_scope(tenant_id, project_id)
            .from_origin(ConnectionKind::Visitor)
            .with_connection(peer.id())
            .with_data(authored(body.data, ConnectionKind::Visitor, &peer.display_name));

        // After acceptance the session belongs to its agent.
        if let Some(agent_id) = self.assignments.active_agent_for_session(session_id).await {
            env = env
                .with_agent(agent_id)
                .with_delivery(DeliveryMode::DirectToAgent);
            return self.publish(env).await;
        }
        env = env.with_delivery(DeliveryMode::BroadcastInSession);

        if kind != EnvelopeType::Chat {
            return self.publish(env).await;
        }

        let text = content(&env.data)?.to_string();
        let outcome = self
            .pipeline
            .decide(&Utterance {
                tenant_id: tenant_id.to_string(),
                project_id: project_id.to_string(),
                session_id: session_id.to_string(),
                text,
                received_at: Utc::now(),
            })
            .await;
        self.publish(env).await?;
        self.act(&scope, outcome).await;
        Ok(())
    }

    async fn agent_frame(&self, peer: &Peer, frame: ClientFrame) -> Result<(), LivedeskError> {
        let info = peer.conn.info();
        let agent_id = info.agent_id.clone().unwrap_or_default();

        let (kind, body) = match frame {
            ClientFrame::Chat(body) => (EnvelopeType::Chat, body),
            ClientFrame::Typing(body) => (EnvelopeType::Typing, body),
            ClientFrame::Read(body) => (EnvelopeType::Read, body),
            ClientFrame::Join(body) => (EnvelopeType::Join, body),
            ClientFrame::Leave(body) => (EnvelopeType::Leave, body),
            ClientFrame::Ping => {
                self.pong(peer).await;
                return Ok(());
            }
            ClientFrame::AgentStatus { status } => {
                self.presence.update_status(&agent_id, status).await?;
                info!(agent_id = %agent_id, status = %status, "agent status changed");
                self.direct(peer, json!({ "type": "status_updated", "status": status }))
                    .await;
                return Ok(());
            }
        };

        let session_id = body
            .session_id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| LivedeskError::Conflict("session_id is required".into()))?;
        let project_id = match body.project_id {
            Some(project_id) => project_id,
            None if info.project_ids.len() == 1 => info.project_ids[0].clone(),
            None => return Err(LivedeskError::Conflict("project_id is required".into())),
        };
        if !info.project_ids.contains(&project_id) {
            return Err(LivedeskError::Unauthorized(format!(
                "agent does not serve project {project_id}"
            )));
        }
        let tenant_id = info.tenant_id.clone().unwrap_or_default();

        let env = Envelope::new(kind, &session_id)
            .with_scope(&tenant_id, &project_id)
            .from_origin(ConnectionKind::Agent)
            .with_agent(&agent_id)
            .with_delivery(DeliveryMode::BroadcastInSession)
            .with_connection(peer.id())
            .with_data(authored(body.data, ConnectionKind::Agent, &peer.display_name));
        if kind == EnvelopeType::Chat {
            content(&env.data)?;
        }
        self.publish(env).await?;

        if kind == EnvelopeType::Leave && self.assignments.finish(&session_id, &agent_id).await {
            info!(agent_id = %agent_id, session_id = %session_id, "agent left conversation");
        }
        Ok(())
    }

    /// Carries out a pipeline decision for the session.
    async fn act(&self, scope: &SessionScope, outcome: Outcome) {
        match outcome {
            Outcome::None => {}
            Outcome::Greeting { reply, .. } => {
                self.sink.ai_reply(scope, &reply, "greeting", &[]).await;
            }
            Outcome::Knowledge { answer, .. } => {
                self.sink
                    .ai_reply(scope, &answer.text, "knowledge", &answer.citations)
                    .await;
            }
            Outcome::Handoff {
                request_type,
                urgency,
                signal,
            } => {
                let config = self.pipeline.config();
                if !config.agent_assignment {
                    self.sink
                        .handoff_request(
                            scope,
                            json!({
                                "request_type": request_type,
                                "urgency": urgency,
                                "score": signal.score,
                                "reasons": signal.reasons,
                            }),
                        )
                        .await;
                    return;
                }
                if self.offer_in_flight(scope).await {
                    debug!(session_id = %scope.session_id, "handoff already in progress");
                    return;
                }
                let request = AssignmentRequest {
                    tenant_id: scope.tenant_id.clone(),
                    project_id: scope.project_id.clone(),
                    session_id: scope.session_id.clone(),
                    customer_id: scope.session_id.clone(),
                    request_type,
                    urgency,
                    preferred_agent: None,
                };
                match self.assignments.request(request).await {
                    Ok(Offer::Offered(a)) => {
                        debug!(session_id = %scope.session_id, assignment_id = %a.id, "handoff offered");
                    }
                    Ok(Offer::Unavailable { .. }) => {}
                    Err(e) => {
                        warn!(session_id = %scope.session_id, error = %e, "handoff assignment failed");
                    }
                }
            }
        }
    }

    async fn offer_in_flight(&self, scope: &SessionScope) -> bool {
        self.assignments
            .pending(&scope.tenant_id)
            .await
            .iter()
            .any(|a| a.session_id == scope.session_id)
    }

    async fn publish(&self, mut env: Envelope) -> Result<(), LivedeskError> {
        env.stamp(Utc::now());
        let stored = (env.kind == EnvelopeType::Chat).then(|| env.clone());
        if !self.publisher.publish(env).await {
            return Err(LivedeskError::Bus {
                message: "message could not be delivered".into(),
                source: None,
            });
        }
        if let (Some(store), Some(env)) = (self.chat_store.clone(), stored) {
            tokio::spawn(async move {
                if let Err(e) = store.append_message(&env.session_id, &env).await {
                    warn!(session_id = %env.session_id, error = %e, "failed to store chat message");
                }
            });
        }
        Ok(())
    }

    /// Presence of an agent socket that just came online.
    fn online_record(&self, info: &ConnectionInfo, name: &str) -> AgentPresence {
        let mut record = AgentPresence::online(
            info.agent_id.clone().unwrap_or_default(),
            info.tenant_id.clone().unwrap_or_default(),
            self.default_max_chats,
            Utc::now(),
        )
        .with_projects(info.project_ids.clone());
        record.name = name.to_string();
        record
    }

    async fn routing_set_empty(&self, key: &str) -> bool {
        match self.registry.bus().set_members(key).await {
            Ok(members) => members.is_empty(),
            Err(e) => {
                warn!(key, error = %e, "failed to read routing set");
                false
            }
        }
    }

    async fn pong(&self, peer: &Peer) {
        self.direct(peer, json!({ "type": "pong" })).await;
    }

    async fn reject(&self, peer: &Peer, message: &str) {
        self.direct(peer, json!({ "type": "error", "message": message }))
            .await;
    }

    /// Writes a `session_update` straight to the socket.
    async fn direct(&self, peer: &Peer, data: Value) {
        let info = peer.conn.info();
        let mut env = Envelope::new(
            EnvelopeType::SessionUpdate,
            info.session_id.clone().unwrap_or_default(),
        )
        .with_connection(peer.id())
        .with_data(data);
        env.stamp(Utc::now());
        if let Err(e) = self.registry.send_to(&peer.conn, &env).await {
            debug!(connection_id = %peer.id(), error = %e, "direct frame not written");
        }
    }
}

/// Stamps the author onto a payload, wrapping non-object payloads.
fn authored(data: Value, kind: ConnectionKind, name: &str) -> Value {
    let mut data = match data {
        Value::Object(map) => Value::Object(map),
        Value::Null => json!({}),
        other => json!({ "content": other }),
    };
    data["author_type"] = json!(kind);
    data["author_name"] = json!(name);
    data
}

fn content(data: &Value) -> Result<&str, LivedeskError> {
    data.get("content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| LivedeskError::Conflict("chat message has no content".into()))
}
