// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket endpoints for visitors and agents.
//!
//! Tokens are checked before the upgrade, so a bad token is refused with
//! a 401 instead of a socket. After the upgrade the write half becomes the
//! connection's [`FrameWriter`] and this task runs the read loop until the
//! peer goes away or the registry removes the connection.
//!
//! Client -> server (JSON):
//! ```json
//! {"type": "chat", "data": {"content": "hello"}}
//! {"type": "typing", "session_id": "s1", "project_id": "p1", "data": {}}
//! {"type": "ping"}
//! {"type": "agent_status", "status": "away"}
//! ```
//!
//! Server -> client: envelopes, see [`livedesk_core::Envelope`].

use async_trait::async_trait;
use axum::{
    Json,
    body::Bytes,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;

use livedesk_core::LivedeskError;
use livedesk_fanout::{Frame, FrameWriter};

use crate::auth::bearer_token;
use crate::server::GatewayState;
use crate::session::{Peer, SessionGateway};

/// Query of `GET /ws/chat`.
#[derive(Debug, Deserialize)]
pub struct VisitorQuery {
    pub widget_id: String,
    pub session_token: String,
}

/// Query of `GET /ws/agent`; the header wins when both are present.
#[derive(Debug, Default, Deserialize)]
pub struct AgentQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// Write half of an upgraded socket.
pub struct SocketWriter {
    label: String,
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameWriter for SocketWriter {
    async fn write(&mut self, frame: Frame) -> Result<(), LivedeskError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Ping => Message::Ping(Bytes::new()),
            Frame::Close => Message::Close(None),
        };
        self.sink
            .send(message)
            .await
            .map_err(|e| LivedeskError::Transport {
                connection_id: self.label.clone(),
                message: e.to_string(),
            })
    }
}

/// `GET /ws/chat?widget_id=..&session_token=..`
pub async fn visitor_socket(
    ws: WebSocketUpgrade,
    Query(query): Query<VisitorQuery>,
    State(state): State<GatewayState>,
) -> Response {
    let claims = match state
        .verifier
        .verify_visitor(&query.widget_id, &query.session_token)
    {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(widget_id = %query.widget_id, error = %e, "visitor upgrade refused");
            return unauthorized();
        }
    };

    let gateway = state.gateway.clone();
    ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        let writer = SocketWriter {
            label: format!("visitor:{}", claims.session_id),
            sink,
        };
        let peer = gateway.connect_visitor(&claims, Box::new(writer)).await;
        read_loop(&gateway, peer, stream).await;
    })
}

/// `GET /ws/agent` with `Authorization: Bearer <jwt>` or `?token=<jwt>`.
pub async fn agent_socket(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<AgentQuery>,
    State(state): State<GatewayState>,
) -> Response {
    let Some(token) = bearer_token(&headers)
        .map(str::to_string)
        .or(query.token)
    else {
        return unauthorized();
    };
    let identity = match state.verifier.verify_agent(&token) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::debug!(error = %e, "agent upgrade refused");
            return unauthorized();
        }
    };

    let gateway = state.gateway.clone();
    ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        let writer = SocketWriter {
            label: format!("agent:{}", identity.agent_id),
            sink,
        };
        let peer = gateway.connect_agent(&identity, Box::new(writer)).await;
        read_loop(&gateway, peer, stream).await;
    })
}

/// Reads until the peer closes, the socket errors or the registry drops
/// the connection, then tears the connection down.
async fn read_loop(gateway: &SessionGateway, peer: Peer, mut stream: SplitStream<WebSocket>) {
    let removed = peer.connection().cancelled();
    loop {
        tokio::select! {
            next = stream.next() => match next {
                Some(Ok(Message::Text(text))) => gateway.handle_text(&peer, text.as_str()).await,
                Some(Ok(Message::Pong(_) | Message::Ping(_))) => gateway.touch(&peer).await,
                Some(Ok(Message::Binary(_))) => {
                    tracing::debug!(connection_id = %peer.id(), "binary frame ignored");
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %peer.id(), error = %e, "socket read failed");
                    break;
                }
            },
            _ = removed.cancelled() => break,
        }
    }
    gateway.disconnect(peer).await;
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "unauthorized" })),
    )
        .into_response()
}
