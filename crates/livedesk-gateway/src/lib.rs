// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP and WebSocket gateway for Livedesk.
//!
//! Two socket populations are served: anonymous visitors, authenticated
//! by a per-session token signed with their widget's key, and agents,
//! authenticated by a tenant JWT. Their frames are published on the bus;
//! the fan-out router on every node delivers them back out.
//!
//! The REST surface lets agents accept or decline assignments and
//! acknowledge alarms.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod session;
pub mod ws;

pub use auth::{AgentClaims, AgentIdentity, TokenVerifier, VisitorClaims};
pub use server::{GatewayState, HealthState, router, start_server};
pub use session::{ClientFrame, Peer, SessionGateway};
