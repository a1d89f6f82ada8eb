// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Livedesk chat broker.
//!
//! This crate provides the error type, the [`Envelope`] that crosses the
//! bus, routing-key helpers, and the collaborator traits every other crate
//! in the workspace is written against.

pub mod envelope;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use envelope::{Envelope, EnvelopeType, agent_key, project_key, session_key};
pub use error::LivedeskError;
pub use types::{
    AgentPresence, AgentSkill, AgentStatus, ChunkKind, ConnectionKind, DeliveryMode, HealthStatus,
    KnowledgeChunk, Priority, RequestType, Urgency,
};

pub use traits::{Bus, ChatStore, EnvelopeStream, KnowledgeSource, PresenceStore};
