// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handoff assignment for Livedesk.
//!
//! When a visitor asks for a human, the engine ranks the tenant's online
//! agents, offers the session to the best one with a deadline that depends
//! on urgency, and moves the offer down the ranking on decline or timeout.

pub mod engine;
pub mod presence;
pub mod selection;

pub use engine::{
    Assignment, AssignmentEngine, AssignmentRequest, AssignmentStats, AssignmentStatus, Offer,
};
pub use presence::BusPresenceStore;
pub use selection::{Candidate, Criteria, rank, required_skill};
