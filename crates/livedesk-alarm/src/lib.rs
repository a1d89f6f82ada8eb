// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Escalating alarms for waiting conversations.
//!
//! An alarm is raised when a high-priority handoff needs an agent. It gets
//! louder on every policy interval until an agent in the project
//! acknowledges it (or accepts the assignment it belongs to). Alarms are
//! per-node and do not survive a restart.

pub mod engine;
pub mod policy;

pub use engine::{AlarmEngine, AlarmStats, AlarmTrigger, Acknowledgment, ActiveAlarm};
pub use policy::{AlarmChannel, AlarmLevel, EscalationPolicy};
