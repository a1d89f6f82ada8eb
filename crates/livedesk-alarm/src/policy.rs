// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alarm levels and per-priority escalation policies.

use std::time::Duration;

use livedesk_core::Priority;
use serde::Serialize;
use strum::Display;

/// Loudness of an alarm on the agent console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlarmLevel {
    Initial,
    Escalated,
    Urgent,
    Critical,
}

impl AlarmLevel {
    pub fn rank(self) -> u32 {
        self as u32
    }

    /// One step louder, saturating at `Critical`.
    pub fn next(self) -> Self {
        match self {
            AlarmLevel::Initial => AlarmLevel::Escalated,
            AlarmLevel::Escalated => AlarmLevel::Urgent,
            AlarmLevel::Urgent | AlarmLevel::Critical => AlarmLevel::Critical,
        }
    }
}

/// How the console presents an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlarmChannel {
    Web,
    Desktop,
    Audio,
    Popup,
    Overlay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationPolicy {
    pub initial_level: AlarmLevel,
    pub max_level: AlarmLevel,
    #[serde(rename = "interval_secs", serialize_with = "as_secs")]
    pub interval: Duration,
    pub channels: Vec<AlarmChannel>,
}

impl EscalationPolicy {
    pub fn for_priority(priority: Priority) -> Self {
        use AlarmChannel::*;
        let (initial_level, max_level, minutes, channels) = match priority {
            Priority::Low => (AlarmLevel::Initial, AlarmLevel::Initial, 5, vec![Web]),
            Priority::Normal => (AlarmLevel::Initial, AlarmLevel::Escalated, 3, vec![Web, Desktop]),
            Priority::High => (
                AlarmLevel::Initial,
                AlarmLevel::Urgent,
                2,
                vec![Web, Desktop, Audio, Popup],
            ),
            Priority::Critical => (
                AlarmLevel::Escalated,
                AlarmLevel::Critical,
                1,
                vec![Web, Desktop, Audio, Popup, Overlay],
            ),
        };
        Self {
            initial_level,
            max_level,
            interval: Duration::from_secs(minutes * 60),
            channels,
        }
    }

    /// Escalations possible before the alarm sits at its max level.
    pub fn max_escalations(&self) -> u32 {
        self.max_level.rank() - self.initial_level.rank()
    }
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered_and_saturate() {
        assert!(AlarmLevel::Initial < AlarmLevel::Critical);
        assert_eq!(AlarmLevel::Initial.next(), AlarmLevel::Escalated);
        assert_eq!(AlarmLevel::Critical.next(), AlarmLevel::Critical);
    }

    #[test]
    fn policies_by_priority() {
        let high = EscalationPolicy::for_priority(Priority::High);
        assert_eq!(high.interval, Duration::from_secs(120));
        assert_eq!(high.max_escalations(), 2);
        assert!(high.channels.contains(&AlarmChannel::Audio));

        let critical = EscalationPolicy::for_priority(Priority::Critical);
        assert_eq!(critical.initial_level, AlarmLevel::Escalated);
        assert_eq!(critical.max_escalations(), 2);
        assert!(critical.channels.contains(&AlarmChannel::Overlay));

        assert_eq!(EscalationPolicy::for_priority(Priority::Low).max_escalations(), 0);
    }

    #[test]
    fn policy_serializes_interval_in_seconds() {
        let json = serde_json::to_value(EscalationPolicy::for_priority(Priority::Normal)).unwrap();
        assert_eq!(json["interval_secs"], 180);
        assert_eq!(json["max_level"], "escalated");
        assert_eq!(json["channels"][1], "desktop");
    }
}
