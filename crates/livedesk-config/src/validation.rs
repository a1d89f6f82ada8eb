// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::{BusBackend, LivedeskConfig};

/// Validate a deserialized configuration, collecting every failure.
pub fn validate_config(config: &LivedeskConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.server.host.trim().is_empty() {
        errors.push(ConfigError::validation("server.host must not be empty"));
    }
    if config.server.port == 0 {
        errors.push(ConfigError::validation("server.port must be non-zero"));
    }

    if config.bus.backend == BusBackend::Redis
        && config.bus.redis_url.as_deref().is_none_or(|u| u.trim().is_empty())
    {
        errors.push(ConfigError::validation(
            "bus.redis_url is required when bus.backend = \"redis\"",
        ));
    }
    if config.bus.channel.trim().is_empty() {
        errors.push(ConfigError::validation("bus.channel must not be empty"));
    }

    // Routing entries must survive at least two missed pings.
    let ping = config.livechat.ping_interval_secs;
    if ping == 0 {
        errors.push(ConfigError::validation(
            "livechat.ping_interval_secs must be non-zero",
        ));
    } else if ping.saturating_mul(3) > config.bus.connection_ttl_secs {
        errors.push(ConfigError::validation(format!(
            "livechat.ping_interval_secs ({ping}) must be at most a third of bus.connection_ttl_secs ({})",
            config.bus.connection_ttl_secs
        )));
    }
    if config.livechat.stale_after_secs <= ping {
        errors.push(ConfigError::validation(format!(
            "livechat.stale_after_secs ({}) must exceed livechat.ping_interval_secs ({ping})",
            config.livechat.stale_after_secs
        )));
    }

    let agentic = &config.agentic;
    for (name, value) in [
        ("greeting_confidence", agentic.greeting_confidence),
        ("knowledge_confidence", agentic.knowledge_confidence),
        ("domain_relevance_confidence", agentic.domain_relevance_confidence),
        ("agent_request_threshold", agentic.agent_request_threshold),
        ("similarity_floor", config.knowledge.similarity_floor),
    ] {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ConfigError::validation(format!(
                "{name} must be within [0, 1], got {value}"
            )));
        }
    }
    if agentic.response_timeout_ms == 0 {
        errors.push(ConfigError::validation(
            "agentic.response_timeout_ms must be non-zero",
        ));
    }
    if agentic.max_concurrent_sessions == 0 {
        errors.push(ConfigError::validation(
            "agentic.max_concurrent_sessions must be at least 1",
        ));
    }

    if config.knowledge.max_results == 0 {
        errors.push(ConfigError::validation("knowledge.max_results must be at least 1"));
    }

    let assignment = &config.assignment;
    if assignment.sweep_interval_ms == 0 {
        errors.push(ConfigError::validation(
            "assignment.sweep_interval_ms must be non-zero",
        ));
    }
    for (name, value) in [
        ("critical_timeout_secs", assignment.critical_timeout_secs),
        ("high_timeout_secs", assignment.high_timeout_secs),
        ("normal_timeout_secs", assignment.normal_timeout_secs),
        ("low_timeout_secs", assignment.low_timeout_secs),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!(
                "assignment.{name} must be non-zero"
            )));
        }
    }
    if config.alarm.tick_interval_secs == 0 {
        errors.push(ConfigError::validation("alarm.tick_interval_secs must be non-zero"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
