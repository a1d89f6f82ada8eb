// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Livedesk configuration system.

use livedesk_config::diagnostic::ConfigError;
use livedesk_config::model::BusBackend;
use livedesk_config::{load_and_validate_str, load_config_from_str};

/// A file touching every section deserializes.
#[test]
fn full_toml_deserializes() {
    let toml = r#"
[server]
host = "0.0.0.0"
port = 9090
node_id = "node-a"
log_level = "debug"

[bus]
backend = "redis"
redis_url = "redis://127.0.0.1:6379"
connection_ttl_secs = 240

[livechat]
ping_interval_secs = 20
stale_after_secs = 60

[auth]
jwt_secret = "jwt"
widget_secret = "widgets"

[agentic]
greeting_confidence = 0.5
agent_request_keywords = ["talk to sales"]
response_timeout_ms = 2500

[knowledge]
max_results = 5

[assignment]
high_timeout_secs = 45

[alarm]
tick_interval_secs = 10

[brands.proj-1]
company_name = "Acme"
about = "We sell anvils."

[prometheus]
enabled = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.server.node_id.as_deref(), Some("node-a"));
    assert_eq!(config.bus.backend, BusBackend::Redis);
    assert_eq!(config.bus.connection_ttl_secs, 240);
    assert_eq!(config.livechat.ping_interval_secs, 20);
    assert_eq!(config.auth.jwt_secret.as_deref(), Some("jwt"));
    assert!((config.agentic.greeting_confidence - 0.5).abs() < f64::EPSILON);
    assert_eq!(config.agentic.agent_request_keywords, vec!["talk to sales"]);
    assert_eq!(config.knowledge.max_results, 5);
    assert_eq!(config.assignment.high_timeout_secs, 45);
    assert_eq!(config.alarm.tick_interval_secs, 10);
    assert_eq!(
        config.brands["proj-1"].company_name.as_deref(),
        Some("Acme")
    );
    assert!(!config.prometheus.enabled);
}

/// Missing sections fall back to defaults.
#[test]
fn empty_toml_uses_defaults() {
    let config = load_config_from_str("").expect("empty TOML is valid");
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.bus.key_prefix, "livechat:");
    assert!(config.agentic.enabled);
}

#[test]
fn unknown_key_in_bus_is_rejected() {
    let err = load_config_from_str("[bus]\nbackndd = \"redis\"\n")
        .expect_err("should reject unknown field");
    assert!(format!("{err}").contains("backndd"));
}

#[test]
fn unknown_key_produces_suggestion() {
    let errors = load_and_validate_str("[livechat]\nping_intreval_secs = 10\n")
        .expect_err("should reject unknown field");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "ping_intreval_secs");
            assert_eq!(suggestion.as_deref(), Some("ping_interval_secs"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn unknown_brand_key_is_rejected() {
    let errors = load_and_validate_str("[brands.p]\ncompny_name = \"x\"\n")
        .expect_err("should reject unknown field");
    assert!(matches!(&errors[0], ConfigError::UnknownKey { .. }));
}

#[test]
fn wrong_type_is_reported() {
    let errors =
        load_and_validate_str("[server]\nport = \"eighty\"\n").expect_err("port must be a number");
    assert!(matches!(&errors[0], ConfigError::InvalidType { .. }));
}

#[test]
fn unknown_backend_is_rejected() {
    assert!(load_config_from_str("[bus]\nbackend = \"kafka\"\n").is_err());
}

#[test]
fn validation_runs_after_parse() {
    let errors = load_and_validate_str("[bus]\nbackend = \"redis\"\n")
        .expect_err("redis without url is invalid");
    assert!(matches!(&errors[0], ConfigError::Validation { .. }));
}
