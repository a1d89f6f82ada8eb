// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Livedesk chat broker.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level Livedesk configuration.
///
/// Every section is optional and defaults to values suitable for a single
/// node running the in-memory bus.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LivedeskConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub bus: BusConfig,

    /// Socket heartbeat settings.
    #[serde(default)]
    pub livechat: LivechatConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    /// Automatic-response pipeline settings.
    #[serde(default)]
    pub agentic: AgenticConfig,

    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    #[serde(default)]
    pub assignment: AssignmentConfig,

    #[serde(default)]
    pub alarm: AlarmConfig,

    /// Branding per project id, used by greeting replies.
    #[serde(default)]
    pub brands: BTreeMap<String, BrandConfig>,

    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// HTTP listener and node identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Stable node identity. A random one is generated at startup when unset.
    #[serde(default)]
    pub node_id: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            node_id: None,
            log_level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Which substrate carries routing sets and pub/sub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// Process-local. Single node, or several nodes inside one test process.
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    #[serde(default)]
    pub backend: BusBackend,

    /// Required when `backend = "redis"`.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// The single publish channel every node subscribes to.
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Prepended to every routing-set key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Lifetime of a routing-set entry without a refreshing ping.
    #[serde(default = "default_connection_ttl_secs")]
    pub connection_ttl_secs: u64,

    /// Delay before the single publish retry.
    #[serde(default = "default_publish_retry_backoff_ms")]
    pub publish_retry_backoff_ms: u64,

    /// Upper bound for subscription reconnect backoff.
    #[serde(default = "default_reconnect_max_backoff_secs")]
    pub reconnect_max_backoff_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::default(),
            redis_url: None,
            channel: default_channel(),
            key_prefix: default_key_prefix(),
            connection_ttl_secs: default_connection_ttl_secs(),
            publish_retry_backoff_ms: default_publish_retry_backoff_ms(),
            reconnect_max_backoff_secs: default_reconnect_max_backoff_secs(),
        }
    }
}

fn default_channel() -> String {
    "pubsub:livechat".to_string()
}

fn default_key_prefix() -> String {
    "livechat:".to_string()
}

fn default_connection_ttl_secs() -> u64 {
    300
}

fn default_publish_retry_backoff_ms() -> u64 {
    50
}

fn default_reconnect_max_backoff_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LivechatConfig {
    /// How often each socket is pinged and its routing entries refreshed.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// A socket silent for longer than this is reaped.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

impl Default for LivechatConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

fn default_ping_interval_secs() -> u64 {
    30
}

fn default_stale_after_secs() -> u64 {
    90
}

/// Token verification secrets. Absent secrets fail closed.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// HS256 secret for tenant agent JWTs.
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Master secret from which per-widget signing keys are derived.
    #[serde(default)]
    pub widget_secret: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |s: &Option<String>| s.as_ref().map(|_| "[redacted]");
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &redact(&self.jwt_secret))
            .field("widget_secret", &redact(&self.widget_secret))
            .finish()
    }
}

/// Toggles, thresholds and keyword lists of the automatic-response pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgenticConfig {
    /// Master switch. When off, every message falls through.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub greeting_detection: bool,

    #[serde(default = "default_true")]
    pub knowledge_responses: bool,

    /// Whether a positive handoff decision creates an assignment.
    #[serde(default = "default_true")]
    pub agent_assignment: bool,

    #[serde(default = "default_true")]
    pub agent_request_detection: bool,

    /// Whether assignments may raise alarms.
    #[serde(default = "default_true")]
    pub notification_alerts: bool,

    #[serde(default = "default_greeting_confidence")]
    pub greeting_confidence: f64,

    /// Minimum self-assessed confidence of a synthesized answer.
    #[serde(default = "default_knowledge_confidence")]
    pub knowledge_confidence: f64,

    #[serde(default = "default_domain_relevance_confidence")]
    pub domain_relevance_confidence: f64,

    #[serde(default = "default_agent_request_threshold")]
    pub agent_request_threshold: f64,

    /// Replaces the built-in greeting vocabulary when non-empty.
    #[serde(default)]
    pub greeting_keywords: Vec<String>,

    /// Extra phrases that each add weight to the agent-request score.
    #[serde(default)]
    pub agent_request_keywords: Vec<String>,

    /// Replaces the built-in greeting suppressors when non-empty.
    #[serde(default)]
    pub negative_keywords: Vec<String>,

    /// Per-message processing budget.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Messages processed by the pipeline at once, per node.
    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: usize,
}

impl Default for AgenticConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            greeting_detection: true,
            knowledge_responses: true,
            agent_assignment: true,
            agent_request_detection: true,
            notification_alerts: true,
            greeting_confidence: default_greeting_confidence(),
            knowledge_confidence: default_knowledge_confidence(),
            domain_relevance_confidence: default_domain_relevance_confidence(),
            agent_request_threshold: default_agent_request_threshold(),
            greeting_keywords: Vec::new(),
            agent_request_keywords: Vec::new(),
            negative_keywords: Vec::new(),
            response_timeout_ms: default_response_timeout_ms(),
            max_concurrent_sessions: default_max_concurrent_sessions(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_greeting_confidence() -> f64 {
    0.4
}

fn default_knowledge_confidence() -> f64 {
    0.7
}

fn default_domain_relevance_confidence() -> f64 {
    0.6
}

fn default_agent_request_threshold() -> f64 {
    0.7
}

fn default_response_timeout_ms() -> u64 {
    5000
}

fn default_max_concurrent_sessions() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KnowledgeConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Chunks scoring below this are discarded.
    #[serde(default = "default_similarity_floor")]
    pub similarity_floor: f64,

    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            similarity_floor: default_similarity_floor(),
            search_timeout_ms: default_search_timeout_ms(),
        }
    }
}

fn default_max_results() -> usize {
    10
}

fn default_similarity_floor() -> f64 {
    0.6
}

fn default_search_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AssignmentConfig {
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    #[serde(default = "default_critical_timeout_secs")]
    pub critical_timeout_secs: u64,

    #[serde(default = "default_high_timeout_secs")]
    pub high_timeout_secs: u64,

    #[serde(default = "default_normal_timeout_secs")]
    pub normal_timeout_secs: u64,

    #[serde(default = "default_low_timeout_secs")]
    pub low_timeout_secs: u64,

    /// Capacity given to agents whose presence record is created on connect.
    #[serde(default = "default_max_chats")]
    pub default_max_chats: u32,

    /// Presence records idle for longer than this are dropped.
    #[serde(default = "default_presence_idle_secs")]
    pub presence_idle_secs: u64,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval_ms(),
            critical_timeout_secs: default_critical_timeout_secs(),
            high_timeout_secs: default_high_timeout_secs(),
            normal_timeout_secs: default_normal_timeout_secs(),
            low_timeout_secs: default_low_timeout_secs(),
            default_max_chats: default_max_chats(),
            presence_idle_secs: default_presence_idle_secs(),
        }
    }
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

fn default_critical_timeout_secs() -> u64 {
    30
}

fn default_high_timeout_secs() -> u64 {
    60
}

fn default_normal_timeout_secs() -> u64 {
    120
}

fn default_low_timeout_secs() -> u64 {
    300
}

fn default_max_chats() -> u32 {
    5
}

fn default_presence_idle_secs() -> u64 {
    600
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AlarmConfig {
    /// Ticker period for the escalation scan.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// How long an alarm sits at its max level before it is dropped.
    #[serde(default = "default_max_level_grace_secs")]
    pub max_level_grace_secs: u64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            max_level_grace_secs: default_max_level_grace_secs(),
        }
    }
}

fn default_tick_interval_secs() -> u64 {
    30
}

fn default_max_level_grace_secs() -> u64 {
    300
}

/// Project branding for greeting replies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BrandConfig {
    #[serde(default)]
    pub company_name: Option<String>,

    /// One or two sentences about the company, inserted verbatim.
    #[serde(default)]
    pub about: Option<String>,

    #[serde(default)]
    pub support_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
