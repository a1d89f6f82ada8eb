// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics. Without a recorder every call is a no-op.

use metrics::{describe_counter, describe_gauge, describe_histogram};

use livedesk_core::{ConnectionKind, EnvelopeType};

/// Register all metric descriptions. Called once after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "livedesk_envelopes_published_total",
        "Envelopes accepted by the bus"
    );
    describe_counter!(
        "livedesk_envelopes_delivered_total",
        "Envelope writes to local sockets"
    );
    describe_counter!(
        "livedesk_pipeline_outcomes_total",
        "Agentic pipeline decisions by outcome"
    );
    describe_counter!(
        "livedesk_assignments_total",
        "Assignment transitions by status"
    );
    describe_counter!("livedesk_alarms_total", "Alarm lifecycle events");
    describe_gauge!("livedesk_connections", "Live sockets on this node");
    describe_histogram!(
        "livedesk_pipeline_latency_seconds",
        "Time spent deciding a pipeline outcome"
    );
}

pub fn record_published(kind: EnvelopeType) {
    metrics::counter!("livedesk_envelopes_published_total", "type" => kind.to_string())
        .increment(1);
}

/// Record `count` successful socket writes.
pub fn record_delivery(count: u64) {
    metrics::counter!("livedesk_envelopes_delivered_total").increment(count);
}

pub fn record_pipeline_outcome(outcome: &'static str) {
    metrics::counter!("livedesk_pipeline_outcomes_total", "outcome" => outcome).increment(1);
}

pub fn record_pipeline_latency(seconds: f64) {
    metrics::histogram!("livedesk_pipeline_latency_seconds").record(seconds);
}

pub fn record_assignment(status: &str) {
    metrics::counter!("livedesk_assignments_total", "status" => status.to_string()).increment(1);
}

pub fn record_alarm(event: &'static str) {
    metrics::counter!("livedesk_alarms_total", "event" => event).increment(1);
}

/// Set the number of live sockets of one kind on this node.
pub fn set_connections(kind: ConnectionKind, count: usize) {
    metrics::gauge!("livedesk_connections", "kind" => kind.to_string()).set(count as f64);
}
