// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics for the Livedesk broker.
//!
//! Uses the metrics-rs facade with the Prometheus exporter. Components call
//! the helpers in [`recording`]; the gateway renders the text format on
//! `/metrics`.

pub mod recording;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use livedesk_core::LivedeskError;

pub use recording::{
    record_alarm, record_assignment, record_delivery, record_pipeline_latency,
    record_pipeline_outcome, record_published, set_connections,
};

/// Installed Prometheus recorder.
pub struct PrometheusExporter {
    handle: PrometheusHandle,
}

impl PrometheusExporter {
    /// Install the Prometheus recorder globally. Only one recorder can be
    /// installed per process; a second call returns an error.
    pub fn install() -> Result<Self, LivedeskError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            LivedeskError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();

        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livedesk_core::{ConnectionKind, EnvelopeType};

    #[test]
    fn helpers_record_into_local_recorder() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_published(EnvelopeType::Chat);
            record_published(EnvelopeType::Chat);
            record_delivery(3);
            record_pipeline_outcome("greeting");
            set_connections(ConnectionKind::Agent, 4);
        });

        let rendered = handle.render();
        assert!(rendered.contains("livedesk_envelopes_published_total{type=\"chat\"} 2"));
        assert!(rendered.contains("livedesk_envelopes_delivered_total 3"));
        assert!(rendered.contains("livedesk_pipeline_outcomes_total{outcome=\"greeting\"} 1"));
        assert!(rendered.contains("livedesk_connections{kind=\"agent\"} 4"));
    }
}
