// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fire-and-forget publish with a single retry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use livedesk_core::{Bus, Envelope};

/// Publish handle shared by the gateway, the pipeline and the notification
/// sink. Stamps the publish time, retries once after a short backoff, then
/// logs and drops.
#[derive(Clone)]
pub struct Publisher {
    bus: Arc<dyn Bus>,
    channel: Arc<str>,
    retry_backoff: Duration,
}

impl Publisher {
    pub fn new(bus: Arc<dyn Bus>, channel: impl Into<Arc<str>>, retry_backoff: Duration) -> Self {
        Self {
            bus,
            channel: channel.into(),
            retry_backoff,
        }
    }

    pub fn bus(&self) -> &Arc<dyn Bus> {
        &self.bus
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Publish `envelope`. Returns whether the bus accepted it; failures are
    /// already logged, callers are not expected to act on them.
    pub async fn publish(&self, mut envelope: Envelope) -> bool {
        envelope.stamp(Utc::now());

        let first = match self.bus.publish(&self.channel, &envelope).await {
            Ok(()) => {
                livedesk_prometheus::record_published(envelope.kind);
                return true;
            }
            Err(e) => e,
        };

        tracing::debug!(
            session_id = %envelope.session_id,
            error = %first,
            "publish failed, retrying once"
        );
        tokio::time::sleep(self.retry_backoff).await;

        match self.bus.publish(&self.channel, &envelope).await {
            Ok(()) => {
                livedesk_prometheus::record_published(envelope.kind);
                true
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %envelope.session_id,
                    kind = %envelope.kind,
                    error = %e,
                    "publish failed after retry, envelope dropped"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBus;
    use futures::StreamExt;
    use livedesk_core::EnvelopeType;

    #[tokio::test]
    async fn publish_stamps_timestamp() {
        let bus = Arc::new(MemoryBus::new());
        let publisher = Publisher::new(bus.clone(), "ch", Duration::from_millis(1));
        let mut stream = bus.subscribe("ch").await.unwrap();

        assert!(publisher.publish(Envelope::new(EnvelopeType::Chat, "s")).await);
        let received = stream.next().await.unwrap();
        assert!(received.timestamp.is_some());
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn failed_publish_is_logged_and_dropped() {
        let bus = Arc::new(MemoryBus::new());
        bus.set_available(false);
        let publisher = Publisher::new(bus, "ch", Duration::from_millis(1));

        assert!(!publisher.publish(Envelope::new(EnvelopeType::Chat, "s9")).await);
        assert!(logs_contain("envelope dropped"));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_succeeds_when_bus_recovers() {
        let bus = Arc::new(MemoryBus::new());
        let mut stream = bus.subscribe("ch").await.unwrap();
        bus.set_available(false);
        let publisher = Publisher::new(bus.clone(), "ch", Duration::from_millis(50));

        let task = tokio::spawn({
            let publisher = publisher.clone();
            async move { publisher.publish(Envelope::new(EnvelopeType::Read, "s")).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.set_available(true);

        assert!(task.await.unwrap());
        assert_eq!(stream.next().await.unwrap().kind, EnvelopeType::Read);
    }
}
