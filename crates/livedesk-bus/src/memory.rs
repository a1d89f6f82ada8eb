// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-local bus.
//!
//! Several routers sharing one `Arc<MemoryBus>` behave exactly like several
//! nodes sharing one Redis: each subscription sees every publish, and the
//! routing sets and values are visible to all of them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::Instant;

use livedesk_core::{Bus, Envelope, EnvelopeStream, HealthStatus, LivedeskError};

/// Buffered envelopes per subscriber before it starts lagging.
const CHANNEL_CAPACITY: usize = 1024;

/// In-memory implementation of [`Bus`].
pub struct MemoryBus {
    channels: DashMap<String, broadcast::Sender<Envelope>>,
    /// key -> member -> expiry
    sets: DashMap<String, HashMap<String, Instant>>,
    /// key -> (value, expiry)
    values: DashMap<String, (String, Instant)>,
    available: AtomicBool,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            sets: DashMap::new(),
            values: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the substrate going away (or coming back). While
    /// unavailable every operation fails with [`LivedeskError::Bus`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// End every open subscription stream, as a dropped connection would.
    pub fn disconnect_subscribers(&self) {
        self.channels.clear();
    }

    fn check_available(&self) -> Result<(), LivedeskError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LivedeskError::Bus {
                message: "memory bus unavailable".into(),
                source: None,
            })
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<Envelope> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bus for MemoryBus {
    fn name(&self) -> &str {
        "memory"
    }

    async fn publish(&self, channel: &str, envelope: &Envelope) -> Result<(), LivedeskError> {
        self.check_available()?;
        // No receivers means nobody to deliver to, not a failure.
        let _ = self.sender(channel).send(envelope.clone());
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<EnvelopeStream, LivedeskError> {
        self.check_available()?;
        let rx = self.sender(channel).subscribe();
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => return Some((envelope, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "bus subscriber lagged, envelopes dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(stream))
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> Result<(), LivedeskError> {
        self.check_available()?;
        self.sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), LivedeskError> {
        self.check_available()?;
        let now_empty = match self.sets.get_mut(key) {
            Some(mut members) => {
                members.remove(member);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.sets.remove_if(key, |_, members| members.is_empty());
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, LivedeskError> {
        self.check_available()?;
        let now = Instant::now();
        let Some(mut members) = self.sets.get_mut(key) else {
            return Ok(Vec::new());
        };
        members.retain(|_, expires| *expires > now);
        let mut live: Vec<String> = members.keys().cloned().collect();
        live.sort();
        Ok(live)
    }

    async fn value_get(&self, key: &str) -> Result<Option<String>, LivedeskError> {
        self.check_available()?;
        let now = Instant::now();
        self.values.remove_if(key, |_, (_, expires)| *expires <= now);
        Ok(self.values.get(key).map(|v| v.0.clone()))
    }

    async fn value_set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LivedeskError> {
        self.check_available()?;
        self.values
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn value_delete(&self, key: &str) -> Result<(), LivedeskError> {
        self.check_available()?;
        self.values.remove(key);
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus, LivedeskError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy("memory bus unavailable".into()))
        }
    }
}
