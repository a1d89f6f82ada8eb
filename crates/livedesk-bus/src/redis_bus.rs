// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redis-backed bus for multi-node deployments.
//!
//! Routing sets are sorted sets whose scores are per-member expiry times in
//! epoch milliseconds, so a crashed node's connections age out member by
//! member. Expired members are trimmed on read. The key itself also carries
//! a TTL so abandoned sets disappear. Values are plain strings set with
//! a millisecond expiry.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use livedesk_core::{Bus, Envelope, EnvelopeStream, HealthStatus, LivedeskError};

/// Redis implementation of [`Bus`].
pub struct RedisBus {
    client: redis::Client,
    manager: ConnectionManager,
    key_prefix: String,
}

fn bus_error(message: impl Into<String>, e: redis::RedisError) -> LivedeskError {
    LivedeskError::Bus {
        message: message.into(),
        source: Some(Box::new(e)),
    }
}

impl RedisBus {
    pub async fn connect(url: &str, key_prefix: &str) -> Result<Self, LivedeskError> {
        let client = redis::Client::open(url)
            .map_err(|e| bus_error(format!("failed to open redis client for {url}"), e))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| bus_error("failed to connect to redis", e))?;
        Ok(Self {
            client,
            manager,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }
}

#[async_trait]
impl Bus for RedisBus {
    fn name(&self) -> &str {
        "redis"
    }

    async fn publish(&self, channel: &str, envelope: &Envelope) -> Result<(), LivedeskError> {
        let payload = envelope.to_json().map_err(|e| LivedeskError::Bus {
            message: "failed to encode envelope".into(),
            source: Some(Box::new(e)),
        })?;
        let mut conn = self.manager.clone();
        conn.publish::<_, _, ()>(channel, payload)
            .await
            .map_err(|e| bus_error(format!("publish to {channel} failed"), e))
    }

    async fn subscribe(&self, channel: &str) -> Result<EnvelopeStream, LivedeskError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| bus_error("failed to open redis pubsub connection", e))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| bus_error(format!("subscribe to {channel} failed"), e))?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(error = %e, "non-text payload on bus, dropped");
                    return None;
                }
            };
            match Envelope::from_json(&payload) {
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    tracing::warn!(error = %e, "malformed envelope on bus, dropped");
                    None
                }
            }
        });
        Ok(Box::pin(stream))
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> Result<(), LivedeskError> {
        let key = self.key(key);
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_ms);
        let mut conn = self.manager.clone();
        conn.zadd::<_, _, _, ()>(&key, member, expires_at)
            .await
            .map_err(|e| bus_error(format!("ZADD {key} failed"), e))?;
        let ttl_secs = i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX);
        conn.expire::<_, ()>(&key, ttl_secs)
            .await
            .map_err(|e| bus_error(format!("EXPIRE {key} failed"), e))
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), LivedeskError> {
        let key = self.key(key);
        let mut conn = self.manager.clone();
        conn.zrem::<_, _, ()>(&key, member)
            .await
            .map_err(|e| bus_error(format!("ZREM {key} failed"), e))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, LivedeskError> {
        let key = self.key(key);
        let now = Utc::now().timestamp_millis();
        let mut conn = self.manager.clone();
        conn.zrembyscore::<_, _, _, ()>(&key, "-inf", now)
            .await
            .map_err(|e| bus_error(format!("ZREMRANGEBYSCORE {key} failed"), e))?;
        conn.zrangebyscore::<_, _, _, Vec<String>>(&key, format!("({now}"), "+inf")
            .await
            .map_err(|e| bus_error(format!("ZRANGEBYSCORE {key} failed"), e))
    }

    async fn value_get(&self, key: &str) -> Result<Option<String>, LivedeskError> {
        let key = self.key(key);
        let mut conn = self.manager.clone();
        conn.get::<_, Option<String>>(&key)
            .await
            .map_err(|e| bus_error(format!("GET {key} failed"), e))
    }

    async fn value_set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LivedeskError> {
        let key = self.key(key);
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("SET")
            .arg(&key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| bus_error(format!("SET {key} failed"), e))?;
        Ok(())
    }

    async fn value_delete(&self, key: &str) -> Result<(), LivedeskError> {
        let key = self.key(key);
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(&key)
            .await
            .map_err(|e| bus_error(format!("DEL {key} failed"), e))
    }

    async fn health_check(&self) -> Result<HealthStatus, LivedeskError> {
        let mut conn = self.manager.clone();
        match conn.exists::<_, bool>(self.key("health")).await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!("redis unreachable: {e}"))),
        }
    }
}
