// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared key/value + pub/sub substrate trait.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;

use crate::envelope::Envelope;
use crate::error::LivedeskError;
use crate::types::HealthStatus;

/// Stream of envelopes received from a bus subscription. Ends when the
/// underlying subscription is lost; callers resubscribe.
pub type EnvelopeStream = Pin<Box<dyn Stream<Item = Envelope> + Send>>;

/// Typed wrapper over the cross-node substrate: routing sets, expiring
/// values and channel publish. Every node in a cluster holds a handle to the same substrate.
#[async_trait]
pub trait Bus: Send + Sync + 'static {
    /// Returns the backend name (`memory`, `redis`).
    fn name(&self) -> &str;

    /// Publish an envelope to every subscriber of `channel`, including this node.
    async fn publish(&self, channel: &str, envelope: &Envelope) -> Result<(), LivedeskError>;

    /// Open a subscription on `channel`.
    async fn subscribe(&self, channel: &str) -> Result<EnvelopeStream, LivedeskError>;

    /// Add `member` to the set at `key`, refreshing its time-to-live.
    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> Result<(), LivedeskError>;

    /// Remove `member` from the set at `key`. Removing an absent member is not an error.
    async fn set_remove(&self, key: &str, member: &str) -> Result<(), LivedeskError>;

    /// Live members of the set at `key`. Expired members are never returned.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, LivedeskError>;

    /// The value at `key`, if set and not expired.
    async fn value_get(&self, key: &str) -> Result<Option<String>, LivedeskError>;

    /// Store `value` at `key`, replacing any previous value. It expires after `ttl`.
    async fn value_set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LivedeskError>;

    /// Delete the value at `key`. Deleting an absent key is not an error.
    async fn value_delete(&self, key: &str) -> Result<(), LivedeskError>;

    /// Performs a health check against the substrate.
    async fn health_check(&self) -> Result<HealthStatus, LivedeskError>;
}
