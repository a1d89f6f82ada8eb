// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bus backends and the publish path shared by every producer.
//!
//! Two [`Bus`] implementations are provided:
//! - [`MemoryBus`]: process-local, also used to stand in for a shared
//!   substrate between several nodes inside one test process.
//! - [`RedisBus`]: routing sets as Redis sorted sets scored by expiry,
//!   envelopes over Redis pub/sub.

pub mod backoff;
pub mod memory;
pub mod publisher;
pub mod redis_bus;

use std::sync::Arc;

use livedesk_config::model::{BusBackend, BusConfig};
use livedesk_core::{Bus, LivedeskError};

pub use backoff::Backoff;
pub use memory::MemoryBus;
pub use publisher::Publisher;
pub use redis_bus::RedisBus;

/// Open the backend selected by configuration.
pub async fn connect(config: &BusConfig) -> Result<Arc<dyn Bus>, LivedeskError> {
    match config.backend {
        BusBackend::Memory => {
            tracing::info!("using in-memory bus");
            Ok(Arc::new(MemoryBus::new()))
        }
        BusBackend::Redis => {
            let url = config.redis_url.as_deref().ok_or_else(|| {
                LivedeskError::Config("bus.redis_url is required for the redis backend".into())
            })?;
            let bus = RedisBus::connect(url, &config.key_prefix).await?;
            tracing::info!(prefix = %config.key_prefix, "connected to redis bus");
            Ok(Arc::new(bus))
        }
    }
}
