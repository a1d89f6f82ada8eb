// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Livedesk chat broker.

use thiserror::Error;

/// The primary error type used across the bus, registry, pipeline and engines.
#[derive(Debug, Error)]
pub enum LivedeskError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Bus substrate errors (connection refused, publish failure, bad payload).
    #[error("bus error: {message}")]
    Bus {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A socket read or write failed. The connection is removed, never surfaced.
    #[error("transport error on {connection_id}: {message}")]
    Transport {
        connection_id: String,
        message: String,
    },

    /// Token missing, malformed, expired or signed with the wrong key.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Lookup by id found nothing.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The operation is valid but not for this caller or in this state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Knowledge lookup failed.
    #[error("knowledge error: {message}")]
    Knowledge {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
