// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent chat history trait.

use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::error::LivedeskError;

/// Durable chat history, owned outside the broker. Called after publish,
/// off the socket's read path.
#[async_trait]
pub trait ChatStore: Send + Sync + 'static {
    async fn append_message(&self, session_id: &str, envelope: &Envelope)
    -> Result<(), LivedeskError>;
}
