// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport seam between the registry and a concrete socket.

use async_trait::async_trait;

use livedesk_core::LivedeskError;

/// One outbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping,
    Close,
}

/// Write half of a socket. Implementations are driven by exactly one
/// writer at a time; the registry guarantees it.
#[async_trait]
pub trait FrameWriter: Send + 'static {
    async fn write(&mut self, frame: Frame) -> Result<(), LivedeskError>;
}
