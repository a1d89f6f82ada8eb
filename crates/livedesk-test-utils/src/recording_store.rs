// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat store that keeps every appended message in memory.

use std::sync::Mutex;

use async_trait::async_trait;

use livedesk_core::{ChatStore, Envelope, LivedeskError};

#[derive(Default)]
pub struct RecordingChatStore {
    messages: Mutex<Vec<(String, Envelope)>>,
}

impl RecordingChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(session_id, envelope)` pairs in append order.
    pub fn messages(&self) -> Vec<(String, Envelope)> {
        self.messages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn for_session(&self, session_id: &str) -> Vec<Envelope> {
        self.messages()
            .into_iter()
            .filter(|(s, _)| s == session_id)
            .map(|(_, e)| e)
            .collect()
    }
}

#[async_trait]
impl ChatStore for RecordingChatStore {
    async fn append_message(
        &self,
        session_id: &str,
        envelope: &Envelope,
    ) -> Result<(), LivedeskError> {
        self.messages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((session_id.to_string(), envelope.clone()));
        Ok(())
    }
}
