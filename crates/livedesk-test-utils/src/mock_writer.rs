// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock socket write half for deterministic testing.
//!
//! Clones share one frame log, so a test keeps a handle while the registry
//! owns the boxed writer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use livedesk_core::{Envelope, EnvelopeType, LivedeskError};
use livedesk_fanout::{Frame, FrameWriter};

#[derive(Default)]
struct Shared {
    frames: Mutex<Vec<Frame>>,
    notify: Notify,
    failing: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MockWriter {
    shared: Arc<Shared>,
}

impl MockWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Boxed clone for [`ConnectionRegistry::register`](livedesk_fanout::ConnectionRegistry::register).
    pub fn boxed(&self) -> Box<dyn FrameWriter> {
        Box::new(self.clone())
    }

    /// Make every following write fail, as a broken socket would.
    pub fn fail_writes(&self, failing: bool) {
        self.shared.failing.store(failing, Ordering::SeqCst);
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.lock().clone()
    }

    /// Text frames decoded as envelopes.
    pub fn envelopes(&self) -> Vec<Envelope> {
        self.lock()
            .iter()
            .filter_map(|f| match f {
                Frame::Text(text) => Envelope::from_json(text).ok(),
                _ => None,
            })
            .collect()
    }

    pub fn of_kind(&self, kind: EnvelopeType) -> Vec<Envelope> {
        self.envelopes()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Waits until `pred` holds for the captured envelopes. Returns `false`
    /// on timeout.
    pub async fn wait_for(&self, timeout: Duration, pred: impl Fn(&[Envelope]) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.shared.notify.notified();
            if pred(&self.envelopes()) {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return pred(&self.envelopes());
            }
        }
    }

    /// Waits for at least one envelope of `kind` and returns the first.
    pub async fn expect(&self, kind: EnvelopeType, timeout: Duration) -> Option<Envelope> {
        if self
            .wait_for(timeout, |envs| envs.iter().any(|e| e.kind == kind))
            .await
        {
            self.of_kind(kind).into_iter().next()
        } else {
            None
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Frame>> {
        self.shared
            .frames
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl FrameWriter for MockWriter {
    async fn write(&mut self, frame: Frame) -> Result<(), LivedeskError> {
        if self.shared.failing.load(Ordering::SeqCst) {
            return Err(LivedeskError::Transport {
                connection_id: "mock".into(),
                message: "broken pipe".into(),
            });
        }
        self.lock().push(frame);
        self.shared.notify.notify_waiters();
        Ok(())
    }
}
