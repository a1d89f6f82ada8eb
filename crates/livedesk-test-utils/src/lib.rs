// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Livedesk integration tests.
//!
//! Provides mock collaborators and a node harness for fast, deterministic,
//! CI-runnable tests without Redis or real sockets.
//!
//! # Components
//!
//! - [`MockWriter`] - socket write half that captures frames
//! - [`StaticKnowledge`] - knowledge source over a fixed corpus
//! - [`RecordingChatStore`] - chat store that remembers appends
//! - [`TestNode`] - a full node wired to a shared in-memory bus

pub mod harness;
pub mod mock_knowledge;
pub mod mock_writer;
pub mod recording_store;

pub use harness::{PROJECT, TENANT, TestNode, TestNodeBuilder};
pub use mock_knowledge::StaticKnowledge;
pub use mock_writer::MockWriter;
pub use recording_store::RecordingChatStore;
