// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits the broker is written against.
//!
//! All traits use `#[async_trait]` for dynamic dispatch compatibility and
//! are held as `Arc<dyn Trait>` by the components that consume them.

pub mod bus;
pub mod chat_store;
pub mod knowledge;
pub mod presence;

pub use bus::{Bus, EnvelopeStream};
pub use chat_store::ChatStore;
pub use knowledge::KnowledgeSource;
pub use presence::PresenceStore;
