// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Automatic-response pipeline for visitor chat messages.
//!
//! Every visitor `chat` message is classified before it is fanned out. The
//! pipeline either greets the visitor with the project's branded greeting,
//! answers from the project's knowledge base, asks for a human (which the
//! assignment engine turns into an offer), or does nothing.
//!
//! # Components
//!
//! - [`GreetingDetector`]: keyword-weighted greeting score
//! - [`QuestionClassifier`]: question type, intent, domain and relevance
//! - [`KnowledgeResponder`]: search plus answer synthesis with citations
//! - [`AgentRequestDetector`]: regex-weighted human-handoff score
//! - [`BrandGreeter`]: per-project greeting templates
//! - [`AgenticPipeline`]: the staged driver returning an [`Outcome`]

pub mod brand;
pub mod greeting;
pub mod handoff;
pub mod knowledge;
pub mod pipeline;
pub mod question;
pub mod signal;
pub mod text;

pub use brand::BrandGreeter;
pub use greeting::{GreetingDetector, GreetingKind, GreetingResult};
pub use handoff::{AgentRequestDetector, HandoffResult};
pub use knowledge::{AnswerQuality, KnowledgeAnswer, KnowledgeResponder};
pub use pipeline::{AgenticPipeline, Outcome, Utterance};
pub use question::{QuestionAnalysis, QuestionClassifier};
pub use signal::Signal;
