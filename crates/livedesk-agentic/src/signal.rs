// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::Serialize;

/// What every classifier reports: a score in `[0, 1]`, human-readable
/// reasons and the keywords that drove the score.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Signal {
    pub score: f64,
    pub reasons: Vec<String>,
    pub keywords: Vec<String>,
}

impl Signal {
    /// A signal with the score forced to zero, for disabled stages.
    pub fn disabled(stage: &str) -> Self {
        Self {
            score: 0.0,
            reasons: vec![format!("{stage} disabled")],
            keywords: Vec::new(),
        }
    }

    pub fn clamp(mut self) -> Self {
        self.score = self.score.clamp(0.0, 1.0);
        self
    }
}
