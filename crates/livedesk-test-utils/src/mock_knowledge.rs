// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Knowledge source over a fixed corpus.
//!
//! Every search returns the same chunks regardless of the query, best score
//! first, so tests control exactly what the responder sees.

use std::sync::Mutex;

use async_trait::async_trait;

use livedesk_core::{ChunkKind, KnowledgeChunk, KnowledgeSource, LivedeskError};

#[derive(Default)]
pub struct StaticKnowledge {
    chunks: Vec<KnowledgeChunk>,
    queries: Mutex<Vec<String>>,
    failing: bool,
}

impl StaticKnowledge {
    pub fn new(chunks: Vec<KnowledgeChunk>) -> Self {
        Self {
            chunks,
            ..Self::default()
        }
    }

    /// A source whose every search fails.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Convenience for a single document chunk.
    pub fn chunk(content: &str, score: f64, title: &str) -> KnowledgeChunk {
        KnowledgeChunk {
            content: content.to_string(),
            score,
            source: format!("kb://{}", title.to_lowercase().replace(' ', "-")),
            title: Some(title.to_string()),
            kind: ChunkKind::Document,
        }
    }

    /// Queries received so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl KnowledgeSource for StaticKnowledge {
    async fn search(
        &self,
        _tenant_id: &str,
        _project_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<KnowledgeChunk>, LivedeskError> {
        self.queries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(query.to_string());
        if self.failing {
            return Err(LivedeskError::Knowledge {
                message: "knowledge base unavailable".into(),
                source: None,
            });
        }
        let mut hits = self.chunks.clone();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }
}
