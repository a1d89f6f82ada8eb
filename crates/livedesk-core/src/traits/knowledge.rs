// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Knowledge lookup trait.

use async_trait::async_trait;

use crate::error::LivedeskError;
use crate::types::KnowledgeChunk;

/// Semantic search over a project's knowledge base.
///
/// Implementations may hit a vector store or an embedding endpoint; the
/// pipeline wraps every call in a deadline.
#[async_trait]
pub trait KnowledgeSource: Send + Sync + 'static {
    /// Returns up to `top_k` chunks ordered by descending score.
    async fn search(
        &self,
        tenant_id: &str,
        project_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<KnowledgeChunk>, LivedeskError>;
}
