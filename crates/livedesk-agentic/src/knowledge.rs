// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Knowledge-grounded answers.
//!
//! Builds a search query from the question analysis, pulls chunks from the
//! project's [`KnowledgeSource`] under a deadline and synthesizes a reply
//! from the best supporting chunks. Synthesis is pure so the same chunks
//! always produce the same answer.

use std::sync::Arc;
use std::time::Duration;

use livedesk_core::{ChunkKind, KnowledgeChunk, KnowledgeSource, LivedeskError};
use serde::Serialize;
use strum::Display;
use tracing::debug;

use crate::question::{Domain, QuestionAnalysis, QuestionType};

/// Chunks at or above this score support an answer.
const RELEVANT_SCORE: f64 = 0.7;
const MAX_CITATIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AnswerQuality {
    Poor,
    Adequate,
    Good,
    Excellent,
}

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeAnswer {
    pub text: String,
    pub confidence: f64,
    pub quality: AnswerQuality,
    pub citations: Vec<String>,
    pub top_score: f64,
    pub chunks_used: usize,
    pub query: String,
}

impl KnowledgeAnswer {
    /// Good enough to send to a customer without a human.
    pub fn is_confident(&self) -> bool {
        self.quality >= AnswerQuality::Good
    }
}

pub struct KnowledgeResponder {
    source: Arc<dyn KnowledgeSource>,
    max_results: usize,
    similarity_floor: f64,
    search_timeout: Duration,
}

impl KnowledgeResponder {
    pub fn new(
        source: Arc<dyn KnowledgeSource>,
        max_results: usize,
        similarity_floor: f64,
        search_timeout: Duration,
    ) -> Self {
        Self {
            source,
            max_results,
            similarity_floor,
            search_timeout,
        }
    }

    /// Searches the project's knowledge base and synthesizes an answer.
    ///
    /// Returns `Ok(None)` when nothing clears the similarity floor or no chunk
    /// is strong enough to answer from.
    pub async fn answer(
        &self,
        tenant_id: &str,
        project_id: &str,
        question: &str,
        analysis: &QuestionAnalysis,
    ) -> Result<Option<KnowledgeAnswer>, LivedeskError> {
        let query = build_query(analysis);
        if query.is_empty() {
            return Ok(None);
        }

        let search = self
            .source
            .search(tenant_id, project_id, &query, self.max_results);
        let chunks = tokio::time::timeout(self.search_timeout, search)
            .await
            .map_err(|_| LivedeskError::Timeout {
                duration: self.search_timeout,
            })??;

        let floor = self.similarity_floor;
        let chunks: Vec<KnowledgeChunk> =
            chunks.into_iter().filter(|c| c.score >= floor).collect();
        debug!(project_id, query = %query, hits = chunks.len(), "knowledge search");

        Ok(synthesize(question, analysis, &query, chunks))
    }
}

/// Keywords plus domain and question-type context terms.
pub fn build_query(analysis: &QuestionAnalysis) -> String {
    let mut query = analysis.keywords.join(" ");
    let has = |q: &str, a: &str, b: &str| q.contains(a) || q.contains(b);

    let domain_terms = match analysis.domain {
        Domain::Technical if !has(&query, "api", "technical") => Some("technical integration"),
        Domain::Pricing if !has(&query, "price", "cost") => Some("pricing cost"),
        Domain::Account if !has(&query, "account", "user") => Some("account user"),
        Domain::Billing if !has(&query, "billing", "payment") => Some("billing payment"),
        _ => None,
    };
    let type_terms = match analysis.question_type {
        QuestionType::HowTo => Some("guide tutorial steps"),
        QuestionType::Troubleshooting => Some("troubleshoot fix solution"),
        QuestionType::WhatIs => Some("overview explanation"),
        _ => None,
    };
    for terms in [domain_terms, type_terms].into_iter().flatten() {
        query.push(' ');
        query.push_str(terms);
    }
    query.trim().to_string()
}

/// Turns search hits into an answer. `None` when no chunk is relevant.
pub fn synthesize(
    question: &str,
    analysis: &QuestionAnalysis,
    query: &str,
    mut chunks: Vec<KnowledgeChunk>,
) -> Option<KnowledgeAnswer> {
    chunks.sort_by(|a, b| b.score.total_cmp(&a.score));
    let top_score = chunks.first().map_or(0.0, |c| c.score);
    let relevant: Vec<&KnowledgeChunk> =
        chunks.iter().filter(|c| c.score >= RELEVANT_SCORE).collect();
    let primary = relevant.first()?;

    let confidence =
        f64::min(primary.score + 0.1 * (relevant.len() - 1) as f64, 1.0);
    let text = with_lead_in(question, analysis.question_type, &primary.content);

    Some(KnowledgeAnswer {
        text,
        confidence,
        quality: assess_quality(confidence, relevant.len(), top_score),
        citations: citations(&relevant),
        top_score,
        chunks_used: relevant.len(),
        query: query.to_string(),
    })
}

fn with_lead_in(question: &str, kind: QuestionType, content: &str) -> String {
    let lower = content.to_lowercase();
    match kind {
        QuestionType::HowTo if !lower.contains("step") && !lower.contains("follow") => {
            match question.trim().split_once(' ') {
                Some((_, rest)) => {
                    let rest = rest.trim_end_matches(['?', '.', '!', ' ']).to_lowercase();
                    format!("Here's how to {rest}:\n\n{content}")
                }
                None => content.to_string(),
            }
        }
        QuestionType::Troubleshooting if !lower.contains("solution") && !lower.contains("fix") => {
            format!("To resolve this issue:\n\n{content}")
        }
        _ => content.to_string(),
    }
}

fn assess_quality(confidence: f64, chunk_count: usize, top_score: f64) -> AnswerQuality {
    if confidence >= 0.9 && chunk_count >= 2 && top_score >= 0.9 {
        AnswerQuality::Excellent
    } else if confidence >= 0.8 && top_score >= 0.8 {
        AnswerQuality::Good
    } else if confidence >= 0.7 {
        AnswerQuality::Adequate
    } else {
        AnswerQuality::Poor
    }
}

fn citations(chunks: &[&KnowledgeChunk]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for chunk in chunks {
        let citation = match (&chunk.kind, &chunk.title) {
            (ChunkKind::Document, Some(title)) => format!("Document: {title}"),
            (ChunkKind::Webpage, Some(title)) if !chunk.source.is_empty() => {
                format!("Page: {title} ({})", chunk.source)
            }
            (ChunkKind::Webpage, Some(title)) => format!("Page: {title}"),
            _ => format!("Source: {}", chunk.source),
        };
        if !out.contains(&citation) {
            out.push(citation);
        }
        if out.len() == MAX_CITATIONS {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::question::QuestionClassifier;

    fn chunk(content: &str, score: f64) -> KnowledgeChunk {
        KnowledgeChunk {
            content: content.to_string(),
            score,
            source: "kb".to_string(),
            title: None,
            kind: ChunkKind::Other,
        }
    }

    fn doc(title: &str, score: f64) -> KnowledgeChunk {
        KnowledgeChunk {
            title: Some(title.to_string()),
            kind: ChunkKind::Document,
            ..chunk(title, score)
        }
    }

    struct Fixed(Vec<KnowledgeChunk>);

    #[async_trait]
    impl KnowledgeSource for Fixed {
        async fn search(
            &self,
            _tenant_id: &str,
            _project_id: &str,
            _query: &str,
            top_k: usize,
        ) -> Result<Vec<KnowledgeChunk>, LivedeskError> {
            Ok(self.0.iter().take(top_k).cloned().collect())
        }
    }

    struct Slow;

    #[async_trait]
    impl KnowledgeSource for Slow {
        async fn search(
            &self,
            _tenant_id: &str,
            _project_id: &str,
            _query: &str,
            _top_k: usize,
        ) -> Result<Vec<KnowledgeChunk>, LivedeskError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    fn responder(source: impl KnowledgeSource) -> KnowledgeResponder {
        KnowledgeResponder::new(Arc::new(source), 10, 0.6, Duration::from_secs(2))
    }

    #[tokio::test]
    async fn single_strong_chunk_is_a_good_answer() {
        let q = "what are your business hours?";
        let analysis = QuestionClassifier::new().classify(q);
        let answer = responder(Fixed(vec![chunk("We are open 9 to 5, Monday to Friday.", 0.82)]))
            .answer("t", "p", q, &analysis)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(answer.text, "We are open 9 to 5, Monday to Friday.");
        assert_eq!(answer.quality, AnswerQuality::Good);
        assert!(answer.is_confident());
        assert_eq!(answer.citations, vec!["Source: kb"]);
        assert!(answer.query.ends_with("overview explanation"));
    }

    #[tokio::test]
    async fn chunks_below_floor_yield_nothing() {
        let q = "what are your business hours?";
        let analysis = QuestionClassifier::new().classify(q);
        let answer = responder(Fixed(vec![chunk("unrelated", 0.5)]))
            .answer("t", "p", q, &analysis)
            .await
            .unwrap();
        assert!(answer.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_search_times_out() {
        let q = "what are your business hours?";
        let analysis = QuestionClassifier::new().classify(q);
        let err = responder(Slow).answer("t", "p", q, &analysis).await.unwrap_err();
        assert!(matches!(err, LivedeskError::Timeout { .. }));
    }

    #[test]
    fn supporting_chunks_raise_confidence() {
        let analysis = QuestionClassifier::new().classify("what is the enterprise plan?");
        let answer = synthesize(
            "what is the enterprise plan?",
            &analysis,
            "q",
            vec![doc("Plans", 0.75), doc("Enterprise", 0.92), doc("Plans", 0.8)],
        )
        .unwrap();
        assert_eq!(answer.text, "Enterprise");
        assert!((answer.confidence - 1.0).abs() < 1e-9);
        assert_eq!(answer.quality, AnswerQuality::Excellent);
        assert_eq!(answer.citations, vec!["Document: Enterprise", "Document: Plans"]);
    }

    #[test]
    fn moderate_chunk_is_only_adequate() {
        let analysis = QuestionClassifier::new().classify("what is sso?");
        let answer = synthesize("what is sso?", &analysis, "q", vec![chunk("SSO", 0.72)]).unwrap();
        assert_eq!(answer.quality, AnswerQuality::Adequate);
        assert!(!answer.is_confident());
    }

    #[test]
    fn how_to_and_troubleshooting_lead_ins() {
        let how = QuestionClassifier::new().classify("How do I export my data?");
        let answer = synthesize("How do I export my data?", &how, "q", vec![chunk("Open settings.", 0.9)]).unwrap();
        assert_eq!(answer.text, "Here's how to do i export my data:\n\nOpen settings.");

        let broken = QuestionClassifier::new().classify("why is sync not working?");
        let answer = synthesize("why is sync not working?", &broken, "q", vec![chunk("Re-login.", 0.9)]).unwrap();
        assert_eq!(answer.text, "To resolve this issue:\n\nRe-login.");
    }

    #[test]
    fn webpage_citations_include_source() {
        let page = KnowledgeChunk {
            title: Some("Pricing".into()),
            kind: ChunkKind::Webpage,
            source: "https://example.com/pricing".into(),
            ..chunk("x", 0.9)
        };
        assert_eq!(
            citations(&[&page]),
            vec!["Page: Pricing (https://example.com/pricing)"]
        );
    }

    #[test]
    fn query_adds_domain_and_type_terms() {
        let analysis = QuestionClassifier::new().classify("how do I change my billing invoice?");
        let query = build_query(&analysis);
        assert!(query.starts_with("how change billing invoice"));
        assert!(!query.contains("billing payment"));
        assert!(query.ends_with("guide tutorial steps"));
    }
}
