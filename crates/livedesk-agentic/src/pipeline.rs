// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The staged decision driver.
//!
//! Each stage is a classifier plus an action. Stages run in a fixed order
//! (greeting, knowledge answer, human handoff) and the first one that fires
//! decides the [`Outcome`]. The whole decision runs under the configured
//! response budget and a per-node concurrency cap; running out of either
//! yields [`Outcome::None`] so the message flows on unchanged.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use livedesk_config::model::{AgenticConfig, BrandConfig, KnowledgeConfig};
use livedesk_core::{KnowledgeSource, RequestType, Urgency};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::brand::BrandGreeter;
use crate::greeting::GreetingDetector;
use crate::handoff::AgentRequestDetector;
use crate::knowledge::{KnowledgeAnswer, KnowledgeResponder};
use crate::question::QuestionClassifier;
use crate::signal::Signal;

/// What the pipeline decided for one customer utterance.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// No automatic action; the message is only fanned out.
    None,
    Greeting { reply: String, signal: Signal },
    Knowledge { answer: KnowledgeAnswer, signal: Signal },
    Handoff {
        request_type: RequestType,
        urgency: Urgency,
        signal: Signal,
    },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::None => "none",
            Outcome::Greeting { .. } => "greeting",
            Outcome::Knowledge { .. } => "knowledge",
            Outcome::Handoff { .. } => "handoff",
        }
    }
}

/// A visitor chat message as seen by the pipeline.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub tenant_id: String,
    pub project_id: String,
    pub session_id: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

pub struct AgenticPipeline {
    config: AgenticConfig,
    greeting: GreetingDetector,
    questions: QuestionClassifier,
    knowledge: KnowledgeResponder,
    handoff: AgentRequestDetector,
    brand: BrandGreeter,
    permits: Semaphore,
    budget: Duration,
}

impl AgenticPipeline {
    pub fn new(
        config: &AgenticConfig,
        knowledge: &KnowledgeConfig,
        brands: BTreeMap<String, BrandConfig>,
        source: Arc<dyn KnowledgeSource>,
    ) -> Self {
        Self {
            greeting: GreetingDetector::new(&config.greeting_keywords, &config.negative_keywords),
            questions: QuestionClassifier::new(),
            knowledge: KnowledgeResponder::new(
                source,
                knowledge.max_results,
                knowledge.similarity_floor,
                Duration::from_millis(knowledge.search_timeout_ms),
            ),
            handoff: AgentRequestDetector::new(
                config.agent_request_threshold,
                &config.agent_request_keywords,
            ),
            brand: BrandGreeter::new(brands),
            permits: Semaphore::new(config.max_concurrent_sessions.max(1)),
            budget: Duration::from_millis(config.response_timeout_ms),
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &AgenticConfig {
        &self.config
    }

    /// Decide the outcome for one utterance within the response budget.
    pub async fn decide(&self, utterance: &Utterance) -> Outcome {
        if !self.config.enabled {
            return Outcome::None;
        }

        let started = Instant::now();
        let decision = tokio::time::timeout(self.budget, async {
            let _permit = self.permits.acquire().await.ok()?;
            Some(self.run_stages(utterance).await)
        })
        .await;

        let outcome = match decision {
            Ok(Some(outcome)) => outcome,
            Ok(None) => Outcome::None,
            Err(_) => {
                warn!(
                    session_id = %utterance.session_id,
                    budget_ms = self.budget.as_millis() as u64,
                    "pipeline budget exceeded, message passes through"
                );
                livedesk_prometheus::record_pipeline_outcome("timeout");
                return Outcome::None;
            }
        };

        livedesk_prometheus::record_pipeline_outcome(outcome.label());
        livedesk_prometheus::record_pipeline_latency(started.elapsed().as_secs_f64());
        debug!(
            session_id = %utterance.session_id,
            outcome = outcome.label(),
            "pipeline decision"
        );
        outcome
    }

    async fn run_stages(&self, u: &Utterance) -> Outcome {
        if let Some(outcome) = self.greeting_stage(u) {
            return outcome;
        }
        if let Some(outcome) = self.knowledge_stage(u).await {
            return outcome;
        }
        self.handoff_stage(u).unwrap_or(Outcome::None)
    }

    fn greeting_stage(&self, u: &Utterance) -> Option<Outcome> {
        if !self.config.greeting_detection {
            return None;
        }
        let result = self.greeting.detect(&u.text);
        (result.signal.score >= self.config.greeting_confidence).then(|| Outcome::Greeting {
            reply: self.brand.greeting(&u.project_id, u.received_at),
            signal: result.signal,
        })
    }

    async fn knowledge_stage(&self, u: &Utterance) -> Option<Outcome> {
        if !self.config.knowledge_responses {
            return None;
        }
        let analysis = self.questions.classify(&u.text);
        if !analysis.is_question
            || analysis.domain_relevance() < self.config.domain_relevance_confidence
        {
            return None;
        }

        let answer = match self
            .knowledge
            .answer(&u.tenant_id, &u.project_id, &u.text, &analysis)
            .await
        {
            Ok(answer) => answer?,
            Err(e) => {
                warn!(project_id = %u.project_id, error = %e, "knowledge lookup failed");
                return None;
            }
        };

        if !answer.is_confident() || answer.confidence < self.config.knowledge_confidence {
            debug!(
                quality = %answer.quality,
                confidence = answer.confidence,
                "knowledge answer not confident enough"
            );
            return None;
        }

        Some(Outcome::Knowledge {
            signal: analysis.signal(),
            answer,
        })
    }

    fn handoff_stage(&self, u: &Utterance) -> Option<Outcome> {
        if !self.config.agent_request_detection {
            return None;
        }
        let result = self.handoff.detect(&u.text);
        result.is_request.then_some(Outcome::Handoff {
            request_type: result.request_type,
            urgency: result.urgency,
            signal: result.signal,
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use livedesk_core::{ChunkKind, KnowledgeChunk, LivedeskError};

    use super::*;

    struct Corpus(Vec<KnowledgeChunk>);

    #[async_trait]
    impl KnowledgeSource for Corpus {
        async fn search(
            &self,
            _tenant_id: &str,
            _project_id: &str,
            _query: &str,
            _top_k: usize,
        ) -> Result<Vec<KnowledgeChunk>, LivedeskError> {
            Ok(self.0.clone())
        }
    }

    struct Stalled;

    #[async_trait]
    impl KnowledgeSource for Stalled {
        async fn search(
            &self,
            _tenant_id: &str,
            _project_id: &str,
            _query: &str,
            _top_k: usize,
        ) -> Result<Vec<KnowledgeChunk>, LivedeskError> {
            std::future::pending().await
        }
    }

    struct Failing;

    #[async_trait]
    impl KnowledgeSource for Failing {
        async fn search(
            &self,
            _tenant_id: &str,
            _project_id: &str,
            _query: &str,
            _top_k: usize,
        ) -> Result<Vec<KnowledgeChunk>, LivedeskError> {
            Err(LivedeskError::Knowledge {
                message: "index offline".into(),
                source: None,
            })
        }
    }

    fn hours() -> Vec<KnowledgeChunk> {
        vec![KnowledgeChunk {
            content: "Our business hours are 9am to 5pm, Monday to Friday.".into(),
            score: 0.82,
            source: "faq".into(),
            title: Some("FAQ".into()),
            kind: ChunkKind::Document,
        }]
    }

    fn pipeline_with(config: AgenticConfig, source: impl KnowledgeSource) -> AgenticPipeline {
        let mut brands = BTreeMap::new();
        brands.insert(
            "p1".to_string(),
            BrandConfig {
                company_name: Some("Globex".into()),
                ..BrandConfig::default()
            },
        );
        AgenticPipeline::new(&config, &KnowledgeConfig::default(), brands, Arc::new(source))
    }

    fn pipeline(source: impl KnowledgeSource) -> AgenticPipeline {
        pipeline_with(AgenticConfig::default(), source)
    }

    fn say(text: &str) -> Utterance {
        Utterance {
            tenant_id: "t1".into(),
            project_id: "p1".into(),
            session_id: "s1".into(),
            text: text.into(),
            received_at: "2026-03-01T09:30:00Z".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn greeting_gets_branded_reply() {
        match pipeline(Corpus(hours())).decide(&say("hello there!")).await {
            Outcome::Greeting { reply, signal } => {
                assert_eq!(reply, "Good morning! Welcome to Globex. How can we assist you today?");
                assert!(signal.score >= 0.9);
            }
            other => panic!("expected greeting, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn question_gets_knowledge_answer() {
        match pipeline(Corpus(hours())).decide(&say("what are your business hours?")).await {
            Outcome::Knowledge { answer, signal } => {
                assert!(answer.text.contains("9am to 5pm"));
                assert_eq!(answer.citations, vec!["Document: FAQ"]);
                assert!(signal.score >= 0.6);
            }
            other => panic!("expected knowledge, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn explicit_request_gets_handoff() {
        let outcome = pipeline(Corpus(hours()))
            .decide(&say("I need to speak to a human agent, this is urgent!"))
            .await;
        match outcome {
            Outcome::Handoff { request_type, urgency, signal } => {
                assert_eq!(request_type, RequestType::Urgent);
                assert_eq!(urgency, Urgency::High);
                assert!(signal.score > 0.9);
            }
            other => panic!("expected handoff, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn small_talk_passes_through() {
        let outcome = pipeline(Corpus(hours())).decide(&say("ok thanks, will check later")).await;
        assert!(matches!(outcome, Outcome::None));
    }

    #[tokio::test]
    async fn empty_corpus_falls_through_to_handoff_stage() {
        let outcome = pipeline(Corpus(Vec::new())).decide(&say("what are your business hours?")).await;
        assert!(matches!(outcome, Outcome::None));
    }

    #[tokio::test]
    async fn knowledge_failure_is_not_fatal() {
        let outcome = pipeline(Failing)
            .decide(&say("can I talk to a real person about my invoice?"))
            .await;
        assert!(matches!(outcome, Outcome::Handoff { .. }));
    }

    #[tokio::test]
    async fn disabled_stages_are_skipped() {
        let config = AgenticConfig {
            greeting_detection: false,
            ..AgenticConfig::default()
        };
        let outcome = pipeline_with(config, Corpus(hours())).decide(&say("hello there!")).await;
        assert!(matches!(outcome, Outcome::None));

        let config = AgenticConfig {
            enabled: false,
            ..AgenticConfig::default()
        };
        let outcome = pipeline_with(config, Corpus(hours()))
            .decide(&say("I need to speak to a human agent"))
            .await;
        assert!(matches!(outcome, Outcome::None));
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_yields_none() {
        let config = AgenticConfig {
            response_timeout_ms: 100,
            ..AgenticConfig::default()
        };
        let mut knowledge = KnowledgeConfig::default();
        knowledge.search_timeout_ms = 60_000;
        let p = AgenticPipeline::new(&config, &knowledge, BTreeMap::new(), Arc::new(Stalled));
        let outcome = p.decide(&say("what are your business hours?")).await;
        assert!(matches!(outcome, Outcome::None));
    }

    #[tokio::test]
    async fn same_input_same_outcome() {
        let p = pipeline(Corpus(hours()));
        for text in ["hello there!", "what are your business hours?", "operator please"] {
            let a = p.decide(&say(text)).await.label();
            let b = p.decide(&say(text)).await.label();
            assert_eq!(a, b, "{text}");
        }
    }
}
