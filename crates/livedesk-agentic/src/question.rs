// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Question classification.
//!
//! Decides whether an utterance is a question, what kind, which product
//! domain it touches and how confident that reading is. The confidence,
//! zeroed for off-topic questions, is the domain-relevance score the
//! pipeline gates knowledge answers on.

use strum::Display;

use crate::signal::Signal;
use crate::text::{any_phrase, count_phrases, normalize};

const QUESTION_STARTERS: &[&str] = &[
    "what", "how", "why", "when", "where", "who", "which", "can", "could", "would", "should",
    "is", "are", "do", "does", "did", "will", "won't", "help", "explain", "tell", "show",
];

const QUESTION_PHRASES: &[&str] = &[
    "can you", "could you", "would you", "will you", "how do", "how to", "what is", "what are",
    "where is", "when is", "why is", "who is", "tell me", "show me", "explain", "help me",
];

const TYPE_KEYWORDS: &[(QuestionType, &[&str])] = &[
    (
        QuestionType::HowTo,
        &[
            "how to", "how do", "how can", "how should", "steps", "guide", "tutorial",
            "instructions", "process", "procedure", "way to",
        ],
    ),
    (
        QuestionType::WhatIs,
        &[
            "what is", "what are", "what does", "define", "definition", "meaning", "explain",
            "describe", "tell me about",
        ],
    ),
    (
        QuestionType::Troubleshooting,
        &[
            "problem", "issue", "error", "bug", "broken", "not working", "fix", "solve",
            "troubleshoot", "help", "wrong", "failed", "doesn't work", "can't", "unable",
            "trouble",
        ],
    ),
    (
        QuestionType::Pricing,
        &[
            "price", "cost", "pricing", "fee", "charge", "payment", "plan", "subscription",
            "how much", "expensive", "cheap", "discount",
        ],
    ),
    (
        QuestionType::Request,
        &[
            "please", "can you", "could you", "would you", "i need", "i want", "i would like",
            "help me", "assist", "support", "do this",
        ],
    ),
];

const ACTION_PATTERNS: &[&str] = &[
    "please", "can you", "could you", "would you", "help me", "i need", "i want",
    "i would like", "assist", "do this", "create", "make", "setup", "configure", "fix", "solve",
];

const COMPLAINT_PATTERNS: &[&str] = &[
    "problem", "issue", "broken", "not working", "doesn't work", "frustrated", "angry",
    "disappointed", "terrible", "awful",
];

/// Domains in tie-break order.
const DOMAIN_KEYWORDS: &[(Domain, &[&str])] = &[
    (
        Domain::Technical,
        &[
            "api", "code", "programming", "technical", "development", "integration", "database",
            "server", "error", "bug", "configuration", "setup", "install", "deployment",
            "authentication", "security",
        ],
    ),
    (
        Domain::Pricing,
        &[
            "price", "cost", "pricing", "plan", "subscription", "billing", "payment", "fee",
            "charge", "discount", "upgrade", "downgrade",
        ],
    ),
    (
        Domain::Support,
        &[
            "help", "support", "assistance", "problem", "issue", "question", "contact", "service",
            "customer", "agent", "representative",
        ],
    ),
    (
        Domain::Product,
        &[
            "product", "feature", "functionality", "capability", "service", "tool", "platform",
            "application", "software", "system",
        ],
    ),
    (
        Domain::Billing,
        &[
            "bill", "billing", "invoice", "payment", "charge", "subscription", "refund", "credit",
            "debit", "account", "transaction",
        ],
    ),
    (
        Domain::Account,
        &[
            "account", "profile", "login", "password", "username", "email", "settings",
            "preferences", "access", "permissions", "user",
        ],
    ),
];

const COMPLEX_INDICATORS: &[&str] = &[
    "integration", "configuration", "troubleshoot", "multiple", "complex", "advanced",
    "enterprise", "custom", "api", "development",
];

const SIMPLE_INDICATORS: &[&str] = &["what is", "how much", "when", "where", "who", "yes", "no"];

/// Topics no knowledge base of ours covers.
const OUT_OF_DOMAIN: &[&str] = &[
    "weather", "sports", "politics", "news", "cooking", "recipes", "travel", "entertainment",
    "movies", "music", "celebrities", "personal", "relationship", "health", "medical", "legal",
    "homework", "assignment", "school", "university",
];

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "is", "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did", "will",
    "would", "could", "should", "can", "i", "you", "he", "she", "it", "we", "they", "this",
    "that", "these", "those", "my", "your", "his", "her", "its", "our", "their",
];

const MAX_KEYWORDS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum QuestionType {
    HowTo,
    WhatIs,
    Troubleshooting,
    Pricing,
    Request,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Intent {
    SeekingInfo,
    RequestingAction,
    Complaint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Domain {
    Technical,
    Pricing,
    Support,
    Product,
    Billing,
    Account,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

/// Everything the classifier learned about one utterance.
#[derive(Debug, Clone)]
pub struct QuestionAnalysis {
    pub is_question: bool,
    pub question_type: QuestionType,
    pub intent: Intent,
    pub domain: Domain,
    pub complexity: Complexity,
    pub keywords: Vec<String>,
    pub confidence: f64,
    pub out_of_domain: bool,
}

impl QuestionAnalysis {
    /// Confidence that this is an on-topic question; zero when off-topic.
    pub fn domain_relevance(&self) -> f64 {
        if self.out_of_domain || !self.is_question {
            0.0
        } else {
            self.confidence
        }
    }

    pub fn signal(&self) -> Signal {
        let mut reasons = vec![format!(
            "type {}, intent {}, domain {}, complexity {}",
            self.question_type, self.intent, self.domain, self.complexity
        )];
        if !self.is_question {
            reasons.insert(0, "not a question".into());
        }
        if self.out_of_domain {
            reasons.push("outside the product domain".into());
        }
        Signal {
            score: self.domain_relevance(),
            reasons,
            keywords: self.keywords.clone(),
        }
    }
}

/// Rule-based question classifier.
#[derive(Debug, Default)]
pub struct QuestionClassifier;

impl QuestionClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, message: &str) -> QuestionAnalysis {
        let text = normalize(message);
        let words: Vec<&str> = text.split_whitespace().collect();
        let keywords = extract_keywords(&words);

        let is_question = message.contains('?')
            || words.first().is_some_and(|w| QUESTION_STARTERS.contains(w))
            || any_phrase(&text, QUESTION_PHRASES);

        let question_type = TYPE_KEYWORDS
            .iter()
            .find(|(_, kws)| any_phrase(&text, kws))
            .map_or(QuestionType::General, |(t, _)| *t);

        let intent = if any_phrase(&text, ACTION_PATTERNS) {
            Intent::RequestingAction
        } else if any_phrase(&text, COMPLAINT_PATTERNS) {
            Intent::Complaint
        } else {
            Intent::SeekingInfo
        };

        let domain = detect_domain(&text);
        let complexity = assess_complexity(&text, words.len());

        if !is_question {
            return QuestionAnalysis {
                is_question,
                question_type,
                intent,
                domain,
                complexity,
                keywords,
                confidence: 0.1,
                out_of_domain: false,
            };
        }

        let mut confidence = 0.3;
        if message.contains('?') {
            confidence += 0.2;
        }
        if question_type != QuestionType::General {
            confidence += 0.2;
        }
        if domain != Domain::General {
            confidence += 0.15;
        }
        if matches!(intent, Intent::SeekingInfo | Intent::RequestingAction) {
            confidence += 0.1;
        }
        if words.len() < 3 {
            confidence -= 0.2;
        }
        let confidence = f64::clamp(confidence, 0.0, 1.0);

        let out_of_domain = any_phrase(&text, OUT_OF_DOMAIN)
            || (domain == Domain::General && confidence < 0.5 && keywords.len() < 2);

        QuestionAnalysis {
            is_question,
            question_type,
            intent,
            domain,
            complexity,
            keywords,
            confidence,
            out_of_domain,
        }
    }
}

/// Domain with the most keyword hits; ties keep declaration order.
fn detect_domain(text: &str) -> Domain {
    let mut best = (Domain::General, 0);
    for (domain, kws) in DOMAIN_KEYWORDS {
        let hits = count_phrases(text, kws);
        if hits > best.1 {
            best = (*domain, hits);
        }
    }
    best.0
}

fn assess_complexity(text: &str, word_count: usize) -> Complexity {
    if any_phrase(text, COMPLEX_INDICATORS) {
        Complexity::Complex
    } else if any_phrase(text, SIMPLE_INDICATORS) {
        Complexity::Simple
    } else if word_count < 5 {
        Complexity::Simple
    } else if word_count > 15 {
        Complexity::Complex
    } else {
        Complexity::Moderate
    }
}

fn extract_keywords(words: &[&str]) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for word in words {
        let word = word.trim_matches(|c: char| ".,!?;:".contains(c));
        if word.chars().count() < 3 || STOP_WORDS.contains(&word) {
            continue;
        }
        if !keywords.iter().any(|k| k == word) {
            keywords.push(word.to_string());
        }
        if keywords.len() == MAX_KEYWORDS {
            break;
        }
    }
    keywords
}
