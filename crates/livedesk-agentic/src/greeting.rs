// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Greeting detection.
//!
//! Scores how much of an utterance is "just saying hello". Short messages
//! that open with a greeting score high; questions and support vocabulary
//! pull the score down so "hi, my invoice is wrong" is not answered with a
//! welcome message.

use strum::Display;

use crate::signal::Signal;
use crate::text::{contains_phrase, normalize};

/// Greeting vocabulary used when configuration supplies none.
pub const DEFAULT_GREETING_KEYWORDS: &[&str] = &[
    "hello", "hi", "hey", "greetings", "good morning", "good afternoon", "good evening",
    "howdy", "hiya", "welcome", "salutations", "helo", "hallo", "helllo", "heyyy", "hii",
    "hiiii", "hola", "bonjour", "guten tag", "ciao", "konnichiwa", "namaste", "yo", "sup",
    "what's up", "whats up", "wassup",
];

/// Support vocabulary that marks a message as more than a greeting.
pub const DEFAULT_NEGATIVE_KEYWORDS: &[&str] = &[
    "help", "support", "problem", "issue", "error", "bug", "question", "pricing", "cost",
    "payment", "refund", "return", "policy", "technical", "api", "integration", "setup",
    "configuration", "account", "login", "password", "billing", "invoice",
];

const QUESTION_WORDS: &[&str] = &[
    "what", "how", "when", "where", "why", "who", "can", "could", "would", "should",
];

/// Shape of a greeting message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum GreetingKind {
    /// "hi", "good morning!"
    SimpleGreeting,
    /// "hey, how does billing work?"
    QuestionGreeting,
    /// No greeting, or a greeting buried in a longer message.
    Complex,
}

#[derive(Debug, Clone)]
pub struct GreetingResult {
    pub signal: Signal,
    pub kind: GreetingKind,
}

/// Keyword-weighted greeting classifier.
pub struct GreetingDetector {
    keywords: Vec<String>,
    negative: Vec<String>,
}

impl GreetingDetector {
    /// Empty lists fall back to the built-in vocabularies.
    pub fn new(keywords: &[String], negative: &[String]) -> Self {
        let or_default = |list: &[String], default: &[&str]| {
            if list.is_empty() {
                default.iter().map(|s| s.to_string()).collect()
            } else {
                list.iter().map(|s| s.to_lowercase()).collect()
            }
        };
        Self {
            keywords: or_default(keywords, DEFAULT_GREETING_KEYWORDS),
            negative: or_default(negative, DEFAULT_NEGATIVE_KEYWORDS),
        }
    }

    pub fn detect(&self, message: &str) -> GreetingResult {
        let text = normalize(message);
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return GreetingResult {
                signal: Signal {
                    reasons: vec!["empty message".into()],
                    ..Signal::default()
                },
                kind: GreetingKind::Complex,
            };
        }

        let mut reasons = Vec::new();
        let matched: Vec<String> = self
            .keywords
            .iter()
            .filter(|k| contains_phrase(&text, k))
            .cloned()
            .collect();

        let mut score = matched.len() as f64 * 0.3;
        if !matched.is_empty() {
            reasons.push(format!("greeting keywords: {}", matched.join(", ")));
        }

        // Brevity only counts in favour of messages that greet at all.
        let word_count = words.len();
        let greets = !matched.is_empty();
        if greets && word_count <= 3 {
            score += 0.4;
            reasons.push("very short message".into());
        } else if greets && word_count <= 5 {
            score += 0.2;
            reasons.push("short message".into());
        } else if word_count > 10 {
            score -= 0.1;
        }

        if self.keywords.iter().any(|k| k == words[0]) {
            score += 0.2;
            reasons.push(format!("opens with '{}'", words[0]));
        }

        let question_words = words.iter().filter(|w| QUESTION_WORDS.contains(*w)).count();
        score -= question_words as f64 * 0.1;

        if message.contains('!') || message.contains(":)") {
            score += 0.1;
            reasons.push("friendly punctuation".into());
        }

        score = score.clamp(0.0, 1.0);

        let negatives: Vec<&String> = self
            .negative
            .iter()
            .filter(|k| contains_phrase(&text, k))
            .collect();
        if !negatives.is_empty() {
            score *= 0.5;
            reasons.push(format!(
                "support vocabulary present: {}",
                negatives.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            ));
        }

        if greets && word_count <= 3 {
            score += 0.2;
        }

        let kind = if matched.is_empty() || word_count > 6 {
            GreetingKind::Complex
        } else if question_words > 0 || message.contains('?') {
            GreetingKind::QuestionGreeting
        } else {
            GreetingKind::SimpleGreeting
        };

        GreetingResult {
            signal: Signal {
                score,
                reasons,
                keywords: matched,
            }
            .clamp(),
            kind,
        }
    }
}

impl Default for GreetingDetector {
    fn default() -> Self {
        Self::new(&[], &[])
    }
}
