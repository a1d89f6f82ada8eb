// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-handoff detection.
//!
//! Weighted regex groups recognise explicit requests for a person, complaint
//! and urgency language, and escalation-worthy technical or billing
//! trouble. Each match contributes its weight plus a pair of tags; the tags
//! decide the request type and urgency of the resulting assignment.

use std::sync::LazyLock;

use livedesk_core::{RequestType, Urgency};
use regex::Regex;

use crate::signal::Signal;
use crate::text::{contains_phrase, normalize};

/// Weight added per configured agent-request keyword hit.
const KEYWORD_WEIGHT: f64 = 0.3;

struct Pattern {
    regex: Regex,
    weight: f64,
    tags: [&'static str; 2],
    group: &'static str,
}

fn pattern(group: &'static str, re: &str, weight: f64, tags: [&'static str; 2]) -> Pattern {
    Pattern {
        regex: Regex::new(re).unwrap(),
        weight,
        tags,
        group,
    }
}

static PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    vec![
        // Explicit asks for a person.
        pattern("explicit", r"\b(speak|talk|chat)\s+(?:to|with)\s+(?:a\s+)?(?:human|person|agent|representative|someone)\b", 0.9, ["speak to human", "agent"]),
        pattern("explicit", r"\b(?:can\s+i|i\s+(?:want|need|would\s+like)\s+to)\s+(?:speak|talk|chat)\s+(?:to|with)\s+(?:a\s+)?(?:human|person|agent|representative|someone)\b", 0.9, ["want to speak", "agent"]),
        pattern("explicit", r"\b(?:connect|transfer)\s+me\s+(?:to|with)\s+(?:a\s+)?(?:human|person|agent|representative|someone|customer\s+service|support)\b", 0.85, ["connect me", "agent"]),
        pattern("explicit", r"\b(?:i\s+need|get\s+me)\s+(?:a\s+)?(?:human|person|agent|representative|someone)\b", 0.8, ["need human", "agent"]),
        pattern("explicit", r"\breal\s+(?:human|person|agent)\b", 0.8, ["real human", "agent"]),
        pattern("explicit", r"\b(?:human|live)\s+(?:agent|support|person|representative)\b", 0.85, ["human agent", "live support"]),
        pattern("explicit", r"\b(?:customer\s+)?(?:service|support)\s+(?:agent|representative|person)\b", 0.75, ["customer service", "agent"]),
        pattern("explicit", r"\boperator\b", 0.7, ["operator", "agent"]),
        pattern("explicit", r"\b(?:escalate|supervisor|manager)\b", 0.8, ["escalate", "supervisor"]),
        // Complaints.
        pattern("complaint", r"\b(?:frustrated|angry|upset|disappointed|unsatisfied)\b", 0.4, ["frustrated", "complaint"]),
        pattern("complaint", r"\b(?:terrible|awful|horrible|worst)\s+(?:service|experience|support)\b", 0.6, ["terrible service", "complaint"]),
        pattern("complaint", r"\b(?:not\s+working|broken|doesn't\s+work|isn't\s+working)\b", 0.3, ["not working", "issue"]),
        pattern("complaint", r"\b(?:charged|billed)\s+(?:twice|wrong|incorrectly|error)\b", 0.5, ["billing error", "complaint"]),
        pattern("complaint", r"\bthis\s+is\s+(?:ridiculous|unacceptable|outrageous)\b", 0.7, ["unacceptable", "complaint"]),
        pattern("complaint", r"\bi\s+(?:demand|want)\s+(?:a\s+)?(?:refund|compensation)\b", 0.7, ["demand refund", "complaint"]),
        pattern("complaint", r"\b(?:sue|lawsuit|legal\s+action|attorney|lawyer)\b", 0.8, ["legal threat", "urgent"]),
        // Urgency.
        pattern("urgency", r"\b(?:urgent|emergency|asap|immediately|right\s+now)\b", 0.6, ["urgent", "emergency"]),
        pattern("urgency", r"\b(?:critical|mission\s+critical|production\s+down|outage)\b", 0.7, ["critical", "outage"]),
        pattern("urgency", r"\b(?:losing\s+money|revenue\s+impact|business\s+impact)\b", 0.6, ["business impact", "urgent"]),
        pattern("urgency", r"\b(?:deadline|time\s+sensitive|running\s+out\s+of\s+time)\b", 0.5, ["deadline", "time sensitive"]),
        pattern("urgency", r"\bhelp\s+(?:me\s+)?(?:asap|now|immediately|urgently)\b", 0.6, ["help now", "urgent"]),
        // The bot is not getting there.
        pattern("contextual", r"\b(?:can\s+someone|could\s+someone|is\s+there\s+someone)\s+(?:help|assist)\b", 0.6, ["someone help", "assistance"]),
        pattern("contextual", r"\bi\s+(?:need|require)\s+(?:help|assistance|support)\s+(?:with|from)\b", 0.4, ["need help", "assistance"]),
        pattern("contextual", r"\b(?:this\s+(?:bot|chatbot|system)|you)\s+(?:can't|cannot|isn't|doesn't)\s+(?:help|understand|solve)\b", 0.7, ["bot cannot help", "escalation"]),
        pattern("contextual", r"\bi\s+(?:already\s+)?tried\s+(?:that|everything|this)\s+(?:and\s+it\s+(?:doesn't|didn't)\s+work|but\s+it\s+(?:doesn't|didn't)\s+work)\b", 0.5, ["tried everything", "escalation"]),
        pattern("contextual", r"\b(?:still\s+not\s+working|still\s+having\s+(?:issues|problems)|doesn't\s+solve\s+my\s+problem)\b", 0.4, ["still not working", "escalation"]),
        pattern("contextual", r"\b(?:complex|complicated)\s+(?:issue|problem|situation)\b", 0.3, ["complex issue", "escalation"]),
        // Technical escalation.
        pattern("technical", r"\b(?:api|integration|webhook|ssl|certificate|database|server)\s+(?:error|issue|problem|not\s+working)\b", 0.5, ["technical issue", "api error"]),
        pattern("technical", r"\b(?:deployment|production|staging|environment)\s+(?:issue|problem|error)\b", 0.6, ["deployment issue", "technical"]),
        pattern("technical", r"\b(?:authentication|authorization|login|access)\s+(?:issue|problem|error|denied)\b", 0.4, ["auth issue", "technical"]),
        pattern("technical", r"\b(?:configuration|setup|installation)\s+(?:help|issue|problem)\b", 0.4, ["configuration help", "technical"]),
        // Billing escalation.
        pattern("billing", r"\b(?:billing|invoice|payment|charge|subscription)\s+(?:issue|problem|error|dispute)\b", 0.5, ["billing issue", "payment"]),
        pattern("billing", r"\b(?:refund|chargeback|dispute|cancel)\s+(?:request|charge|payment|subscription)\b", 0.6, ["refund request", "billing"]),
        pattern("billing", r"\b(?:overcharged|double\s+charged|incorrect\s+amount|wrong\s+charge)\b", 0.6, ["billing error", "overcharged"]),
        pattern("billing", r"\b(?:upgrade|downgrade|change\s+plan|billing\s+cycle)\b", 0.3, ["plan change", "billing"]),
    ]
});

/// Request type tags, checked in order.
const TYPE_RULES: &[(RequestType, &[&str])] = &[
    (RequestType::Billing, &["billing", "payment", "refund"]),
    (RequestType::Technical, &["technical", "api", "configuration"]),
    (RequestType::Complaint, &["complaint", "frustrated", "unacceptable"]),
    (RequestType::Urgent, &["urgent", "emergency", "critical"]),
    (RequestType::Support, &["help", "support", "assistance"]),
];

const URGENCY_RULES: &[(Urgency, &[&str])] = &[
    (Urgency::Critical, &["legal threat", "critical", "outage"]),
    (Urgency::High, &["urgent", "emergency", "business impact"]),
    (Urgency::Normal, &["complaint", "billing error", "escalation"]),
];

#[derive(Debug, Clone)]
pub struct HandoffResult {
    pub signal: Signal,
    pub is_request: bool,
    pub request_type: RequestType,
    pub urgency: Urgency,
}

/// Scores how strongly an utterance asks for a human.
pub struct AgentRequestDetector {
    threshold: f64,
    keywords: Vec<String>,
}

impl AgentRequestDetector {
    pub fn new(threshold: f64, keywords: &[String]) -> Self {
        Self {
            threshold,
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    pub fn detect(&self, message: &str) -> HandoffResult {
        let text = message.trim().to_lowercase();
        if text.is_empty() {
            return HandoffResult {
                signal: Signal {
                    reasons: vec!["empty message".into()],
                    ..Signal::default()
                },
                is_request: false,
                request_type: RequestType::General,
                urgency: Urgency::Low,
            };
        }

        let mut score = 0.0;
        let mut tags: Vec<String> = Vec::new();
        let mut reasons = Vec::new();

        for p in PATTERNS.iter().filter(|p| p.regex.is_match(&text)) {
            score += p.weight;
            tags.extend(p.tags.iter().map(|t| t.to_string()));
            reasons.push(format!("{} indicator: {}", p.group, p.tags[0]));
        }

        let normalized = normalize(&text);
        for keyword in self.keywords.iter().filter(|k| contains_phrase(&normalized, k)) {
            score += KEYWORD_WEIGHT;
            tags.push(keyword.clone());
            reasons.push(format!("configured keyword: {keyword}"));
        }

        let score = f64::min(score, 1.0);
        let is_request = score >= self.threshold;
        reasons.push(format!(
            "confidence {score:.2} {} threshold {:.2}",
            if is_request { "meets" } else { "below" },
            self.threshold
        ));

        let (request_type, urgency) = if is_request {
            let joined = tags.join(" ");
            let request_type = TYPE_RULES
                .iter()
                .find(|(_, needles)| needles.iter().any(|n| joined.contains(n)))
                .map_or(RequestType::General, |(t, _)| *t);
            let urgency = URGENCY_RULES
                .iter()
                .find(|(_, needles)| needles.iter().any(|n| joined.contains(n)))
                .map_or(Urgency::Low, |(u, _)| *u);
            (request_type, urgency)
        } else {
            (RequestType::General, Urgency::Low)
        };

        HandoffResult {
            signal: Signal {
                score,
                reasons,
                keywords: tags,
            },
            is_request,
            request_type,
            urgency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> AgentRequestDetector {
        AgentRequestDetector::new(0.7, &[])
    }

    #[test]
    fn explicit_urgent_request() {
        let r = detector().detect("I need to speak to a human agent, this is urgent!");
        assert!(r.is_request);
        assert_eq!(r.signal.score, 1.0);
        assert_eq!(r.request_type, RequestType::Urgent);
        assert_eq!(r.urgency, Urgency::High);
    }

    #[test]
    fn greeting_is_not_a_request() {
        let r = detector().detect("hello there!");
        assert!(!r.is_request);
        assert_eq!(r.signal.score, 0.0);
        assert_eq!(r.urgency, Urgency::Low);
    }

    #[test]
    fn legal_threat_is_critical() {
        let r = detector().detect("I will contact my lawyer about this");
        assert!(r.is_request);
        assert_eq!(r.urgency, Urgency::Critical);
        assert_eq!(r.request_type, RequestType::Urgent);
    }

    #[test]
    fn billing_trouble_routes_to_billing() {
        let r = detector().detect("I was double charged, please process a refund request");
        assert!(r.is_request);
        assert_eq!(r.request_type, RequestType::Billing);
        assert_eq!(r.urgency, Urgency::Normal);
    }

    #[test]
    fn technical_escalation() {
        let r = detector().detect("we have a production error and the api error keeps coming back");
        assert!(r.is_request);
        assert_eq!(r.request_type, RequestType::Technical);
    }

    #[test]
    fn weak_signal_stays_below_threshold() {
        let r = detector().detect("my widget is broken");
        assert!(!r.is_request);
        assert!((r.signal.score - 0.3).abs() < 1e-9);
        assert_eq!(r.request_type, RequestType::General);
    }

    #[test]
    fn configured_keywords_add_weight() {
        let d = AgentRequestDetector::new(0.7, &["Callback".to_string(), "ticket".to_string()]);
        let r = d.detect("please open a ticket and arrange a callback");
        assert!((r.signal.score - 0.6).abs() < 1e-9);
        assert!(!r.is_request);

        let r = d.detect("callback please, I am frustrated");
        assert!(r.is_request);
        assert_eq!(r.request_type, RequestType::Complaint);
    }

    #[test]
    fn threshold_is_respected() {
        let strict = AgentRequestDetector::new(1.0, &[]);
        assert!(!strict.detect("operator").is_request);
        assert!(detector().detect("operator").is_request);
    }
}
