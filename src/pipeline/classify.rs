use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::lexicon::{any_match, SELF_TOPIC_PATTERNS};

/// What the original request asks of the answer.
///
/// Computed once per request and shared by the scorer, the policy and the
/// citation tracker so all three agree on the same reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuestionProfile {
    /// Analytical / philosophical question: the deep length floor applies.
    pub requires_depth: bool,
    /// The user asked for an enumerated answer ("list 10 points").
    pub requests_template: bool,
    /// The request itself is about consciousness / self-reference.
    pub raises_self_topic: bool,
    /// Dates, historical events, named scholars or comparisons.
    pub requires_citation: bool,
}

/// Classify a request using fixed keyword heuristics.
pub fn classify_question(question: &str) -> QuestionProfile {
    let lower = question.to_lowercase();
    QuestionProfile {
        requires_depth: has_depth_pattern(&lower),
        requests_template: requests_enumeration(question),
        raises_self_topic: any_match(&SELF_TOPIC_PATTERNS, question),
        requires_citation: requires_citation(question),
    }
}

fn has_depth_pattern(text: &str) -> bool {
    let patterns = [
        // English
        "why ",
        "explain",
        "analy",
        "discuss",
        "compare",
        "evaluate",
        "meaning of",
        "philosoph",
        "ethic",
        "implication",
        "significance",
        "to what extent",
        "what makes",
        "how does",
        "critique",
        "argue",
        // French
        "pourquoi",
        "expliqu",
        "analys",
        "philosoph",
        "signification",
        // German
        "warum",
        "erklär",
        "analysier",
        "bedeutung",
    ];
    patterns.iter().any(|p| text.contains(p))
}

/// Digits (or a small spelled-out number) next to list/steps/reasons/points.
fn requests_enumeration(text: &str) -> bool {
    static TEMPLATE_REQUEST_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
        vec![
            Regex::new(
                r"(?i)\b(?:\d{1,3}|three|four|five|six|seven|eight|nine|ten|twelve|twenty)\s+(?:\w+\s+)?(?:list|steps|reasons|points|tips|ways|items|examples|ideas|facts|bullet\s+points)\b",
            )
            .expect("Invalid classifier regex pattern"),
            Regex::new(r"(?i)\b(?:list|enumerate|name)\s+(?:the\s+)?(?:top\s+)?\d{1,3}\b")
                .expect("Invalid classifier regex pattern"),
            Regex::new(r"(?i)\btop\s+\d{1,3}\b").expect("Invalid classifier regex pattern"),
            Regex::new(r"(?i)\bstep[- ]by[- ]step\b").expect("Invalid classifier regex pattern"),
        ]
    });
    TEMPLATE_REQUEST_PATTERNS.iter().any(|re| re.is_match(text))
}

fn requires_citation(text: &str) -> bool {
    static CITATION_REQUIRED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
        vec![
            // Dates
            Regex::new(r"\b(?:1[0-9]{3}|20[0-9]{2})s?\b")
                .expect("Invalid classifier regex pattern"),
            Regex::new(r"(?i)\b(?:in\s+what\s+year|which\s+year|when\s+(?:did|was|were))\b")
                .expect("Invalid classifier regex pattern"),
            Regex::new(r"(?i)\b\d{1,2}(?:st|nd|rd|th)?\s+century\b")
                .expect("Invalid classifier regex pattern"),
            // Named historical events
            Regex::new(
                r"(?i)\b(?:war|revolution|treaty|empire|dynasty|battle\s+of|independence|holocaust|renaissance|reformation|enlightenment|crusades?|cold\s+war)\b",
            )
            .expect("Invalid classifier regex pattern"),
            // Named scholars
            Regex::new(
                r"(?i)\b(?:kant|hegel|nietzsche|aristotle|plato|socrates|descartes|spinoza|hume|locke|marx|wittgenstein|heidegger|sartre|foucault|einstein|newton|darwin|freud|bohr|heisenberg|confucius)\b",
            )
            .expect("Invalid classifier regex pattern"),
            Regex::new(
                r"(?i)\b(?:who|which)\s+(?:philosopher|scholar|scientist|author|thinker|historian)\b",
            )
            .expect("Invalid classifier regex pattern"),
            Regex::new(r"(?i)\baccording\s+to\b").expect("Invalid classifier regex pattern"),
            // Comparisons
            Regex::new(r"(?i)\b(?:vs\.?|versus)\s").expect("Invalid classifier regex pattern"),
            Regex::new(r"(?i)\bdifference\s+between\b").expect("Invalid classifier regex pattern"),
            Regex::new(r"(?i)\bcompared?\s+(?:to|with)\b")
                .expect("Invalid classifier regex pattern"),
        ]
    });
    CITATION_REQUIRED_PATTERNS.iter().any(|re| re.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn philosophical_question_requires_depth() {
        let p = classify_question("What makes quantum mechanics beautiful, philosophically?");
        assert!(p.requires_depth);
        assert!(!p.requests_template);
        assert!(!p.raises_self_topic);
    }

    #[test]
    fn ordinary_question_does_not_require_depth() {
        let p = classify_question("What is the capital of Peru?");
        assert!(!p.requires_depth);
        assert!(!p.requires_citation);
    }

    #[test]
    fn list_ten_points_is_template_request() {
        assert!(classify_question("list 10 points about climate").requests_template);
        assert!(classify_question("Give me 5 reasons to learn Rust").requests_template);
        assert!(classify_question("What are the top 3 risks?").requests_template);
        assert!(classify_question("Give me five quick tips").requests_template);
    }

    #[test]
    fn plain_question_is_not_template_request() {
        assert!(!classify_question("Why do leaves change color?").requests_template);
        assert!(!classify_question("What happened in 1905?").requests_template);
    }

    #[test]
    fn consciousness_question_raises_self_topic() {
        assert!(classify_question("Do you have consciousness?").raises_self_topic);
        assert!(classify_question("Are you sentient?").raises_self_topic);
    }

    #[test]
    fn citation_required_classes() {
        assert!(classify_question("What happened in 1789 in France?").requires_citation);
        assert!(classify_question("What caused the French Revolution?").requires_citation);
        assert!(classify_question("What did Kant say about duty?").requires_citation);
        assert!(classify_question("Empiricism vs. rationalism").requires_citation);
        assert!(
            classify_question("What is the difference between a virus and bacteria?")
                .requires_citation
        );
    }

    #[test]
    fn french_depth_keyword() {
        assert!(classify_question("Pourquoi le ciel est-il bleu ?").requires_depth);
    }

    #[test]
    fn classification_is_deterministic() {
        let q = "Compare Plato vs. Aristotle on virtue and list 3 points";
        assert_eq!(classify_question(q), classify_question(q));
    }
}
