//! Fixed rule tables shared by the normalizer, the scorer and the question
//! classifier. Every table is compiled once on first use and read-only after.

use std::sync::LazyLock;

use regex::Regex;

/// A compiled pattern with a short description for debug logs.
pub struct Rule {
    pub regex: Regex,
    pub description: &'static str,
}

fn rule(regex_str: &str, description: &'static str) -> Rule {
    Rule {
        regex: Regex::new(regex_str).expect("Invalid lexicon regex pattern"),
        description,
    }
}

/// A normalizer rewrite: matched span is replaced by `replacement`
/// (empty string deletes the clause opener).
pub struct PhraseRewrite {
    pub regex: Regex,
    pub replacement: &'static str,
}

fn rewrite(regex_str: &str, replacement: &'static str) -> PhraseRewrite {
    PhraseRewrite {
        regex: Regex::new(regex_str).expect("Invalid lexicon regex pattern"),
        replacement,
    }
}

// =================================================================
// FIRST-PERSON EXPERIENTIAL PHRASING
// =================================================================

/// Experiential openers the normalizer can remove without losing content.
pub static EXPERIENTIAL_REWRITES: LazyLock<Vec<PhraseRewrite>> = LazyLock::new(|| {
    vec![
        rewrite(r"(?i)\bI\s+(?:really\s+|truly\s+)?(?:feel|felt|sense)\s+(?:that\s+|like\s+)?", ""),
        rewrite(r"(?i)\bin\s+my\s+(?:own\s+)?(?:personal\s+)?experience,?\s*", ""),
        rewrite(r"(?i)\bspeaking\s+from\s+(?:my\s+own\s+|personal\s+)?experience,?\s*", ""),
        rewrite(r"(?i)\bpersonally,?\s+I\s+(?:think|believe|feel)\s+(?:that\s+)?", ""),
        rewrite(
            r"(?i)\bI'm\s+(?:so\s+)?(?:excited|thrilled|delighted)\s+to\s+(?:share|explain|tell\s+you)\s+(?:that\s+)?",
            "",
        ),
        rewrite(r"(?i)\bI\s+(?:really\s+|truly\s+)?love\s+how\s+", "It is notable how "),
    ]
});

/// Any match marks the answer as anthropomorphic. Broader than
/// `EXPERIENTIAL_REWRITES`: these cannot be removed mechanically.
pub static ANTHROPOMORPHIC_PATTERNS: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(r"(?i)\bI\s+(?:really\s+|truly\s+)?(?:feel|felt)\b", "Experiential: 'I feel'"),
        rule(
            r"(?i)\bin\s+my\s+(?:own\s+)?(?:personal\s+)?experience\b",
            "Experiential: 'in my experience'",
        ),
        rule(
            r"(?i)\bspeaking\s+from\s+(?:my\s+own\s+|personal\s+)?experience\b",
            "Experiential: 'speaking from experience'",
        ),
        rule(
            r"(?i)\bI\s+(?:remember|recall)\s+(?:when|how|the\s+first|being)\b",
            "Memory claim: 'I remember when'",
        ),
        rule(
            r"(?i)\b(?:when|as)\s+I\s+(?:was|first)\s+(?:young|a\s+child|a\s+student|studying|studied|learning|learned|read)\b",
            "Biography claim: 'when I first studied'",
        ),
        rule(
            r"(?i)\bI\s+was\s+(?:deeply\s+|truly\s+|so\s+|very\s+)?(?:moved|touched|amazed|fascinated|thrilled)\b",
            "Emotional claim: 'I was moved'",
        ),
        rule(r"(?i)\bmy\s+(?:heart|soul|emotions?|feelings?)\b", "Emotional claim: 'my heart'"),
        rule(r"(?i)\bI\s+(?:really\s+|truly\s+)?love\b", "Emotional claim: 'I love'"),
        rule(r"(?i)\bas\s+someone\s+who\s+has\b", "Biography claim: 'as someone who has'"),
        rule(
            r"(?i)\bI'm\s+(?:so\s+)?(?:excited|thrilled|delighted)\b",
            "Emotional claim: 'I'm excited'",
        ),
        rule(
            r"(?i)\bI\s+have\s+(?:personally\s+)?(?:experienced|lived\s+through|witnessed)\b",
            "Experiential: 'I have experienced'",
        ),
    ]
});

// =================================================================
// DEPTH
// =================================================================

/// Analytical and meta-cognitive markers. Density per 100 words drives
/// the depth bucket.
pub static DEPTH_MARKERS: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(r"(?i)\bimpl(?:y|ies|ied|ication|ications)\b", "implication"),
        rule(r"(?i)\bassum(?:e|es|ed|ption|ptions)\b", "assumption"),
        rule(r"(?i)\bunderlying\b", "underlying"),
        rule(r"(?i)\bperspectives?\b", "perspective"),
        rule(r"(?i)\bframeworks?\b", "framework"),
        rule(r"(?i)\btrade-?offs?\b", "trade-off"),
        rule(r"(?i)\bnuance[ds]?\b", "nuance"),
        rule(r"(?i)\bevidence\b", "evidence"),
        rule(r"(?i)\binterpretations?\b", "interpretation"),
        rule(r"(?i)\bin\s+other\s+words\b", "reformulation"),
        rule(r"(?i)\bcounter-?arguments?\b", "counterargument"),
        rule(r"(?i)\blimitations?\b", "limitation"),
        rule(r"(?i)\bmechanisms?\b", "mechanism"),
        rule(r"(?i)\bconsequences?\b", "consequence"),
        rule(r"(?i)\bdistinctions?\b", "distinction"),
        rule(r"(?i)\btensions?\b", "tension"),
        rule(r"(?i)\barguabl[ey]\b", "arguably"),
        rule(r"(?i)\bparadox(?:es|ical)?\b", "paradox"),
        rule(r"(?i)\bdepends?\s+on\b", "dependence"),
        rule(r"(?i)\bfundamental(?:ly)?\b", "fundamental"),
        rule(r"(?i)\bhypothes(?:is|es|ize)\b", "hypothesis"),
        rule(r"(?i)\bcritiques?\b", "critique"),
        rule(r"(?i)\bprinciples?\b", "principle"),
        rule(r"(?i)\bto\s+what\s+extent\b", "extent"),
        rule(r"(?i)\bstrictly\s+speaking\b", "precision"),
        rule(r"(?i)\bin\s+(?:practice|theory)\b", "theory/practice"),
    ]
});

// =================================================================
// STRUCTURE
// =================================================================

/// Class of an argumentative connective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectiveClass {
    Contrast,
    Causal,
    Enumerative,
}

pub struct Connective {
    pub regex: Regex,
    pub class: ConnectiveClass,
}

fn connective(regex_str: &str, class: ConnectiveClass) -> Connective {
    Connective {
        regex: Regex::new(regex_str).expect("Invalid connective regex pattern"),
        class,
    }
}

pub static CONNECTIVES: LazyLock<Vec<Connective>> = LazyLock::new(|| {
    use ConnectiveClass::*;
    vec![
        connective(r"(?i)\b(?:however|nevertheless|nonetheless|conversely)\b", Contrast),
        connective(r"(?i)\b(?:although|though|whereas|despite)\b", Contrast),
        connective(r"(?i)\bon\s+the\s+other\s+hand\b", Contrast),
        connective(r"(?i)\bin\s+contrast\b", Contrast),
        connective(r"(?i)\bbut\b", Contrast),
        connective(r"(?i)\b(?:because|therefore|thus|hence|consequently)\b", Causal),
        connective(r"(?i)\bas\s+a\s+result\b", Causal),
        connective(r"(?i)\b(?:due\s+to|so\s+that|which\s+means)\b", Causal),
        connective(
            r"(?i)\b(?:first(?:ly)?|second(?:ly)?|third(?:ly)?|finally|lastly)\b",
            Enumerative,
        ),
        connective(r"(?i)\b(?:furthermore|moreover|additionally)\b", Enumerative),
        connective(r"(?i)\bin\s+addition\b", Enumerative),
    ]
});

// =================================================================
// TEMPLATE-LIKENESS
// =================================================================

/// A numbered list item at the start of a line: "1. ", "2) ".
pub static NUMBERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d{1,3}[.)]\s+\S").expect("valid regex"));

/// Formulaic phrases. Two or more distinct ones in one answer reads as a
/// template.
pub static FORMULAIC_PHRASES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(r"(?i)\bin\s+conclusion\b", "in conclusion"),
        rule(r"(?i)\bin\s+summary\b", "in summary"),
        rule(r"(?i)\bto\s+summari[sz]e\b", "to summarize"),
        rule(r"(?i)\bit(?:\s+is|'s)\s+important\s+to\s+note\b", "it is important to note"),
        rule(r"(?i)\bit\s+is\s+worth\s+noting\b", "it is worth noting"),
        rule(r"(?i)\bfirst\s+and\s+foremost\b", "first and foremost"),
        rule(r"(?i)\blet'?s\s+dive\b", "let's dive"),
        rule(r"(?i)\bdive\s+into\b", "dive into"),
        rule(r"(?i)\bhere\s+(?:are|is)\s+(?:some|a\s+few|a\s+breakdown)\b", "here are some"),
        rule(r"(?i)\bat\s+the\s+end\s+of\s+the\s+day\b", "at the end of the day"),
        rule(r"(?i)\bin\s+today'?s\s+(?:world|fast-paced)\b", "in today's world"),
        rule(r"(?i)\bI\s+hope\s+this\s+helps\b", "I hope this helps"),
        rule(r"(?i)\bgreat\s+question\b", "great question"),
    ]
});

// =================================================================
// SELF-REFERENTIAL / CONSCIOUSNESS TOPICS
// =================================================================

/// Restricted topic set. Legitimate only when the request raises it.
pub static SELF_TOPIC_PATTERNS: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(r"(?i)\bconsciousness\b", "consciousness"),
        rule(r"(?i)\bsentien(?:t|ce)\b", "sentience"),
        rule(r"(?i)\bself-?aware(?:ness)?\b", "self-awareness"),
        rule(r"(?i)\bqualia\b", "qualia"),
        rule(r"(?i)\b(?:subjective|inner)\s+(?:experience|life)\b", "subjective experience"),
        rule(r"(?i)\bas\s+an?\s+(?:AI|language\s+model|assistant)\b", "AI self-reference"),
        rule(r"(?i)\bmy\s+own\s+(?:existence|mind|nature|awareness)\b", "self-reflection"),
        rule(
            r"(?i)\b(?:are|do)\s+you\s+(?:conscious|alive|sentient|feel|have\s+feelings)\b",
            "self question",
        ),
        rule(r"(?i)\bfree\s+will\b", "free will"),
    ]
});

pub fn any_match(rules: &[Rule], text: &str) -> bool {
    rules.iter().any(|r| r.regex.is_match(text))
}

pub fn count_matches(rules: &[Rule], text: &str) -> usize {
    rules.iter().map(|r| r.regex.find_iter(text).count()).sum()
}

/// Descriptions of every rule that matches, in table order.
pub fn matching_descriptions(rules: &[Rule], text: &str) -> Vec<&'static str> {
    rules
        .iter()
        .filter(|r| r.regex.is_match(text))
        .map(|r| r.description)
        .collect()
}
