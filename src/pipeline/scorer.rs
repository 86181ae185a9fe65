//! Quality scorer.
//!
//! Pure and deterministic: every dimension is computed independently by
//! matching the text against the fixed tables in `lexicon`. Dimension
//! values are "goodness" in [0, 1]; the overall score is their weighted sum,
//! multiplied by the critical penalty when any critical issue is present.

use std::collections::BTreeMap;

use super::citation::check_citations;
use super::classify::QuestionProfile;
use super::language::is_language_mismatch;
use super::lexicon::{
    any_match, count_matches, matching_descriptions, ConnectiveClass, ANTHROPOMORPHIC_PATTERNS,
    CONNECTIVES, DEPTH_MARKERS, FORMULAIC_PHRASES, NUMBERED_ITEM, SELF_TOPIC_PATTERNS,
};
use super::types::{Dimension, IssueTag, QualityScore, SourceDocument};
use crate::config::ScoringSettings;

/// Numbered lines in a row that read as a template.
const NUMBERED_RUN_THRESHOLD: usize = 3;

/// Distinct formulaic phrases that read as a template.
const FORMULAIC_THRESHOLD: usize = 2;

/// What the scorer needs to know about the original request.
#[derive(Debug, Clone, Copy)]
pub struct ScoringRequest<'a> {
    pub profile: &'a QuestionProfile,
    pub sources: &'a [SourceDocument],
    /// Primary language subtag the answer should be written in.
    pub expected_language: &'a str,
}

/// Score `text` against the request.
pub fn score_answer(
    text: &str,
    request: &ScoringRequest<'_>,
    settings: &ScoringSettings,
) -> QualityScore {
    let mut issues = Vec::new();
    let mut dimension_scores = BTreeMap::new();

    dimension_scores.insert(
        Dimension::Depth,
        score_depth(text, request.profile, settings, &mut issues),
    );
    dimension_scores.insert(
        Dimension::Structure,
        score_structure(text, settings, &mut issues),
    );
    dimension_scores.insert(
        Dimension::TemplateLikeness,
        score_template_likeness(text, &mut issues),
    );
    dimension_scores.insert(
        Dimension::Anthropomorphism,
        score_anthropomorphism(text, &mut issues),
    );
    dimension_scores.insert(
        Dimension::TopicDrift,
        score_topic_drift(text, request.profile, &mut issues),
    );
    dimension_scores.insert(
        Dimension::CitationPresence,
        score_citations(text, request, &mut issues),
    );
    dimension_scores.insert(
        Dimension::LanguageMatch,
        score_language(text, request.expected_language, &mut issues),
    );

    let is_critical = issues.iter().any(IssueTag::is_critical);
    let overall_score = combine(&dimension_scores, is_critical, settings);

    for issue in &issues {
        tracing::debug!(issue = %issue, critical = issue.is_critical(), "Quality issue detected");
    }

    QualityScore {
        overall_score,
        dimension_scores,
        issues,
        is_critical,
    }
}

/// Re-score a draft whose experiential openers the normalizer removed.
///
/// The removed phrasing still marks the draft as anthropomorphic: the
/// normalizer only deletes the opener, so the sentence it introduced needs
/// a rewrite that states the content directly.
pub fn flag_removed_phrasing(mut score: QualityScore, settings: &ScoringSettings) -> QualityScore {
    if !score.has_issue(IssueTag::AnthropomorphicLanguage) {
        tracing::debug!("Experiential phrasing removed by normalizer");
        score.issues.push(IssueTag::AnthropomorphicLanguage);
    }
    score.dimension_scores.insert(Dimension::Anthropomorphism, 0.0);
    score.is_critical = true;
    score.overall_score = combine(&score.dimension_scores, true, settings);
    score
}

/// Weighted sum of the dimensions, penalized when critical.
fn combine(
    dimension_scores: &BTreeMap<Dimension, f64>,
    is_critical: bool,
    settings: &ScoringSettings,
) -> f64 {
    let weighted: f64 = dimension_scores
        .iter()
        .map(|(dimension, value)| settings.weights.weight(*dimension) * value)
        .sum();
    if is_critical {
        (weighted * settings.critical_penalty).clamp(0.0, 1.0)
    } else {
        weighted.clamp(0.0, 1.0)
    }
}

// =================================================================
// DIMENSIONS
// =================================================================

fn score_depth(
    text: &str,
    profile: &QuestionProfile,
    settings: &ScoringSettings,
    issues: &mut Vec<IssueTag>,
) -> f64 {
    let min_chars = if profile.requires_depth {
        settings.min_chars_deep
    } else {
        settings.min_chars_ordinary
    };
    if text.chars().count() < min_chars {
        issues.push(IssueTag::TooShort);
        return 0.0;
    }

    let words = text.split_whitespace().count().max(1);
    let density = count_matches(&DEPTH_MARKERS, text) as f64 * 100.0 / words as f64;

    if density >= settings.depth_high_density {
        1.0
    } else if density >= settings.depth_medium_density {
        0.6
    } else {
        // Ordinary questions do not need analytical vocabulary.
        if profile.requires_depth {
            issues.push(IssueTag::ShallowDepth);
        }
        0.2
    }
}

fn score_structure(text: &str, settings: &ScoringSettings, issues: &mut Vec<IssueTag>) -> f64 {
    let mut count = 0;
    let mut classes: Vec<ConnectiveClass> = Vec::new();
    for connective in CONNECTIVES.iter() {
        let hits = connective.regex.find_iter(text).count();
        if hits > 0 {
            count += hits;
            if !classes.contains(&connective.class) {
                classes.push(connective.class);
            }
        }
    }

    let min = settings.min_connectives.max(1);
    if count < min {
        issues.push(IssueTag::WeakStructure);
    }
    let quantity = (count as f64 / min as f64).min(1.0);
    let variety = classes.len() as f64 / 3.0;
    0.7 * quantity + 0.3 * variety
}

fn score_template_likeness(text: &str, issues: &mut Vec<IssueTag>) -> f64 {
    let numbered = longest_numbered_run(text) >= NUMBERED_RUN_THRESHOLD;
    let formulaic = matching_descriptions(&FORMULAIC_PHRASES, text);
    let formulaic_hit = formulaic.len() >= FORMULAIC_THRESHOLD;

    if numbered || formulaic_hit {
        tracing::debug!(
            numbered_list = numbered,
            formulaic_phrases = formulaic.len(),
            "Template-like answer"
        );
        issues.push(IssueTag::TemplateLike);
    }

    match (numbered, formulaic_hit) {
        (true, true) => 0.0,
        (true, false) => 0.2,
        (false, true) => 0.3,
        (false, false) => 1.0,
    }
}

/// Longest run of consecutive numbered lines. Blank lines do not break a run.
fn longest_numbered_run(text: &str) -> usize {
    let mut longest = 0;
    let mut run = 0;
    for line in text.lines() {
        if NUMBERED_ITEM.is_match(line) {
            run += 1;
            longest = longest.max(run);
        } else if !line.trim().is_empty() {
            run = 0;
        }
    }
    longest
}

fn score_anthropomorphism(text: &str, issues: &mut Vec<IssueTag>) -> f64 {
    let matched = matching_descriptions(&ANTHROPOMORPHIC_PATTERNS, text);
    if matched.is_empty() {
        return 1.0;
    }
    tracing::debug!(patterns = ?matched, "First-person experience claims");
    issues.push(IssueTag::AnthropomorphicLanguage);
    0.0
}

fn score_topic_drift(text: &str, profile: &QuestionProfile, issues: &mut Vec<IssueTag>) -> f64 {
    if !profile.raises_self_topic && any_match(&SELF_TOPIC_PATTERNS, text) {
        issues.push(IssueTag::TopicDrift);
        return 0.0;
    }
    1.0
}

fn score_citations(text: &str, request: &ScoringRequest<'_>, issues: &mut Vec<IssueTag>) -> f64 {
    if request.sources.is_empty() {
        return 1.0;
    }
    let report = check_citations(text, request.sources, request.profile);

    let base = if report.has_citation {
        1.0
    } else if report.citation_required {
        issues.push(IssueTag::MissingCitation);
        0.0
    } else {
        0.6
    };

    if report.invalid_markers.is_empty() {
        base
    } else {
        issues.push(IssueTag::InvalidCitation);
        base * 0.5
    }
}

fn score_language(text: &str, expected: &str, issues: &mut Vec<IssueTag>) -> f64 {
    if is_language_mismatch(expected, text) {
        issues.push(IssueTag::LanguageMismatch);
        return 0.0;
    }
    1.0
}
