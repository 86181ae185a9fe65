use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════
// Mode
// ═══════════════════════════════════════════════════════════

/// How hard the pipeline works on a draft.
///
/// The mode changes only the attempt budget, the acceptable-score threshold
/// and how much structure the normalizer flattens. The decision rules are
/// the same for every mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefinementMode {
    /// Score and report only. Never rewrites.
    Off,
    #[default]
    Light,
    Aggressive,
}

impl RefinementMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Light => "light",
            Self::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for RefinementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefinementMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "disabled" | "none" => Ok(Self::Off),
            "light" => Ok(Self::Light),
            "aggressive" | "strict" => Ok(Self::Aggressive),
            other => Err(format!("unknown refinement mode: {other}")),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Quality dimensions and issues
// ═══════════════════════════════════════════════════════════

/// A scored quality dimension. The set is fixed: every `QualityScore`
/// carries a value for each of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dimension {
    Depth,
    Structure,
    TemplateLikeness,
    Anthropomorphism,
    TopicDrift,
    CitationPresence,
    LanguageMatch,
}

impl Dimension {
    pub const ALL: [Dimension; 7] = [
        Dimension::Depth,
        Dimension::Structure,
        Dimension::TemplateLikeness,
        Dimension::Anthropomorphism,
        Dimension::TopicDrift,
        Dimension::CitationPresence,
        Dimension::LanguageMatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Depth => "depth",
            Self::Structure => "structure",
            Self::TemplateLikeness => "templateLikeness",
            Self::Anthropomorphism => "anthropomorphism",
            Self::TopicDrift => "topicDrift",
            Self::CitationPresence => "citationPresence",
            Self::LanguageMatch => "languageMatch",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected quality defect. Serialized as its canonical kebab-case tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueTag {
    MissingCitation,
    AnthropomorphicLanguage,
    LanguageMismatch,
    TopicDrift,
    TemplateLike,
    ShallowDepth,
    WeakStructure,
    TooShort,
    InvalidCitation,
}

impl IssueTag {
    /// Issues severe enough to force a rewrite regardless of overall score.
    pub const CRITICAL: [IssueTag; 5] = [
        IssueTag::MissingCitation,
        IssueTag::AnthropomorphicLanguage,
        IssueTag::LanguageMismatch,
        IssueTag::TopicDrift,
        IssueTag::TemplateLike,
    ];

    pub fn is_critical(&self) -> bool {
        Self::CRITICAL.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCitation => "missing-citation",
            Self::AnthropomorphicLanguage => "anthropomorphic-language",
            Self::LanguageMismatch => "language-mismatch",
            Self::TopicDrift => "topic-drift",
            Self::TemplateLike => "template-like",
            Self::ShallowDepth => "shallow-depth",
            Self::WeakStructure => "weak-structure",
            Self::TooShort => "too-short",
            Self::InvalidCitation => "invalid-citation",
        }
    }
}

impl fmt::Display for IssueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable scorer output.
///
/// `overall_score` is the weighted sum of `dimension_scores`, multiplied by
/// the critical penalty when `is_critical` is set. Dimension values are
/// "goodness" in [0, 1]: 1.0 means no defect on that axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub overall_score: f64,
    pub dimension_scores: BTreeMap<Dimension, f64>,
    /// Detection order; duplicates allowed.
    pub issues: Vec<IssueTag>,
    pub is_critical: bool,
}

impl QualityScore {
    pub fn dimension(&self, dimension: Dimension) -> f64 {
        self.dimension_scores.get(&dimension).copied().unwrap_or(0.0)
    }

    pub fn has_issue(&self, tag: IssueTag) -> bool {
        self.issues.contains(&tag)
    }

    pub fn critical_issues(&self) -> impl Iterator<Item = IssueTag> + '_ {
        self.issues.iter().copied().filter(IssueTag::is_critical)
    }

    /// Issues with duplicates removed, first occurrence kept.
    pub fn distinct_issues(&self) -> Vec<IssueTag> {
        let mut seen = Vec::with_capacity(self.issues.len());
        for issue in &self.issues {
            if !seen.contains(issue) {
                seen.push(*issue);
            }
        }
        seen
    }
}

// ═══════════════════════════════════════════════════════════
// Draft
// ═══════════════════════════════════════════════════════════

/// The working value threaded through one refinement run.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftAnswer {
    pub text: String,
    pub attempt_count: u32,
    score_history: Vec<QualityScore>,
    pub citations_present: bool,
}

impl DraftAnswer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attempt_count: 0,
            score_history: Vec::new(),
            citations_present: false,
        }
    }

    /// Append-only: earlier scores are never rewritten.
    pub fn push_score(&mut self, score: QualityScore) {
        self.score_history.push(score);
    }

    pub fn score_history(&self) -> &[QualityScore] {
        &self.score_history
    }

    pub fn latest_score(&self) -> Option<&QualityScore> {
        self.score_history.last()
    }

    pub fn into_score_history(self) -> Vec<QualityScore> {
        self.score_history
    }
}

// ═══════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Stop,
    Rewrite,
}

/// One canonical cause per decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Disabled,
    QualityAcceptable,
    UserRequestedTemplate,
    CriticalIssue,
    NoFurtherGain,
    BudgetExhausted,
    BelowThreshold,
    /// The caller went away; set by the orchestrator, never by the policy.
    Cancelled,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::QualityAcceptable => "quality acceptable",
            Self::UserRequestedTemplate => "user requested template",
            Self::CriticalIssue => "critical issue",
            Self::NoFurtherGain => "no further gain",
            Self::BudgetExhausted => "budget exhausted",
            Self::BelowThreshold => "below threshold",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable policy output.
///
/// Built only through [`RefinementDecision::stop`] and
/// [`RefinementDecision::rewrite`], so a `Rewrite` with no attempts left
/// cannot exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementDecision {
    action: DecisionAction,
    reason: DecisionReason,
    attempts_remaining: u32,
}

impl RefinementDecision {
    pub fn stop(reason: DecisionReason, attempts_remaining: u32) -> Self {
        Self {
            action: DecisionAction::Stop,
            reason,
            attempts_remaining,
        }
    }

    /// A rewrite request. With zero attempts remaining this degrades to
    /// `Stop` / budget exhausted.
    pub fn rewrite(reason: DecisionReason, attempts_remaining: u32) -> Self {
        if attempts_remaining == 0 {
            return Self::stop(DecisionReason::BudgetExhausted, 0);
        }
        Self {
            action: DecisionAction::Rewrite,
            reason,
            attempts_remaining,
        }
    }

    pub fn action(&self) -> DecisionAction {
        self.action
    }

    pub fn reason(&self) -> DecisionReason {
        self.reason
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.attempts_remaining
    }

    pub fn is_stop(&self) -> bool {
        self.action == DecisionAction::Stop
    }
}

// ═══════════════════════════════════════════════════════════
// Rewrite outcome
// ═══════════════════════════════════════════════════════════

/// Why a rewrite was not accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RewriteFailure {
    Timeout { after_secs: u64 },
    Cancelled,
    Transport { message: String },
    /// The draft is longer than the payload can carry; not sent.
    PayloadOverflow { draft_chars: usize, max_payload_chars: usize },
    EmptyOutput,
    BelowLengthFloor { chars: usize, floor: usize },
    DrasticShrink { input_chars: usize, output_chars: usize },
    Truncated,
}

impl fmt::Display for RewriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { after_secs } => write!(f, "timeout after {after_secs}s"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Transport { message } => write!(f, "transport error: {message}"),
            Self::PayloadOverflow {
                draft_chars,
                max_payload_chars,
            } => write!(
                f,
                "draft too long to rewrite ({draft_chars} chars, payload cap {max_payload_chars})"
            ),
            Self::EmptyOutput => f.write_str("empty output"),
            Self::BelowLengthFloor { chars, floor } => {
                write!(f, "output below length floor ({chars} < {floor} chars)")
            }
            Self::DrasticShrink {
                input_chars,
                output_chars,
            } => write!(
                f,
                "output drastically shorter than input ({output_chars} vs {input_chars} chars)"
            ),
            Self::Truncated => f.write_str("output appears truncated"),
        }
    }
}

/// Result of one call to the rewriting capability. Consumed exactly once
/// by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteOutcome {
    Rewritten { text: String },
    Failed { reason: RewriteFailure },
}

impl RewriteOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Rewritten { .. })
    }

    /// Rewritten text; `None` on failure.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Rewritten { text } => Some(text),
            Self::Failed { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Self::Rewritten { .. } => None,
            Self::Failed { reason } => Some(reason.to_string()),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Request / result
// ═══════════════════════════════════════════════════════════

/// A retrieved source the answer may cite as `[id]`. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// 1-based citation index.
    pub id: u32,
    pub content: String,
}

impl SourceDocument {
    pub fn new(id: u32, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
        }
    }
}

/// Everything the caller hands to `Refiner::refine`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefineRequest {
    pub draft: String,
    pub question: String,
    #[serde(default)]
    pub sources: Vec<SourceDocument>,
    #[serde(default)]
    pub mode: RefinementMode,
    /// Expected answer language (ISO 639-1, e.g. "en"). `None` uses the
    /// configured default.
    #[serde(default)]
    pub language: Option<String>,
}

impl RefineRequest {
    pub fn new(draft: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            draft: draft.into(),
            question: question.into(),
            sources: Vec::new(),
            mode: RefinementMode::default(),
            language: None,
        }
    }

    pub fn with_sources(mut self, sources: Vec<SourceDocument>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_mode(mut self, mode: RefinementMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Structured account of one refinement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Rewrite attempts actually performed (failed ones included).
    pub attempts: u32,
    pub final_score: QualityScore,
    /// Every score computed inside the loop, in order.
    pub score_history: Vec<QualityScore>,
    pub decisions: Vec<RefinementDecision>,
    pub stop_reason: DecisionReason,
    /// Present on the first score, gone from the final one.
    pub resolved_issues: Vec<IssueTag>,
    pub unresolved_issues: Vec<IssueTag>,
    pub rewrite_failures: Vec<RewriteFailure>,
    pub citations_present: bool,
    pub citation_patched: bool,
    pub normalization_reverted: bool,
    pub fallback_used: bool,
    pub cancelled: bool,
}

/// What the caller always gets back: a usable string and a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementResult {
    pub text: String,
    pub report: QualityReport,
}
