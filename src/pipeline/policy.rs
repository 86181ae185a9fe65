//! Refinement decision policy.
//!
//! Pure state transition from the latest score to `Stop` or `Rewrite`.
//! Rules are evaluated in a fixed priority order; the mode only changes the
//! attempt budget and the acceptable-score threshold.

use super::classify::QuestionProfile;
use super::types::{DecisionReason, IssueTag, QualityScore, RefinementDecision, RefinementMode};
use crate::config::{ModeSettings, PolicySettings};

/// What the orchestrator has done so far.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AttemptHistory {
    /// Rewrite attempts performed, failed ones included.
    pub attempts_made: u32,
    /// Overall score before the most recent rewrite. `None` on the first
    /// evaluation and after a rewrite that failed, since an unchanged text
    /// says nothing about diminishing returns.
    pub previous_overall: Option<f64>,
}

impl AttemptHistory {
    pub fn remaining(&self, budget: &ModeSettings) -> u32 {
        budget.max_attempts.saturating_sub(self.attempts_made)
    }
}

/// Decide what to do with the current draft.
pub fn decide(
    score: &QualityScore,
    history: &AttemptHistory,
    profile: &QuestionProfile,
    mode: RefinementMode,
    budget: &ModeSettings,
    settings: &PolicySettings,
) -> RefinementDecision {
    let remaining = history.remaining(budget);

    // 1. Disabled
    if mode == RefinementMode::Off {
        return RefinementDecision::stop(DecisionReason::Disabled, 0);
    }

    // 2. Early exit
    if score.overall_score >= budget.acceptable_threshold && !score.is_critical {
        return RefinementDecision::stop(DecisionReason::QualityAcceptable, remaining);
    }

    // 3. Template requested. Only template-likeness is excused: an answer
    // that is also anthropomorphic or uncited still gets rewritten.
    if profile.requests_template
        && score.critical_issues().all(|issue| issue == IssueTag::TemplateLike)
    {
        return RefinementDecision::stop(DecisionReason::UserRequestedTemplate, remaining);
    }

    // 4. Critical issue
    if score.is_critical && remaining > 0 {
        return RefinementDecision::rewrite(DecisionReason::CriticalIssue, remaining);
    }

    // 5. Diminishing returns or exhausted budget
    if let Some(previous) = history.previous_overall {
        if score.overall_score - previous < settings.min_improvement_delta {
            return RefinementDecision::stop(DecisionReason::NoFurtherGain, remaining);
        }
    }
    if remaining == 0 {
        return RefinementDecision::stop(DecisionReason::BudgetExhausted, 0);
    }

    // 6. Below threshold
    RefinementDecision::rewrite(DecisionReason::BelowThreshold, remaining)
}
