//! Refinement orchestrator.
//!
//! Drives one request through `Normalize → Score → Decide → {Finalize |
//! Invoke → Normalize → …}` and always hands back a usable answer plus a
//! quality report. The loop is bounded by the attempt budget, so it ends
//! within `max_attempts + 1` score evaluations whatever the rewriter does.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::cache::{cache_key, MokaScoreCache, ScoreCache};
use super::citation::{accept_patch, check_citations, CitationPatcher, MarkerPatcher};
use super::classify::{classify_question, QuestionProfile};
use super::fallback::fallback_message_i18n;
use super::language::{detect_language, primary_subtag};
use super::normalize::{normalize_style, NormalizeEdit};
use super::policy::{decide, AttemptHistory};
use super::rewrite::{invoke_rewrite, RewriteContext, Rewriter};
use super::scorer::{flag_removed_phrasing, score_answer, ScoringRequest};
use super::types::{
    DecisionReason, DraftAnswer, IssueTag, QualityReport, QualityScore, RefineRequest,
    RefinementDecision, RefinementResult, RewriteFailure, RewriteOutcome,
};
use crate::config::RefinementConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Normalize,
    Score,
    Decide,
    Invoke,
    Finalize,
}

/// Composes the pipeline stages around injected collaborators.
///
/// Configuration is read-only after construction; the cache is the only
/// state shared between concurrent `refine` calls.
pub struct Refiner {
    config: Arc<RefinementConfig>,
    rewriter: Arc<dyn Rewriter>,
    patcher: Arc<dyn CitationPatcher>,
    cache: Arc<dyn ScoreCache>,
}

impl Refiner {
    /// Refiner with the local citation patcher and an in-memory score cache
    /// sized from `config.cache`.
    pub fn new(config: RefinementConfig, rewriter: Arc<dyn Rewriter>) -> Self {
        let cache = Arc::new(MokaScoreCache::new(&config.cache));
        Self {
            config: Arc::new(config),
            rewriter,
            patcher: Arc::new(MarkerPatcher),
            cache,
        }
    }

    pub fn with_citation_patcher(mut self, patcher: Arc<dyn CitationPatcher>) -> Self {
        self.patcher = patcher;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ScoreCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    /// Refine a draft answer. Never fails: every error is recovered and
    /// reflected in the report.
    pub async fn refine(&self, request: &RefineRequest) -> RefinementResult {
        self.refine_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`Refiner::refine`], but stops early when `cancel` fires. An
    /// in-flight rewrite is abandoned and the best answer so far returned.
    pub async fn refine_with_cancel(
        &self,
        request: &RefineRequest,
        cancel: &CancellationToken,
    ) -> RefinementResult {
        let span = tracing::info_span!(
            "refine",
            request_id = %Uuid::new_v4(),
            mode = %request.mode
        );
        self.run(request, cancel).instrument(span).await
    }

    async fn run(&self, request: &RefineRequest, cancel: &CancellationToken) -> RefinementResult {
        let config = &self.config;
        let mode = request.mode;
        let budget = config.mode_settings(mode);
        let profile = classify_question(&request.question);
        let language = expected_language(request, &config.default_language);

        tracing::info!(
            draft_chars = request.draft.chars().count(),
            sources = request.sources.len(),
            max_attempts = budget.max_attempts,
            requires_depth = profile.requires_depth,
            requests_template = profile.requests_template,
            requires_citation = profile.requires_citation,
            "Refinement started"
        );

        let mut draft = DraftAnswer::new(request.draft.clone());
        let mut history = AttemptHistory::default();
        let mut decisions: Vec<RefinementDecision> = Vec::new();
        let mut failures: Vec<RewriteFailure> = Vec::new();
        // (text, score, phrasing removed by the normalizer)
        let mut best: Option<(String, QualityScore, bool)> = None;
        let mut phrasing_removed = false;
        let mut stop_reason = DecisionReason::Disabled;
        let mut normalization_reverted = false;
        let mut cancelled = false;

        let mut stage = Stage::Normalize;
        while stage != Stage::Finalize {
            stage = match stage {
                Stage::Normalize => {
                    let normalized = normalize_style(&draft.text, mode, &config.normalize);
                    normalization_reverted |= normalized.reverted;
                    phrasing_removed = normalized
                        .edits
                        .contains(&NormalizeEdit::ExperientialPhrasingRemoved);
                    draft.text = normalized.text;
                    Stage::Score
                }
                Stage::Score => {
                    let mut score = self.score(&draft.text, request, &profile, &language);
                    if phrasing_removed {
                        score = flag_removed_phrasing(score, &config.scoring);
                    }
                    if check_citations(&draft.text, &request.sources, &profile).has_citation {
                        draft.citations_present = true;
                    }
                    // Ties go to the later draft.
                    let improves = best
                        .as_ref()
                        .map_or(true, |(_, b, _)| score.overall_score >= b.overall_score);
                    if improves {
                        best = Some((draft.text.clone(), score.clone(), phrasing_removed));
                    }
                    draft.push_score(score);
                    Stage::Decide
                }
                Stage::Decide => {
                    if cancel.is_cancelled() {
                        cancelled = true;
                        stop_reason = DecisionReason::Cancelled;
                        tracing::info!("Refinement cancelled by caller");
                        Stage::Finalize
                    } else {
                        match draft.latest_score() {
                            Some(score) => {
                                let decision = decide(
                                    score,
                                    &history,
                                    &profile,
                                    mode,
                                    &budget,
                                    &config.policy,
                                );
                                tracing::info!(
                                    action = ?decision.action(),
                                    reason = %decision.reason(),
                                    attempts_remaining = decision.attempts_remaining(),
                                    overall = score.overall_score,
                                    critical = score.is_critical,
                                    "Refinement decision"
                                );
                                decisions.push(decision);
                                if decision.is_stop() {
                                    stop_reason = decision.reason();
                                    Stage::Finalize
                                } else {
                                    Stage::Invoke
                                }
                            }
                            None => Stage::Score,
                        }
                    }
                }
                Stage::Invoke => {
                    let (issues, previous) = match draft.latest_score() {
                        Some(score) => (score.distinct_issues(), score.overall_score),
                        None => (Vec::new(), 0.0),
                    };
                    draft.attempt_count += 1;
                    history.attempts_made += 1;

                    let context = RewriteContext {
                        question: &request.question,
                        sources: &request.sources,
                        language: &language,
                    };
                    let outcome = invoke_rewrite(
                        self.rewriter.as_ref(),
                        &draft.text,
                        &issues,
                        &context,
                        &config.rewrite,
                        cancel,
                    )
                    .await;

                    match outcome {
                        RewriteOutcome::Rewritten { text } => {
                            history.previous_overall = Some(previous);
                            draft.text = text;
                            Stage::Normalize
                        }
                        RewriteOutcome::Failed { reason } => {
                            tracing::warn!(
                                attempt = draft.attempt_count,
                                reason = %reason,
                                "Rewrite failed, keeping previous draft"
                            );
                            let was_cancelled = reason == RewriteFailure::Cancelled;
                            failures.push(reason);
                            // An unchanged draft says nothing about diminishing returns.
                            history.previous_overall = None;
                            if was_cancelled {
                                cancelled = true;
                                stop_reason = DecisionReason::Cancelled;
                                Stage::Finalize
                            } else {
                                Stage::Decide
                            }
                        }
                    }
                }
                Stage::Finalize => Stage::Finalize,
            };
        }

        let (mut text, mut final_score, best_phrasing_removed) = match best {
            Some(best) => best,
            None => {
                let score = self.score(&draft.text, request, &profile, &language);
                (draft.text.clone(), score, false)
            }
        };
        if text != draft.text {
            tracing::info!(
                attempts = draft.attempt_count,
                "Later rewrite scored lower, returning best earlier draft"
            );
        }
        let chosen = text.clone();

        // A remote patcher is skipped once the caller has gone away.
        let citation_patched = if cancelled && !self.patcher.is_local() {
            false
        } else {
            self.restore_citations(&mut text, request, &profile, draft.citations_present)
                .await
        };

        let mut fallback_used = false;
        if text.trim().is_empty() {
            tracing::error!(
                attempts = draft.attempt_count,
                language = %language,
                "Refined answer is empty, substituting fallback message"
            );
            text = fallback_message_i18n(&language).to_string();
            fallback_used = true;
        }

        if text != chosen {
            final_score = self.score(&text, request, &profile, &language);
            if best_phrasing_removed && !fallback_used {
                final_score = flag_removed_phrasing(final_score, &config.scoring);
            }
        }

        let initial_issues = draft
            .score_history()
            .first()
            .map(QualityScore::distinct_issues)
            .unwrap_or_default();
        let unresolved_issues = final_score.distinct_issues();
        let resolved_issues: Vec<IssueTag> = initial_issues
            .into_iter()
            .filter(|issue| !unresolved_issues.contains(issue))
            .collect();
        let citations_present =
            check_citations(&text, &request.sources, &profile).has_citation;

        tracing::info!(
            attempts = draft.attempt_count,
            evaluations = draft.score_history().len(),
            final_overall = final_score.overall_score,
            stop_reason = %stop_reason,
            resolved = resolved_issues.len(),
            unresolved = unresolved_issues.len(),
            rewrite_failures = failures.len(),
            citation_patched,
            fallback_used,
            cancelled,
            "Refinement complete"
        );

        let attempts = draft.attempt_count;
        RefinementResult {
            text,
            report: QualityReport {
                attempts,
                final_score,
                score_history: draft.into_score_history(),
                decisions,
                stop_reason,
                resolved_issues,
                unresolved_issues,
                rewrite_failures: failures,
                citations_present,
                citation_patched,
                normalization_reverted,
                fallback_used,
                cancelled,
            },
        }
    }

    /// Score through the shared cache.
    fn score(
        &self,
        text: &str,
        request: &RefineRequest,
        profile: &QuestionProfile,
        language: &str,
    ) -> QualityScore {
        let key = cache_key(
            &request.question,
            text,
            request.mode,
            language,
            &request.sources,
        );
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!("Score cache hit");
            return cached;
        }
        let scoring = ScoringRequest {
            profile,
            sources: &request.sources,
            expected_language: language,
        };
        let score = score_answer(text, &scoring, &self.config.scoring);
        self.cache.set(&key, score.clone(), self.config.cache.ttl());
        score
    }

    /// Re-check citations on the final text and patch a marker back in when
    /// one is required or was lost during rewriting. Returns whether a patch
    /// was applied.
    async fn restore_citations(
        &self,
        text: &mut String,
        request: &RefineRequest,
        profile: &QuestionProfile,
        citations_seen: bool,
    ) -> bool {
        let report = check_citations(text, &request.sources, profile);
        if report.has_citation || !report.sources_available {
            return false;
        }
        if !report.citation_required && !citations_seen {
            return false;
        }
        if citations_seen {
            tracing::warn!("Citation markers lost during rewriting");
        }

        match self.patcher.patch(text, &request.sources, &request.question).await {
            Ok(Some(patched)) if accept_patch(text, &patched, &request.sources) => {
                tracing::info!(
                    markers = super::citation::extract_markers(&patched).len(),
                    "Citation marker restored"
                );
                *text = patched;
                true
            }
            Ok(Some(_)) => {
                tracing::warn!("Citation patch rejected: it changed more than markers");
                false
            }
            Ok(None) => {
                tracing::debug!("Citation patcher had nothing to insert");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Citation patch failed");
                false
            }
        }
    }
}

/// Expected answer language when the request names none: the question's
/// language, then the draft's (short questions are often undetectable),
/// then the configured default.
fn expected_language(request: &RefineRequest, default_language: &str) -> String {
    let tag = match request.language.as_deref() {
        Some(language) => language,
        None => detect_language(&request.question)
            .or_else(|| detect_language(&request.draft))
            .unwrap_or(default_language),
    };
    primary_subtag(tag)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::config::ModeSettings;
    use crate::pipeline::cache::NoopScoreCache;
    use crate::pipeline::citation::CitationPatchError;
    use crate::pipeline::fallback::FALLBACK_MESSAGE;
    use crate::pipeline::rewrite::{RewriteError, RewritePayload};
    use crate::pipeline::types::{DecisionAction, Dimension, RefinementMode, SourceDocument};

    const DEEP_QUESTION: &str = "What makes quantum mechanics beautiful, philosophically?";

    const ANTHROPOMORPHIC_DRAFT: &str = "I feel that quantum mechanics is beautiful because it \
        reveals a world that is stranger than intuition suggests. At first sight, a handful of \
        principles explains atoms, light and chemistry with remarkable economy. The \
        superposition principle says that a system can occupy several states at once, and the \
        measurement problem asks how a single outcome emerges. Entanglement links distant \
        particles so that their properties are correlated beyond any classical explanation. \
        However, the formalism remains compact: a state vector, an evolution equation and a rule \
        for probabilities. Therefore the theory joins mathematical economy with conceptual \
        surprise, which is why physicists and philosophers keep returning to it.";

    const CLEAN_REWRITE: &str = "Quantum mechanics is often called beautiful because its formal \
        framework is both compact and surprising. However, the beauty is arguably not in the \
        equations alone but in the interpretation they invite. The underlying assumption of \
        classical physics was that measurement reveals pre-existing values; in contrast, the \
        quantum formalism implies that outcomes depend on the experimental context. Therefore \
        the theory forces a distinction between what is predicted and what is real. Moreover, \
        the tension between the unitary evolution and collapse remains a live paradox, and \
        each interpretation trades one limitation for another. In other words, the elegance \
        lies in how a few principles generate a wide range of consequences, although the \
        evidence does not settle which perspective is correct.";

    /// Returns scripted responses in order, repeating the last one.
    struct ScriptedRewriter {
        responses: Vec<Result<String, String>>,
        calls: AtomicUsize,
    }

    impl ScriptedRewriter {
        fn new(responses: Vec<Result<&str, &str>>) -> Self {
            Self {
                responses: responses
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }

        fn always(text: &str) -> Self {
            Self::new(vec![Ok(text)])
        }

        fn failing() -> Self {
            Self::new(vec![Err("connection refused")])
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Rewriter for ScriptedRewriter {
        async fn rewrite(&self, _payload: &RewritePayload) -> Result<String, RewriteError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let index = call.min(self.responses.len() - 1);
            self.responses[index]
                .clone()
                .map_err(RewriteError::HttpClient)
        }
    }

    struct SlowRewriter;

    #[async_trait]
    impl Rewriter for SlowRewriter {
        async fn rewrite(&self, _payload: &RewritePayload) -> Result<String, RewriteError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(CLEAN_REWRITE.to_string())
        }
    }

    /// Records the payloads it receives.
    struct RecordingRewriter {
        payloads: Mutex<Vec<RewritePayload>>,
    }

    #[async_trait]
    impl Rewriter for RecordingRewriter {
        async fn rewrite(&self, payload: &RewritePayload) -> Result<String, RewriteError> {
            if let Ok(mut payloads) = self.payloads.lock() {
                payloads.push(payload.clone());
            }
            Ok(CLEAN_REWRITE.to_string())
        }
    }

    /// Counts calls and never patches.
    struct CountingPatcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CitationPatcher for CountingPatcher {
        async fn patch(
            &self,
            _text: &str,
            _sources: &[SourceDocument],
            _question: &str,
        ) -> Result<Option<String>, CitationPatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    /// Violates the patch contract by adding words.
    struct InventingPatcher;

    #[async_trait]
    impl CitationPatcher for InventingPatcher {
        async fn patch(
            &self,
            text: &str,
            _sources: &[SourceDocument],
            _question: &str,
        ) -> Result<Option<String>, CitationPatchError> {
            Ok(Some(format!("{text} This is confirmed by historians [1].")))
        }
    }

    fn refiner(rewriter: Arc<dyn Rewriter>) -> Refiner {
        Refiner::new(RefinementConfig::default(), rewriter)
    }

    // =================================================================
    // END-TO-END SCENARIO
    // =================================================================

    #[tokio::test]
    async fn anthropomorphic_draft_is_rewritten_once() {
        assert!(ANTHROPOMORPHIC_DRAFT.chars().count() >= 600);
        let rewriter = Arc::new(ScriptedRewriter::always(CLEAN_REWRITE));
        let refiner = refiner(rewriter.clone());
        let request = RefineRequest::new(ANTHROPOMORPHIC_DRAFT, DEEP_QUESTION);

        let result = refiner.refine(&request).await;
        let report = &result.report;

        assert_eq!(report.attempts, 1);
        assert_eq!(rewriter.calls(), 1);
        assert_eq!(result.text, CLEAN_REWRITE);
        assert_eq!(report.stop_reason, DecisionReason::QualityAcceptable);
        assert!(report.resolved_issues.contains(&IssueTag::AnthropomorphicLanguage));
        assert!(!report.unresolved_issues.contains(&IssueTag::AnthropomorphicLanguage));

        assert_eq!(report.score_history.len(), 2);
        assert!(report.score_history[0].is_critical);
        assert!(report.score_history[0].has_issue(IssueTag::AnthropomorphicLanguage));
        assert_eq!(
            report.score_history[0].dimension(Dimension::Anthropomorphism),
            0.0
        );
        assert_eq!(report.decisions[0].action(), DecisionAction::Rewrite);
        assert_eq!(report.decisions[0].reason(), DecisionReason::CriticalIssue);
        assert!(report.decisions[1].is_stop());
        assert!(!report.final_score.is_critical);
    }

    #[tokio::test]
    async fn normalizer_strips_opener_before_first_score() {
        let rewriter = Arc::new(RecordingRewriter {
            payloads: Mutex::new(Vec::new()),
        });
        let refiner = refiner(rewriter.clone());
        let request = RefineRequest::new(ANTHROPOMORPHIC_DRAFT, DEEP_QUESTION);
        refiner.refine(&request).await;

        let payloads = rewriter.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        assert!(!payloads[0].prompt.contains("I feel that"));
        assert!(payloads[0].prompt.contains("Quantum mechanics is beautiful"));
        assert!(payloads[0].issues.contains(&IssueTag::AnthropomorphicLanguage));
    }

    // =================================================================
    // LANGUAGE
    // =================================================================

    const FRENCH_QUESTION: &str = "Pourquoi la théorie de la relativité a-t-elle changé la \
        façon dont les physiciens pensent le temps ?";

    const FRENCH_ANSWER: &str = "La relativité a montré que le temps n'est pas absolu. Deux \
        observateurs en mouvement l'un par rapport à l'autre ne mesurent pas la même durée \
        entre deux événements, et cette différence est confirmée par les horloges atomiques \
        embarquées dans les satellites.";

    #[tokio::test]
    async fn answer_in_question_language_is_kept_without_explicit_language() {
        let rewriter = Arc::new(ScriptedRewriter::always(CLEAN_REWRITE));
        let refiner = refiner(rewriter.clone());
        let request = RefineRequest::new(FRENCH_ANSWER, FRENCH_QUESTION);

        let result = refiner.refine(&request).await;

        assert!(!result.report.score_history[0].has_issue(IssueTag::LanguageMismatch));
        assert_eq!(rewriter.calls(), 0);
        assert_eq!(result.text, FRENCH_ANSWER);
        assert_eq!(result.report.stop_reason, DecisionReason::QualityAcceptable);
    }

    #[tokio::test]
    async fn explicit_language_still_flags_mismatch() {
        let rewriter = Arc::new(ScriptedRewriter::always(CLEAN_REWRITE));
        let refiner = refiner(rewriter.clone());
        let request = RefineRequest::new(FRENCH_ANSWER, FRENCH_QUESTION).with_language("en");

        let result = refiner.refine(&request).await;

        assert!(result.report.score_history[0].has_issue(IssueTag::LanguageMismatch));
        assert_eq!(result.report.decisions[0].reason(), DecisionReason::CriticalIssue);
    }

    #[test]
    fn expected_language_resolution_order() {
        let explicit = RefineRequest::new(FRENCH_ANSWER, FRENCH_QUESTION).with_language("de-AT");
        assert_eq!(expected_language(&explicit, "en"), "de");

        let from_question = RefineRequest::new("", FRENCH_QUESTION);
        assert_eq!(expected_language(&from_question, "en"), "fr");

        let from_draft = RefineRequest::new(FRENCH_ANSWER, "Pourquoi ?");
        assert_eq!(expected_language(&from_draft, "en"), "fr");

        let neither = RefineRequest::new("Short.", "Why?");
        assert_eq!(expected_language(&neither, "en"), "en");
    }

    // =================================================================
    // MODES AND POLICY OUTCOMES
    // =================================================================

    #[tokio::test]
    async fn off_mode_never_rewrites() {
        let rewriter = Arc::new(ScriptedRewriter::always(CLEAN_REWRITE));
        let refiner = refiner(rewriter.clone());
        let request = RefineRequest::new(ANTHROPOMORPHIC_DRAFT, DEEP_QUESTION)
            .with_mode(RefinementMode::Off);

        let result = refiner.refine(&request).await;

        assert_eq!(rewriter.calls(), 0);
        assert_eq!(result.report.attempts, 0);
        assert_eq!(result.report.stop_reason, DecisionReason::Disabled);
        assert_eq!(result.report.score_history.len(), 1);
    }

    #[tokio::test]
    async fn acceptable_draft_exits_early() {
        let rewriter = Arc::new(ScriptedRewriter::always(ANTHROPOMORPHIC_DRAFT));
        let refiner = refiner(rewriter.clone());
        let request = RefineRequest::new(CLEAN_REWRITE, DEEP_QUESTION);

        let result = refiner.refine(&request).await;

        assert_eq!(rewriter.calls(), 0);
        assert_eq!(result.text, CLEAN_REWRITE);
        assert_eq!(result.report.stop_reason, DecisionReason::QualityAcceptable);
        assert!(result.report.resolved_issues.is_empty());
    }

    #[tokio::test]
    async fn requested_template_is_kept() {
        let rewriter = Arc::new(ScriptedRewriter::always(CLEAN_REWRITE));
        let refiner = refiner(rewriter.clone());
        let draft = "1. Memory safety without a garbage collector.\n\
                     2. Fearless concurrency.\n\
                     3. A helpful compiler.\n\
                     4. Cargo and crates.io.\n\
                     5. Zero-cost abstractions.";
        let request = RefineRequest::new(draft, "Give me 5 reasons to learn Rust");

        let result = refiner.refine(&request).await;

        assert_eq!(rewriter.calls(), 0);
        assert_eq!(result.report.stop_reason, DecisionReason::UserRequestedTemplate);
        assert!(result.report.final_score.has_issue(IssueTag::TemplateLike));
        assert_eq!(result.text, draft);
    }

    // =================================================================
    // TERMINATION AND FAILURES
    // =================================================================

    #[tokio::test]
    async fn loop_terminates_within_budget_when_never_converging() {
        let still_critical = format!("{CLEAN_REWRITE} I remember when this idea first struck me.");
        let rewriter = Arc::new(ScriptedRewriter::always(&still_critical));
        let refiner = refiner(rewriter.clone()).with_cache(Arc::new(NoopScoreCache));
        let request = RefineRequest::new(ANTHROPOMORPHIC_DRAFT, DEEP_QUESTION)
            .with_mode(RefinementMode::Aggressive);

        let result = refiner.refine(&request).await;
        let max = refiner.config().aggressive.max_attempts;

        assert_eq!(result.report.attempts, max);
        assert_eq!(rewriter.calls(), max as usize);
        assert_eq!(result.report.score_history.len(), max as usize + 1);
        assert!(result.report.decisions.last().unwrap().is_stop());
        assert!(!result.text.is_empty());
    }

    #[tokio::test]
    async fn failing_rewriter_keeps_draft() {
        let rewriter = Arc::new(ScriptedRewriter::failing());
        let refiner = refiner(rewriter.clone());
        let request = RefineRequest::new(ANTHROPOMORPHIC_DRAFT, DEEP_QUESTION);

        let result = refiner.refine(&request).await;
        let report = &result.report;

        assert_eq!(report.attempts, 2);
        assert_eq!(rewriter.calls(), 2);
        assert_eq!(report.rewrite_failures.len(), 2);
        assert!(matches!(report.rewrite_failures[0], RewriteFailure::Transport { .. }));
        assert_eq!(report.stop_reason, DecisionReason::BudgetExhausted);
        assert_eq!(report.score_history.len(), 1);
        assert!(result.text.starts_with("Quantum mechanics is beautiful"));
        assert!(report.unresolved_issues.contains(&IssueTag::AnthropomorphicLanguage));
    }

    #[tokio::test]
    async fn empty_draft_gets_fallback() {
        let refiner = refiner(Arc::new(ScriptedRewriter::failing()));
        let request = RefineRequest::new("   ", "What is the capital of Peru?");

        let result = refiner.refine(&request).await;

        assert_eq!(result.text, FALLBACK_MESSAGE);
        assert!(result.report.fallback_used);
    }

    #[tokio::test]
    async fn fallback_follows_request_language() {
        let refiner = refiner(Arc::new(ScriptedRewriter::failing()));
        let request =
            RefineRequest::new("", "Quelle est la capitale du Pérou ?").with_language("fr");

        let result = refiner.refine(&request).await;

        assert!(result.report.fallback_used);
        assert!(result.text.contains("reformuler"));
    }

    #[tokio::test]
    async fn worse_rewrite_is_not_returned() {
        let config = RefinementConfig {
            light: ModeSettings {
                max_attempts: 2,
                acceptable_threshold: 0.99,
            },
            ..RefinementConfig::default()
        };
        let worse = "1. I remember when I first read about quantum mechanics as a student in a \
            quiet library.\n\
            2. I was deeply moved by superposition and by entanglement between distant \
            particles.\n\
            3. As an AI, I find my own consciousness strangely similar to a wave function.\n\
            4. In conclusion, I hope this helps you see why it is beautiful and worth learning \
            about.\n\
            5. Great question, and the theory keeps surprising everyone who studies it.";
        let refiner = Refiner::new(config, Arc::new(ScriptedRewriter::always(worse)));
        let request = RefineRequest::new(ANTHROPOMORPHIC_DRAFT, DEEP_QUESTION);

        let result = refiner.refine(&request).await;
        let history = &result.report.score_history;

        assert_eq!(result.report.attempts, 2);
        let best = history
            .iter()
            .map(|s| s.overall_score)
            .fold(f64::MIN, f64::max);
        assert_eq!(result.report.final_score.overall_score, best);
        assert_ne!(result.text, worse);
    }

    // =================================================================
    // CANCELLATION
    // =================================================================

    #[tokio::test]
    async fn cancelled_before_start_returns_draft() {
        let rewriter = Arc::new(ScriptedRewriter::always(CLEAN_REWRITE));
        let refiner = refiner(rewriter.clone());
        let request = RefineRequest::new(ANTHROPOMORPHIC_DRAFT, DEEP_QUESTION);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = refiner.refine_with_cancel(&request, &cancel).await;

        assert_eq!(rewriter.calls(), 0);
        assert!(result.report.cancelled);
        assert_eq!(result.report.stop_reason, DecisionReason::Cancelled);
        assert!(!result.text.is_empty());
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_rewrite() {
        let refiner = refiner(Arc::new(SlowRewriter));
        let request = RefineRequest::new(ANTHROPOMORPHIC_DRAFT, DEEP_QUESTION);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            refiner.refine_with_cancel(&request, &cancel),
        )
        .await
        .expect("refine should return promptly after cancellation");

        assert!(result.report.cancelled);
        assert_eq!(result.report.attempts, 1);
        assert_eq!(result.report.rewrite_failures, vec![RewriteFailure::Cancelled]);
        assert!(result.text.starts_with("Quantum mechanics is beautiful"));
    }

    #[tokio::test]
    async fn local_patcher_still_runs_after_cancellation() {
        let rewriter = Arc::new(ScriptedRewriter::always(CLEAN_REWRITE));
        let refiner = refiner(rewriter.clone());
        let request = RefineRequest::new(WESTPHALIA_REWRITE, WESTPHALIA_QUESTION)
            .with_sources(westphalia_sources());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = refiner.refine_with_cancel(&request, &cancel).await;

        assert_eq!(rewriter.calls(), 0);
        assert!(result.report.cancelled);
        assert!(result.report.citation_patched);
        assert!(result.report.citations_present);
        assert!(result.text.contains("[1]"));
    }

    #[tokio::test]
    async fn remote_patcher_is_skipped_after_cancellation() {
        let patcher = Arc::new(CountingPatcher {
            calls: AtomicUsize::new(0),
        });
        let refiner = refiner(Arc::new(ScriptedRewriter::always(CLEAN_REWRITE)))
            .with_citation_patcher(patcher.clone());
        let request = RefineRequest::new(WESTPHALIA_REWRITE, WESTPHALIA_QUESTION)
            .with_sources(westphalia_sources());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = refiner.refine_with_cancel(&request, &cancel).await;

        assert!(result.report.cancelled);
        assert!(!result.report.citation_patched);
        assert_eq!(patcher.calls.load(Ordering::SeqCst), 0);
    }

    // =================================================================
    // CITATIONS
    // =================================================================

    fn westphalia_sources() -> Vec<SourceDocument> {
        vec![SourceDocument::new(
            1,
            "The Peace of Westphalia was signed in 1648 and ended the Thirty Years War.",
        )]
    }

    const WESTPHALIA_QUESTION: &str = "When was the Peace of Westphalia signed?";
    const WESTPHALIA_DRAFT: &str =
        "I remember when I first read that the Peace of Westphalia was signed in 1648 [1].";
    const WESTPHALIA_REWRITE: &str = "The Peace of Westphalia was signed in 1648. It ended the \
        Thirty Years War and reshaped European diplomacy, because it recognised sovereign states. \
        Historians therefore treat it as the start of the modern state system.";

    #[tokio::test]
    async fn lost_citation_is_patched_back() {
        let refiner = refiner(Arc::new(ScriptedRewriter::always(WESTPHALIA_REWRITE)));
        let request = RefineRequest::new(WESTPHALIA_DRAFT, WESTPHALIA_QUESTION)
            .with_sources(westphalia_sources());

        let result = refiner.refine(&request).await;

        assert!(result.report.citation_patched);
        assert!(result.report.citations_present);
        assert!(result.text.starts_with("The Peace of Westphalia was signed in 1648 [1]."));
        assert!(!result.report.final_score.has_issue(IssueTag::MissingCitation));
    }

    #[tokio::test]
    async fn patch_that_adds_content_is_rejected() {
        let refiner = refiner(Arc::new(ScriptedRewriter::always(WESTPHALIA_REWRITE)))
            .with_citation_patcher(Arc::new(InventingPatcher));
        let request = RefineRequest::new(WESTPHALIA_DRAFT, WESTPHALIA_QUESTION)
            .with_sources(westphalia_sources());

        let result = refiner.refine(&request).await;

        assert!(!result.report.citation_patched);
        assert!(!result.text.contains("historians [1]"));
    }

    #[tokio::test]
    async fn no_sources_leaves_text_unpatched() {
        let refiner = refiner(Arc::new(ScriptedRewriter::always(WESTPHALIA_REWRITE)));
        let request = RefineRequest::new(WESTPHALIA_DRAFT, WESTPHALIA_QUESTION);

        let result = refiner.refine(&request).await;

        assert!(!result.report.citation_patched);
        assert_eq!(result.text, WESTPHALIA_REWRITE);
    }

    // =================================================================
    // REPORT
    // =================================================================

    #[tokio::test]
    async fn report_serializes_to_json() {
        let refiner = refiner(Arc::new(ScriptedRewriter::always(CLEAN_REWRITE)));
        let request = RefineRequest::new(ANTHROPOMORPHIC_DRAFT, DEEP_QUESTION);

        let result = refiner.refine(&request).await;
        let json = serde_json::to_value(&result.report).unwrap();

        assert_eq!(json["attempts"], 1);
        assert_eq!(json["stop_reason"], "quality_acceptable");
        let resolved = json["resolved_issues"].as_array().unwrap();
        assert!(resolved.iter().any(|v| v == "anthropomorphic-language"));
        assert!(json["final_score"]["dimension_scores"]["templateLikeness"].is_number());
    }
}
