//! Rewrite invoker: the only stage that does I/O.
//!
//! Builds the bounded payload, calls the rewriter under a fixed timeout and
//! the caller's cancellation token, then classifies the output. Every
//! failure becomes `RewriteOutcome::Failed`; nothing here returns an error.

use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::output_sanitize::{is_likely_truncated, sanitize_llm_output};
use super::prompt::build_rewrite_payload;
use super::Rewriter;
use crate::config::RewriteSettings;
use crate::pipeline::types::{IssueTag, RewriteFailure, RewriteOutcome, SourceDocument};

/// Request context handed to the rewriter alongside the draft.
#[derive(Debug, Clone, Copy)]
pub struct RewriteContext<'a> {
    pub question: &'a str,
    pub sources: &'a [SourceDocument],
    pub language: &'a str,
}

/// Ask `rewriter` to fix `issues` in `text`.
pub async fn invoke_rewrite(
    rewriter: &dyn Rewriter,
    text: &str,
    issues: &[IssueTag],
    context: &RewriteContext<'_>,
    settings: &RewriteSettings,
    cancel: &CancellationToken,
) -> RewriteOutcome {
    let payload = build_rewrite_payload(
        text,
        issues,
        context.question,
        context.sources,
        context.language,
        settings,
    );
    if payload.draft_truncated {
        let draft_chars = text.chars().count();
        tracing::warn!(
            draft_chars,
            max_payload_chars = settings.max_payload_chars,
            "Draft does not fit the rewrite payload, skipping rewrite"
        );
        return RewriteOutcome::Failed {
            reason: RewriteFailure::PayloadOverflow {
                draft_chars,
                max_payload_chars: settings.max_payload_chars,
            },
        };
    }
    let start = Instant::now();

    let result = tokio::select! {
        _ = cancel.cancelled() => {
            tracing::warn!("Rewrite abandoned: request cancelled");
            return RewriteOutcome::Failed { reason: RewriteFailure::Cancelled };
        }
        r = tokio::time::timeout(settings.timeout(), rewriter.rewrite(&payload)) => r,
    };
    let elapsed_ms = start.elapsed().as_millis() as u64;

    let raw = match result {
        Err(_) => {
            tracing::warn!(timeout_secs = settings.timeout_secs, "Rewrite timed out");
            return RewriteOutcome::Failed {
                reason: RewriteFailure::Timeout {
                    after_secs: settings.timeout_secs,
                },
            };
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, elapsed_ms, "Rewrite transport failed");
            return RewriteOutcome::Failed {
                reason: RewriteFailure::Transport {
                    message: e.to_string(),
                },
            };
        }
        Ok(Ok(raw)) => raw,
    };

    let outcome = classify_output(text, &raw, settings);
    match &outcome {
        RewriteOutcome::Rewritten { text: rewritten } => tracing::info!(
            input_chars = text.chars().count(),
            output_chars = rewritten.chars().count(),
            elapsed_ms,
            "Rewrite accepted"
        ),
        RewriteOutcome::Failed { reason } => tracing::warn!(
            reason = %reason,
            raw_chars = raw.chars().count(),
            elapsed_ms,
            "Rewrite rejected"
        ),
    }
    outcome
}

/// Sanitize raw rewriter output and apply the acceptance checks, in order:
/// empty, below the length floor, drastic shrink, truncation.
pub fn classify_output(input: &str, raw: &str, settings: &RewriteSettings) -> RewriteOutcome {
    let cleaned = sanitize_llm_output(raw);
    let output_chars = cleaned.chars().count();
    let input_chars = input.chars().count();

    let failure = if cleaned.is_empty() {
        Some(RewriteFailure::EmptyOutput)
    } else if output_chars < settings.min_output_chars {
        Some(RewriteFailure::BelowLengthFloor {
            chars: output_chars,
            floor: settings.min_output_chars,
        })
    } else if (output_chars as f64) < input_chars as f64 * settings.min_length_ratio {
        Some(RewriteFailure::DrasticShrink {
            input_chars,
            output_chars,
        })
    } else if is_likely_truncated(&cleaned) {
        Some(RewriteFailure::Truncated)
    } else {
        None
    };

    match failure {
        Some(reason) => RewriteOutcome::Failed { reason },
        None => RewriteOutcome::Rewritten { text: cleaned },
    }
}
