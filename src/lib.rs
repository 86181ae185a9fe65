//! Response-quality refinement for generated answers.
//!
//! A draft answer is normalized, scored against fixed rule tables, and,
//! while the score is poor and the attempt budget lasts, sent to an
//! external rewriter. The caller always gets text back together with a
//! [`pipeline::QualityReport`].

pub mod config;
pub mod pipeline;

pub use config::{ConfigError, RefinementConfig};
pub use pipeline::{
    CitationPatcher, MarkerPatcher, MokaScoreCache, NoopScoreCache, OllamaRewriter, QualityReport,
    QualityScore, RefineRequest, RefinementMode, RefinementResult, Refiner, RewriteError,
    Rewriter, ScoreCache, SourceDocument,
};

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG`, defaulting to
/// [`config::default_log_filter`]. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    tracing::info!("{} v{} tracing initialized", config::APP_NAME, config::APP_VERSION);
}
