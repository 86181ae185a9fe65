//! Refinement configuration.
//!
//! Every numeric threshold the pipeline uses lives here: attempt budgets,
//! acceptable-score thresholds, dimension weights, length floors and the
//! rewrite timeout. The values are product-tuning constants, so they are
//! loaded from JSON instead of being hard-coded in the stages.
//!
//! A `RefinementConfig` is built once, validated, and handed read-only to
//! the `Refiner`. Nothing in the pipeline mutates it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::types::{Dimension, RefinementMode};

/// Application-level constants
pub const APP_NAME: &str = "answer-polish";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "ANSWER_POLISH_CONFIG";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "answer_polish=info"
}

/// Per-user config file location (`<config_dir>/answer-polish/config.json`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.json"))
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ═══════════════════════════════════════════════════════════
// Sections
// ═══════════════════════════════════════════════════════════

/// Budget and acceptance threshold for one refinement mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeSettings {
    /// Maximum rewrite attempts for one request.
    pub max_attempts: u32,
    /// Overall score at or above which a non-critical answer is accepted.
    pub acceptable_threshold: f64,
}

/// Decision policy knobs shared by all modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    /// A rewrite that improves the overall score by less than this is
    /// treated as diminishing returns.
    pub min_improvement_delta: f64,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            min_improvement_delta: 0.05,
        }
    }
}

/// Weight of each dimension in the overall score. Must sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionWeights {
    pub depth: f64,
    pub structure: f64,
    pub template_likeness: f64,
    pub anthropomorphism: f64,
    pub topic_drift: f64,
    pub citation_presence: f64,
    pub language_match: f64,
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self {
            depth: 0.25,
            structure: 0.20,
            template_likeness: 0.15,
            anthropomorphism: 0.15,
            topic_drift: 0.10,
            citation_presence: 0.10,
            language_match: 0.05,
        }
    }
}

impl DimensionWeights {
    pub fn weight(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Depth => self.depth,
            Dimension::Structure => self.structure,
            Dimension::TemplateLikeness => self.template_likeness,
            Dimension::Anthropomorphism => self.anthropomorphism,
            Dimension::TopicDrift => self.topic_drift,
            Dimension::CitationPresence => self.citation_presence,
            Dimension::LanguageMatch => self.language_match,
        }
    }

    pub fn total(&self) -> f64 {
        Dimension::ALL.iter().map(|d| self.weight(*d)).sum()
    }
}

/// Scorer thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    pub weights: DimensionWeights,
    /// Multiplier applied to the weighted sum when any critical issue is present.
    pub critical_penalty: f64,
    /// Minimum characters for a question that needs deep treatment.
    pub min_chars_deep: usize,
    /// Minimum characters for an ordinary question.
    pub min_chars_ordinary: usize,
    /// Analytical markers per 100 words below which depth is "low".
    pub depth_medium_density: f64,
    /// Analytical markers per 100 words at or above which depth is "high".
    pub depth_high_density: f64,
    /// Argumentative connectives needed for full structure credit.
    pub min_connectives: usize,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            weights: DimensionWeights::default(),
            critical_penalty: 0.3,
            min_chars_deep: 600,
            min_chars_ordinary: 150,
            depth_medium_density: 0.5,
            depth_high_density: 1.5,
            min_connectives: 3,
        }
    }
}

/// Style normalizer safety limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeSettings {
    /// A transform that removes more than this fraction of the characters
    /// is reverted.
    pub max_shrink_ratio: f64,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            max_shrink_ratio: 0.5,
        }
    }
}

/// Rewrite invoker limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteSettings {
    /// Hard timeout around one call to the rewriting capability.
    pub timeout_secs: u64,
    /// Rewritten text shorter than this is rejected.
    pub min_output_chars: usize,
    /// Rewritten text shorter than `input * ratio` is rejected as corrupted.
    pub min_length_ratio: f64,
    /// Upper bound on the instruction payload sent to the rewriter.
    pub max_payload_chars: usize,
    /// Source documents included as rewrite context.
    pub max_context_docs: usize,
    /// Characters kept from each context document.
    pub max_doc_chars: usize,
}

impl Default for RewriteSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            min_output_chars: 40,
            min_length_ratio: 0.5,
            max_payload_chars: 8_000,
            max_context_docs: 3,
            max_doc_chars: 600,
        }
    }
}

impl RewriteSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Score cache sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub capacity: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            capacity: 10_000,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

// ═══════════════════════════════════════════════════════════
// RefinementConfig
// ═══════════════════════════════════════════════════════════

/// Complete, read-only pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    pub light: ModeSettings,
    pub aggressive: ModeSettings,
    pub policy: PolicySettings,
    pub scoring: ScoringSettings,
    pub normalize: NormalizeSettings,
    pub rewrite: RewriteSettings,
    pub cache: CacheSettings,
    /// Language assumed when a request does not name one.
    pub default_language: String,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            light: ModeSettings {
                max_attempts: 2,
                acceptable_threshold: 0.4,
            },
            aggressive: ModeSettings {
                max_attempts: 3,
                acceptable_threshold: 0.5,
            },
            policy: PolicySettings::default(),
            scoring: ScoringSettings::default(),
            normalize: NormalizeSettings::default(),
            rewrite: RewriteSettings::default(),
            cache: CacheSettings::default(),
            default_language: "en".to_string(),
        }
    }
}

impl RefinementConfig {
    /// Budget and threshold for a mode. `Off` never rewrites.
    pub fn mode_settings(&self, mode: RefinementMode) -> ModeSettings {
        match mode {
            RefinementMode::Off => ModeSettings {
                max_attempts: 0,
                acceptable_threshold: self.light.acceptable_threshold,
            },
            RefinementMode::Light => self.light,
            RefinementMode::Aggressive => self.aggressive,
        }
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Resolve config from the environment.
    ///
    /// Order: `ANSWER_POLISH_CONFIG` path, then the per-user config file if
    /// it exists, then built-in defaults. An explicitly named file that
    /// cannot be loaded is an error; a missing per-user file is not.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            tracing::info!(path = %path, "Loading refinement config from env path");
            return Self::from_json_file(Path::new(&path));
        }
        if let Some(path) = default_config_path().filter(|p| p.exists()) {
            tracing::info!(path = %path.display(), "Loading refinement config from user dir");
            return Self::from_json_file(&path);
        }
        tracing::debug!("No refinement config file found, using defaults");
        Ok(Self::default())
    }

    /// Reject values that would break scoring or termination guarantees.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, mode) in [("light", &self.light), ("aggressive", &self.aggressive)] {
            if !(0.0..=1.0).contains(&mode.acceptable_threshold) {
                return Err(ConfigError::Invalid(format!(
                    "{name}.acceptable_threshold must be within [0, 1], got {}",
                    mode.acceptable_threshold
                )));
            }
        }

        let total = self.scoring.weights.total();
        if (total - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Invalid(format!(
                "scoring.weights must sum to 1.0, got {total:.4}"
            )));
        }
        if Dimension::ALL
            .iter()
            .any(|d| self.scoring.weights.weight(*d) < 0.0)
        {
            return Err(ConfigError::Invalid(
                "scoring.weights must be non-negative".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.scoring.critical_penalty) {
            return Err(ConfigError::Invalid(format!(
                "scoring.critical_penalty must be within [0, 1], got {}",
                self.scoring.critical_penalty
            )));
        }
        if self.scoring.depth_medium_density > self.scoring.depth_high_density {
            return Err(ConfigError::Invalid(
                "scoring.depth_medium_density must not exceed depth_high_density".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.normalize.max_shrink_ratio) {
            return Err(ConfigError::Invalid(format!(
                "normalize.max_shrink_ratio must be within [0, 1), got {}",
                self.normalize.max_shrink_ratio
            )));
        }
        if self.rewrite.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "rewrite.timeout_secs must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.rewrite.min_length_ratio) {
            return Err(ConfigError::Invalid(format!(
                "rewrite.min_length_ratio must be within [0, 1], got {}",
                self.rewrite.min_length_ratio
            )));
        }
        if self.rewrite.max_payload_chars < 256 {
            return Err(ConfigError::Invalid(
                "rewrite.max_payload_chars must be at least 256".into(),
            ));
        }
        Ok(())
    }
}
