pub mod invoker;
pub mod ollama;
pub mod output_sanitize;
pub mod prompt;

pub use invoker::*;
pub use ollama::*;
pub use output_sanitize::*;
pub use prompt::*;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("Ollama is not running at {0}")]
    OllamaConnection(String),

    #[error("Ollama returned error (status {status}): {body}")]
    OllamaError { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),
}

/// The external rewriting capability (an LLM behind some transport).
///
/// Returns the raw model output; sanitation and acceptance checks are the
/// invoker's job. Implementations must be cancel-safe: the future may be
/// dropped at any await point on timeout or cancellation.
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(&self, payload: &RewritePayload) -> Result<String, RewriteError>;
}
