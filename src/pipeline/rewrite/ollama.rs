use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::prompt::RewritePayload;
use super::{RewriteError, Rewriter};

/// Default local Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Sampling temperature for rewrites. Low: the task is editing, not writing.
const REWRITE_TEMPERATURE: f32 = 0.3;

/// Ollama-backed rewriter using `/api/generate`.
pub struct OllamaRewriter {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl OllamaRewriter {
    /// Create a rewriter pointing at an Ollama instance.
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, RewriteError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RewriteError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        })
    }

    /// Local Ollama at the standard port with a 30-second timeout.
    pub fn default_local(model: &str) -> Result<Self, RewriteError> {
        Self::new(DEFAULT_OLLAMA_URL, model, 30)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Names of the models installed on the Ollama instance.
    pub async fn list_models(&self) -> Result<Vec<String>, RewriteError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_connect() {
                RewriteError::OllamaConnection(self.base_url.clone())
            } else {
                RewriteError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RewriteError::OllamaError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaTagsResponse = response
            .json()
            .await
            .map_err(|e| RewriteError::ResponseParsing(e.to_string()))?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    /// Whether a model whose name starts with `model` is installed.
    pub async fn is_model_available(&self, model: &str) -> Result<bool, RewriteError> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|m| m.starts_with(model)))
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[async_trait]
impl Rewriter for OllamaRewriter {
    async fn rewrite(&self, payload: &RewritePayload) -> Result<String, RewriteError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt: &payload.prompt,
            system: &payload.system,
            stream: false,
            options: OllamaOptions {
                temperature: REWRITE_TEMPERATURE,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    RewriteError::OllamaConnection(self.base_url.clone())
                } else if e.is_timeout() {
                    RewriteError::HttpClient(format!(
                        "Request timed out after {}s",
                        self.timeout_secs
                    ))
                } else {
                    RewriteError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RewriteError::OllamaError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| RewriteError::ResponseParsing(e.to_string()))?;

        Ok(parsed.response)
    }
}
