use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::retry::{backoff, should_retry_status};
use crate::{CompletionError, CompletionRequest, CompletionService};

pub const DEFAULT_API_BASE: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama3-70b-8192";

#[derive(Debug, Clone)]
pub struct GroqConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    /// Upper bound for a single HTTP attempt.
    pub request_timeout_ms: u64,
    /// Retries after the first attempt, transient failures only.
    pub max_retries: usize,
}

impl GroqConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout_ms: 30_000,
            max_retries: 2,
        }
    }
}

/// Chat-completions client for Groq and other OpenAI-compatible providers.
#[derive(Debug, Clone)]
pub struct GroqClient {
    client: reqwest::Client,
    config: GroqConfig,
}

impl GroqClient {
    pub fn new(config: GroqConfig) -> anyhow::Result<Self> {
        let api_key = config.api_key.trim();
        if api_key.is_empty() {
            anyhow::bail!("completion API key is empty");
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {api_key}"))?);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;

        Ok(Self { client, config })
    }

    fn chat_completions_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            return base.to_string();
        }
        format!("{base}/chat/completions")
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(json!({ "role": "system", "content": request.system_prompt }));
        for turn in &request.history {
            messages.push(json!({ "role": turn.role, "content": turn.content }));
        }
        messages.push(json!({ "role": "user", "content": request.new_turn }));

        json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        })
    }

    async fn attempt(&self, url: &str, body: &Value) -> Result<String, CompletionError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| CompletionError::from_reqwest(&e))?;

        let status = response.status();
        let raw = response.text().await.map_err(|e| CompletionError::from_reqwest(&e))?;

        if status.is_success() {
            return parse_completion(&raw);
        }

        let detail = format!("HTTP {}: {}", status.as_u16(), truncate(&raw, 200));
        if should_retry_status(status.as_u16()) {
            Err(CompletionError::Transient(detail))
        } else {
            Err(CompletionError::Permanent(detail))
        }
    }
}

#[async_trait]
impl CompletionService for GroqClient {
    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, CompletionError> {
        let url = self.chat_completions_url();
        let body = self.request_body(&request);
        let max_retries = self.config.max_retries;

        let mut attempt = 0;
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CompletionError::Cancelled),
                result = self.attempt(&url, &body) => result,
            };

            match result {
                Ok(text) => return Ok(text),
                Err(error) if error.is_retryable() && attempt < max_retries => {
                    let delay = backoff(attempt);
                    warn!("Completion attempt {} failed ({}), retrying in {:?}", attempt + 1, error, delay);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(CompletionError::Cancelled),
                        _ = sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(error) => {
                    debug!("Completion failed after {} attempt(s): {}", attempt + 1, error);
                    return Err(error);
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

fn parse_completion(raw: &str) -> Result<String, CompletionError> {
    let parsed: ChatCompletion = serde_json::from_str(raw)
        .map_err(|e| CompletionError::Permanent(format!("malformed completion body: {e}")))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| CompletionError::Permanent("completion contained no text".to_string()))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
