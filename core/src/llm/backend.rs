//! OpenAI-compatible HTTP backend.
//!
//! The backend is deliberately thin: it serializes one request, checks the
//! HTTP status, and digs the text (or vectors) out of the response envelope.
//! Retry, tier routing, and JSON extraction all live in the gateway.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::llm::gateway::ChatRequest;
use crate::{FootfallError, Result};

/// Transport contract the gateway retries over.
///
/// Implemented by [`OpenAiBackend`] for real deployments and by scripted
/// fakes in tests.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// One chat completion against a concrete model. Returns the raw
    /// assistant text; JSON extraction happens a layer up.
    async fn chat(&self, model: &str, request: &ChatRequest) -> Result<String>;

    /// Batch embedding: one vector per input text, in input order.
    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Connection settings for [`OpenAiBackend`].
///
/// Defaults read the environment (`LLM_BASE_URL`, `LLM_API_KEY`,
/// `REQUEST_TIMEOUT_MS`, `LLM_TEMPERATURE`) so the same binary can point at
/// a local vLLM server or a hosted endpoint.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
    pub temperature: f32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8000/v1".to_string()),
            api_key: std::env::var("LLM_API_KEY").ok(),
            request_timeout_ms: std::env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120_000),
            temperature: std::env::var("LLM_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.7),
        }
    }
}

/// Chat + embeddings over any OpenAI-compatible server.
pub struct OpenAiBackend {
    http: reqwest::Client,
    config: BackendConfig,
}

impl OpenAiBackend {
    pub fn new(config: BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| {
                FootfallError::GatewayError(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(BackendConfig::default())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = self.endpoint(path);
        let response = self
            .authorize(self.http.post(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| FootfallError::GatewayError(format!("POST {url} failed: {e}")))?;

        let status = response.status();
        let payload = response.text().await.map_err(|e| {
            FootfallError::GatewayError(format!("response body unreadable from {url}: {e}"))
        })?;
        if !status.is_success() {
            return Err(FootfallError::GatewayError(format!(
                "{path} returned {status}: {payload}"
            )));
        }
        serde_json::from_str(&payload).map_err(|e| {
            FootfallError::GatewayError(format!("{path} response is not JSON: {e}"))
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn chat(&self, model: &str, request: &ChatRequest) -> Result<String> {
        let mut body = json!({
            "model": model,
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "temperature": self.config.temperature,
        });
        if request.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }
        if let Some(budget) = request.thinking_budget {
            body["reasoning"] = json!({ "max_tokens": budget });
        }

        debug!(
            target = "llm.backend",
            model = %model,
            messages = request.messages.len(),
            json_mode = request.json_mode,
            "POST chat/completions"
        );
        let value = self.post_json("chat/completions", &body).await?;
        extract_message_content(&value).ok_or_else(|| {
            FootfallError::GatewayError(
                "chat response missing choices[0].message.content".to_string(),
            )
        })
    }

    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({ "model": model, "input": texts });
        debug!(
            target = "llm.backend",
            model = %model,
            count = texts.len(),
            "POST embeddings"
        );
        let value = self.post_json("embeddings", &body).await?;
        extract_embeddings(&value)
    }
}

fn extract_message_content(value: &Value) -> Option<String> {
    value
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

fn extract_embeddings(value: &Value) -> Result<Vec<Vec<f32>>> {
    let data = value.get("data").and_then(Value::as_array).ok_or_else(|| {
        FootfallError::GatewayError("embeddings response missing data array".to_string())
    })?;
    let mut out = Vec::with_capacity(data.len());
    for entry in data {
        let raw = entry
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                FootfallError::GatewayError("embeddings entry missing vector".to_string())
            })?;
        out.push(raw.iter().filter_map(Value::as_f64).map(|f| f as f32).collect());
    }
    Ok(out)
}
