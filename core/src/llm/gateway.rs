//! Tiered gateway over an OpenAI-compatible chat backend.
//!
//! Every cognitive phase goes through [`LlmGateway::complete`]: the gateway
//! resolves the requested tier to a concrete model name, retries transient
//! failures with doubling backoff, and (in JSON mode) refuses to hand back a
//! response until a parseable JSON object could be carved out of it. Callers
//! therefore never see half-valid model output; they either get a JSON string
//! that parses or an error after the retry budget is spent.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::llm::backend::ChatBackend;
use crate::llm::json::extract_json_object;
use crate::llm::trace::CallLog;
use crate::{FootfallError, Result};

/// Which class of model a request should be routed to.
///
/// `Fast` is for high-volume structuring calls (perceive, act, importance
/// rating); `Deep` is for the slower synthesis calls (plan, reflect, wonder).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Fast,
    Deep,
}

/// Gateway routing and retry knobs.
///
/// Defaults come from the environment so a deployment can repoint models
/// without a rebuild: `LLM_FAST_MODEL`, `LLM_DEEP_MODEL`, `LLM_EMBED_MODEL`.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub fast_model: String,
    pub deep_model: String,
    pub embed_model: String,
    /// Total attempts per call, including the first one.
    pub max_attempts: u32,
    /// First backoff delay; doubles on each subsequent failure.
    pub base_backoff_ms: u64,
    /// Ceiling for the doubling backoff.
    pub max_backoff_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            fast_model: std::env::var("LLM_FAST_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            deep_model: std::env::var("LLM_DEEP_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            embed_model: std::env::var("LLM_EMBED_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            max_attempts: 10,
            base_backoff_ms: 1_000,
            max_backoff_ms: 5_000,
        }
    }
}

impl GatewayConfig {
    pub fn with_models(
        mut self,
        fast: impl Into<String>,
        deep: impl Into<String>,
        embed: impl Into<String>,
    ) -> Self {
        self.fast_model = fast.into();
        self.deep_model = deep.into();
        self.embed_model = embed.into();
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.base_backoff_ms = base_ms;
        self.max_backoff_ms = max_ms.max(base_ms);
        self
    }
}

/// One chat turn in the OpenAI wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A single completion request.
///
/// `caller` names the cognitive phase issuing the request; it shows up in
/// logs and in the [`CallLog`] so a transcript can be grouped by phase.
/// `context` is an optional free-form annotation (retrieved memories, page
/// identity) carried alongside the trace record.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tier: ModelTier,
    pub json_mode: bool,
    pub max_tokens: u32,
    pub thinking_budget: Option<u32>,
    pub caller: String,
    pub context: Option<String>,
}

impl ChatRequest {
    pub fn new(caller: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            tier: ModelTier::Fast,
            json_mode: false,
            max_tokens: 4_096,
            thinking_budget: None,
            caller: caller.into(),
            context: None,
        }
    }

    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::system(content));
        self
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::user(content));
        self
    }

    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.tier = tier;
        self
    }

    /// Ask for a JSON object and have the gateway validate extraction.
    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_thinking_budget(mut self, budget: u32) -> Self {
        self.thinking_budget = Some(budget);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Retrying front door for chat completions and embeddings.
pub struct LlmGateway {
    backend: Arc<dyn ChatBackend>,
    config: GatewayConfig,
    call_log: Option<Arc<CallLog>>,
}

impl LlmGateway {
    pub fn new(backend: Arc<dyn ChatBackend>, config: GatewayConfig) -> Self {
        Self {
            backend,
            config,
            call_log: None,
        }
    }

    /// Attach a side-channel transcript of every successful completion.
    pub fn with_call_log(mut self, log: Arc<CallLog>) -> Self {
        self.call_log = Some(log);
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => &self.config.fast_model,
            ModelTier::Deep => &self.config.deep_model,
        }
    }

    /// Run one completion with retry and backoff.
    ///
    /// In JSON mode the returned string is the extracted JSON object itself,
    /// already validated against `serde_json`; surrounding prose the model
    /// emitted is dropped. A response with no extractable object counts as a
    /// failed attempt and is retried like a transport error.
    pub async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let model = self.model_for(request.tier);
        let mut backoff = Duration::from_millis(self.config.base_backoff_ms);
        let max_backoff = Duration::from_millis(self.config.max_backoff_ms);
        let mut last_err: Option<FootfallError> = None;

        for attempt in 1..=self.config.max_attempts {
            let started = Instant::now();
            match self.attempt_complete(model, request).await {
                Ok(text) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    debug!(
                        target = "llm.gateway",
                        caller = %request.caller,
                        model = %model,
                        attempt,
                        elapsed_ms,
                        "completion ok"
                    );
                    if let Some(log) = &self.call_log {
                        log.record(
                            &request.caller,
                            &request.messages,
                            &text,
                            elapsed_ms,
                            request.context.as_deref(),
                        );
                    }
                    return Ok(text);
                }
                Err(e) => {
                    warn!(
                        target = "llm.gateway",
                        caller = %request.caller,
                        model = %model,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %e,
                        "completion attempt failed"
                    );
                    last_err = Some(e);
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(max_backoff);
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            FootfallError::GatewayError("completion failed with no attempts made".to_string())
        }))
    }

    async fn attempt_complete(&self, model: &str, request: &ChatRequest) -> Result<String> {
        let text = self.backend.chat(model, request).await?;
        if !request.json_mode {
            return Ok(text);
        }
        let snippet = extract_json_object(&text).ok_or_else(|| {
            FootfallError::GatewayError(format!(
                "no JSON object in response ({} chars)",
                text.len()
            ))
        })?;
        // Extraction only balances braces; make sure serde agrees before the
        // caller ever sees it.
        serde_json::from_str::<serde_json::Value>(snippet).map_err(|e| {
            FootfallError::GatewayError(format!("extracted JSON does not parse: {e}"))
        })?;
        Ok(snippet.to_string())
    }

    /// Embed a batch of texts, with the same retry policy as `complete`.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut backoff = Duration::from_millis(self.config.base_backoff_ms);
        let max_backoff = Duration::from_millis(self.config.max_backoff_ms);
        let mut last_err: Option<FootfallError> = None;

        for attempt in 1..=self.config.max_attempts {
            match self.backend.embed(&self.config.embed_model, texts).await {
                Ok(vectors) => {
                    if vectors.len() != texts.len() {
                        return Err(FootfallError::GatewayError(format!(
                            "embedding count mismatch: sent {}, got {}",
                            texts.len(),
                            vectors.len()
                        )));
                    }
                    return Ok(vectors);
                }
                Err(e) => {
                    warn!(
                        target = "llm.gateway",
                        model = %self.config.embed_model,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %e,
                        "embedding attempt failed"
                    );
                    last_err = Some(e);
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(max_backoff);
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            FootfallError::GatewayError("embedding failed with no attempts made".to_string())
        }))
    }
}
