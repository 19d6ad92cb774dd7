//! The simulated visitor: persona, intent, memory, and cognitive phases.
//!
//! A visitor owns one memory log and talks to the LLM gateway through typed
//! phase methods. The session loop decides *when* phases run; this type owns
//! *what* each phase does: build the payload, call the gateway, parse the
//! contract, and append the resulting pieces.

use std::sync::Arc;

use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::agent::config::VisitorConfig;
use crate::agent::humanize;
use crate::env::PageObservation;
use crate::llm::{ChatRequest, LlmGateway, ModelTier};
use crate::memory::{
    self, format_pieces, rank, KindWeights, MemoryKind, MemoryLog, MemoryPiece, RecentAnchors,
    RetrievalQuery,
};
use crate::prompts;
use crate::{FootfallError, Result};

/// The plan currently steering the visitor, plus its concrete next step.
#[derive(Debug, Clone)]
pub struct PlanState {
    pub plan: String,
    pub next_step: String,
}

/// One simulated visitor with its own memory.
///
/// Shared between the session loop and the background cadence task, so all
/// mutable state sits behind locks. No lock is held across a gateway call.
pub struct Visitor {
    persona: String,
    intent: String,
    gateway: Arc<LlmGateway>,
    memory: Arc<Mutex<MemoryLog>>,
    plan: Mutex<Option<PlanState>>,
    config: VisitorConfig,
}

impl Visitor {
    pub fn new(
        persona: impl Into<String>,
        intent: impl Into<String>,
        gateway: Arc<LlmGateway>,
        config: VisitorConfig,
    ) -> Self {
        Self {
            persona: persona.into(),
            intent: intent.into(),
            gateway,
            memory: Arc::new(Mutex::new(MemoryLog::new())),
            plan: Mutex::new(None),
            config,
        }
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    pub fn intent(&self) -> &str {
        &self.intent
    }

    pub fn config(&self) -> &VisitorConfig {
        &self.config
    }

    /// Handle to the memory log shared with the cadence task.
    pub fn memory(&self) -> Arc<Mutex<MemoryLog>> {
        Arc::clone(&self.memory)
    }

    pub async fn current_plan(&self) -> Option<PlanState> {
        self.plan.lock().await.clone()
    }

    pub async fn has_plan(&self) -> bool {
        self.plan.lock().await.is_some()
    }

    /// Summarize the raw page into observation pieces.
    ///
    /// When the response carries no usable observations the page still leaves
    /// a trace: a single fallback observation naming the URL, so later phases
    /// know a page was seen even if it never got summarized.
    pub async fn perceive(&self, page: &PageObservation) -> Result<()> {
        let payload = json!({
            "persona": self.persona,
            "page": self.page_value(page),
        });
        let request = ChatRequest::new("perceive")
            .system(prompts::PERCEIVE_PROMPT)
            .user(self.redact(payload.to_string()))
            .json();
        let response = self.gateway.complete(&request).await?;
        let value: Value = serde_json::from_str(&response)?;

        match string_array(&value, "observations") {
            Some(observations) if !observations.is_empty() => {
                let count = observations.len();
                let mut memory = self.memory.lock().await;
                for observation in observations {
                    memory.append(MemoryPiece::observation(observation));
                }
                info!(target = "visitor", count, url = %page.url, "Perceived page");
            }
            _ => {
                warn!(
                    target = "visitor",
                    url = %page.url,
                    "Perceive response carried no observations, recording fallback"
                );
                let mut memory = self.memory.lock().await;
                memory.append(MemoryPiece::observation(format!(
                    "Viewed {} but could not make sense of the page",
                    page.url
                )));
            }
        }
        Ok(())
    }

    /// Judge the previous action and plan against the page that resulted.
    ///
    /// Skips quietly when there is no previous action or plan yet (the first
    /// step of a session).
    pub async fn feedback(&self, page: &PageObservation) -> Result<()> {
        let previous = {
            let memory = self.memory.lock().await;
            memory
                .last_of_kind(MemoryKind::Action)
                .map(|piece| (piece.content.clone(), piece.raw_action.clone()))
        };
        let Some((last_content, last_raw)) = previous else {
            debug!(target = "visitor", "No previous action, skipping feedback");
            return Ok(());
        };
        let Some(plan_state) = self.current_plan().await else {
            debug!(target = "visitor", "No plan yet, skipping feedback");
            return Ok(());
        };

        let action_value = match last_raw {
            Some(action) => serde_json::to_value(&action)?,
            None => Value::String(last_content),
        };
        let payload = json!({
            "persona": self.persona,
            "last_action": action_value,
            "plan": plan_state.plan,
            "page": self.page_value(page),
        });
        let request = ChatRequest::new("feedback")
            .system(prompts::FEEDBACK_PROMPT)
            .user(self.redact(payload.to_string()))
            .json();
        let response = self.gateway.complete(&request).await?;
        let value: Value = serde_json::from_str(&response)?;

        match string_array(&value, "thoughts") {
            Some(thoughts) if !thoughts.is_empty() => {
                let count = thoughts.len();
                let mut memory = self.memory.lock().await;
                for thought in thoughts {
                    memory.append(MemoryPiece::thought(thought));
                }
                debug!(target = "visitor", count, "Recorded feedback thoughts");
            }
            _ => warn!(
                target = "visitor",
                "Feedback response carried no thoughts, skipping"
            ),
        }
        Ok(())
    }

    /// Condense everything since the last reflection into durable insights.
    ///
    /// The reflect window moves forward as soon as it is taken, so a failed
    /// call drops that window rather than replaying it.
    pub async fn reflect(&self) -> Result<()> {
        let (window, current) = {
            let mut memory = self.memory.lock().await;
            let window = memory.take_reflect_window();
            (window, memory.timestamp())
        };
        if window.is_empty() {
            debug!(target = "visitor", "Nothing new to reflect on");
            return Ok(());
        }

        let payload = json!({
            "persona": self.persona,
            "intent": self.intent,
            "current_timestamp": current,
            "memories": format_pieces(&window),
        });
        let request = ChatRequest::new("reflect")
            .system(prompts::REFLECT_PROMPT)
            .user(self.redact(payload.to_string()))
            .with_tier(ModelTier::Deep)
            .json();
        let response = self.gateway.complete(&request).await?;
        let value: Value = serde_json::from_str(&response)?;

        match string_array(&value, "insights") {
            Some(insights) if !insights.is_empty() => {
                let count = insights.len();
                let mut memory = self.memory.lock().await;
                for insight in insights {
                    memory.append(MemoryPiece::reflection(insight));
                }
                info!(target = "visitor", count, "Reflected on recent memory");
            }
            _ => warn!(
                target = "visitor",
                "Reflect response carried no insights, skipping"
            ),
        }
        Ok(())
    }

    /// Let the mind wander over the trailing memory window.
    pub async fn wonder(&self) -> Result<()> {
        let window = {
            let memory = self.memory.lock().await;
            memory.tail(self.config.wonder_window).to_vec()
        };
        if window.is_empty() {
            debug!(target = "visitor", "Nothing to wonder about yet");
            return Ok(());
        }

        let payload = json!({
            "persona": self.persona,
            "intent": self.intent,
            "memories": format_pieces(&window),
        });
        let request = ChatRequest::new("wonder")
            .system(prompts::WONDER_PROMPT)
            .user(self.redact(payload.to_string()))
            .with_tier(ModelTier::Deep)
            .json();
        let response = self.gateway.complete(&request).await?;
        let value: Value = serde_json::from_str(&response)?;

        match string_array(&value, "thoughts") {
            Some(thoughts) if !thoughts.is_empty() => {
                let count = thoughts.len();
                let mut memory = self.memory.lock().await;
                for thought in thoughts {
                    memory.append(MemoryPiece::thought(thought));
                }
                info!(target = "visitor", count, "Wondered");
            }
            _ => warn!(
                target = "visitor",
                "Wonder response carried no thoughts, skipping"
            ),
        }
        Ok(())
    }

    /// Backfill importance ratings and embeddings for unscored pieces.
    pub async fn update_memory(&self) {
        memory::update_scores(self.memory.as_ref(), &self.gateway).await;
    }

    /// Produce (or replace) the plan steering the visitor.
    ///
    /// Re-requests indefinitely while the response is missing any of the
    /// three fields; only the session's wall-clock budget bounds this.
    /// Gateway failures propagate.
    pub async fn plan(&self) -> Result<()> {
        let query = RetrievalQuery::new(self.intent.clone())
            .with_weights(
                KindWeights::default()
                    .with_action(10.0)
                    .with_plan(10.0)
                    .with_thought(10.0)
                    .with_reflection(10.0),
            )
            .with_anchors(RecentAnchors::all())
            .with_max_items(self.config.retrieval_max_items);
        let memories = self.retrieve(query).await?;
        let rendered = format_pieces(&memories).join("\n");

        let previous_plan = self
            .current_plan()
            .await
            .map(|state| state.plan)
            .unwrap_or_else(|| "N/A".to_string());
        let payload = json!({
            "persona": self.persona,
            "intent": self.intent,
            "previous_plan": previous_plan,
            "relevant_memories": rendered,
        });
        let request = ChatRequest::new("plan")
            .system(prompts::PLANNING_PROMPT)
            .user(self.redact(payload.to_string()))
            .with_tier(ModelTier::Deep)
            .json()
            .with_context(rendered);

        loop {
            let response = self.gateway.complete(&request).await?;
            let value: Value = serde_json::from_str(&response)?;
            let plan = value.get("plan").and_then(Value::as_str);
            let rationale = value.get("rationale").and_then(Value::as_str);
            let next_step = value.get("next_step").and_then(Value::as_str);

            match (plan, rationale, next_step) {
                (Some(plan), Some(rationale), Some(next_step))
                    if !plan.is_empty() && !next_step.is_empty() =>
                {
                    {
                        let mut memory = self.memory.lock().await;
                        memory.append(MemoryPiece::thought(rationale));
                        memory.append(MemoryPiece::plan(plan, next_step));
                    }
                    *self.plan.lock().await = Some(PlanState {
                        plan: plan.to_string(),
                        next_step: next_step.to_string(),
                    });
                    info!(target = "visitor", next_step, "Adopted a new plan");
                    return Ok(());
                }
                _ => {
                    warn!(
                        target = "visitor",
                        "Plan response missing plan/rationale/next_step, re-requesting"
                    );
                }
            }
        }
    }

    /// Pick the next browser action for the current page.
    ///
    /// A response without a parseable action is fatal here, unlike the plan
    /// phase: the session is mid-step and the environment is waiting.
    pub async fn choose_action<R: Rng>(
        &self,
        page: &PageObservation,
        rng: &mut R,
    ) -> Result<Action> {
        let plan_state = self.current_plan().await.ok_or_else(|| {
            FootfallError::SessionError("action requested before any plan exists".to_string())
        })?;
        let previous = {
            let memory = self.memory.lock().await;
            memory
                .last_of_kind(MemoryKind::Action)
                .and_then(|piece| piece.raw_action.clone())
        };

        let query = RetrievalQuery::new(plan_state.next_step.clone())
            .with_weights(
                KindWeights::default()
                    .with_observation(0.0)
                    .with_action(10.0)
                    .with_thought(10.0),
            )
            .with_max_items(self.config.retrieval_max_items);
        let memories = self.retrieve(query).await?;
        let rendered = format_pieces(&memories).join("\n");

        let previous_value = match &previous {
            Some(action) => serde_json::to_value(action)?,
            None => Value::String("N/A".to_string()),
        };
        let payload = json!({
            "persona": self.persona,
            "intent": self.intent,
            "plan": plan_state.plan,
            "next_step": plan_state.next_step,
            "page": self.page_value(page),
            "valid_targets": {
                "clickable": page.clickable_elements,
                "tabs": page.tabs,
            },
            "last_action": previous_value,
            "relevant_memories": rendered,
        });
        let request = ChatRequest::new("act")
            .system(prompts::ACTION_PROMPT)
            .user(self.redact(payload.to_string()))
            .json()
            .with_context(rendered);
        let response = self.gateway.complete(&request).await?;
        let value: Value = serde_json::from_str(&response)?;

        let planned = value
            .get("actions")
            .and_then(Value::as_array)
            .and_then(|actions| actions.first())
            .cloned()
            .ok_or_else(|| {
                FootfallError::SessionError("action response carried no actions".to_string())
            })
            .and_then(Action::from_value)?;

        let chosen = humanize::substitute_action(
            &self.config.humanize,
            rng,
            &planned,
            previous.as_ref(),
            &page.clickable_elements,
        );
        if chosen != planned {
            info!(
                target = "visitor",
                planned = planned.name(),
                chosen = chosen.name(),
                "Planned action replaced by a distraction"
            );
        }

        {
            let mut memory = self.memory.lock().await;
            memory.append(MemoryPiece::action(chosen.describe(), chosen.clone()));
        }
        Ok(chosen)
    }

    /// Rank memory for a query, embedding the query text first.
    ///
    /// An embedding failure downgrades relevance to zero instead of failing
    /// the retrieval.
    pub async fn retrieve(&self, query: RetrievalQuery) -> Result<Vec<MemoryPiece>> {
        if query.trigger_update {
            memory::update_scores(self.memory.as_ref(), &self.gateway).await;
        }

        let query_embedding = match self.gateway.embed(&[query.text.clone()]).await {
            Ok(mut vectors) if !vectors.is_empty() => Some(vectors.remove(0)),
            Ok(_) => None,
            Err(error) => {
                warn!(
                    target = "visitor",
                    error = %error,
                    "Query embedding failed, ranking without relevance"
                );
                None
            }
        };

        let memory = self.memory.lock().await;
        Ok(rank(
            memory.pieces(),
            query_embedding.as_deref(),
            &query,
            &self.config.scoring,
            memory.timestamp(),
        ))
    }

    fn page_value(&self, page: &PageObservation) -> Value {
        json!({
            "url": page.url,
            "html": truncate_chars(&page.html, self.config.max_html_chars),
            "clickable_elements": page.clickable_elements,
            "tabs": page.tabs,
        })
    }

    fn redact(&self, text: String) -> String {
        scrub_terms(text, &self.config.redact_terms)
    }
}

/// Cut a string to at most `max` characters, respecting char boundaries.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Replace every occurrence of each term with `***`.
fn scrub_terms(mut text: String, terms: &[String]) -> String {
    for term in terms {
        if !term.is_empty() {
            text = text.replace(term.as_str(), "***");
        }
    }
    text
}

fn string_array(value: &Value, key: &str) -> Option<Vec<String>> {
    let array = value.get(key)?.as_array()?;
    let mut items = Vec::with_capacity(array.len());
    for entry in array {
        if let Some(text) = entry.as_str() {
            if !text.is_empty() {
                items.push(text.to_string());
            }
        }
    }
    Some(items)
}
