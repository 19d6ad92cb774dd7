//! End-to-end session tests over a scripted backend and environment.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use footfall_core::action::Action;
use footfall_core::agent::{CadenceTask, Session, Visitor, VisitorConfig};
use footfall_core::env::{PageObservation, StepOutcome, WebEnvironment};
use footfall_core::llm::{ChatBackend, ChatRequest, GatewayConfig, LlmGateway};
use footfall_core::memory::MemoryPiece;
use footfall_core::{FootfallError, Result};
use serde_json::{json, Value};

// ============================================================================
// Scripted LLM Backend
// ============================================================================

/// Per-phase call counters, shared with the test body.
#[derive(Clone, Default)]
struct PhaseCounts {
    perceive: Arc<AtomicUsize>,
    feedback: Arc<AtomicUsize>,
    reflect: Arc<AtomicUsize>,
    wonder: Arc<AtomicUsize>,
    ratings: Arc<AtomicUsize>,
    plan: Arc<AtomicUsize>,
    act: Arc<AtomicUsize>,
}

/// Backend that answers each cognitive phase with a minimal valid response.
struct PhaseBackend {
    counts: PhaseCounts,
    /// This many plan responses are shape-malformed before a valid one.
    plan_malformed_first: usize,
    /// Scripted actions popped per act call; empty falls back to a click.
    act_script: Mutex<VecDeque<Value>>,
    /// Answer act calls with an empty actions array.
    act_empty: bool,
}

impl PhaseBackend {
    fn new() -> Self {
        Self {
            counts: PhaseCounts::default(),
            plan_malformed_first: 0,
            act_script: Mutex::new(VecDeque::new()),
            act_empty: false,
        }
    }

    fn with_plan_malformed_first(mut self, count: usize) -> Self {
        self.plan_malformed_first = count;
        self
    }

    fn with_act_script(self, actions: Vec<Value>) -> Self {
        *self.act_script.lock().expect("act script lock") = actions.into_iter().collect();
        self
    }

    fn with_empty_actions(mut self) -> Self {
        self.act_empty = true;
        self
    }
}

#[async_trait]
impl ChatBackend for PhaseBackend {
    async fn chat(&self, _model: &str, request: &ChatRequest) -> Result<String> {
        let response = match request.caller.as_str() {
            "perceive" => {
                self.counts.perceive.fetch_add(1, Ordering::SeqCst);
                json!({"observations": ["the page shows a product grid"]})
            }
            "feedback" => {
                self.counts.feedback.fetch_add(1, Ordering::SeqCst);
                json!({"thoughts": ["that click did what I expected"]})
            }
            "reflect" => {
                self.counts.reflect.fetch_add(1, Ordering::SeqCst);
                json!({"insights": ["the catalog is easy to scan"]})
            }
            "wonder" => {
                self.counts.wonder.fetch_add(1, Ordering::SeqCst);
                json!({"thoughts": ["maybe the reviews tab has answers"]})
            }
            "memory_update" => {
                self.counts.ratings.fetch_add(1, Ordering::SeqCst);
                let user = request
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == "user")
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                let value: Value = serde_json::from_str(&user).unwrap_or(Value::Null);
                let count = value
                    .get("entries")
                    .and_then(Value::as_array)
                    .map(|entries| entries.len())
                    .unwrap_or(0);
                json!({ "ratings": vec![5.0; count] })
            }
            "plan" => {
                let seen = self.counts.plan.fetch_add(1, Ordering::SeqCst);
                if seen < self.plan_malformed_first {
                    json!({"plan": "half a plan"})
                } else {
                    json!({
                        "plan": "explore the catalog",
                        "rationale": "nothing is known about this site yet",
                        "next_step": "open the first product",
                    })
                }
            }
            "act" => {
                self.counts.act.fetch_add(1, Ordering::SeqCst);
                if self.act_empty {
                    json!({"actions": []})
                } else {
                    let scripted = self.act_script.lock().expect("act script lock").pop_front();
                    let action = scripted
                        .unwrap_or_else(|| json!({"action": "click", "target": "first product"}));
                    json!({ "actions": [action] })
                }
            }
            other => {
                return Err(FootfallError::GatewayError(format!(
                    "unexpected caller in test: {other}"
                )))
            }
        };
        Ok(response.to_string())
    }

    async fn embed(&self, _model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.3, 0.7]).collect())
    }
}

fn gateway_over(backend: PhaseBackend) -> (Arc<LlmGateway>, PhaseCounts) {
    let counts = backend.counts.clone();
    let config = GatewayConfig::default()
        .with_max_attempts(2)
        .with_backoff(1, 2);
    (
        Arc::new(LlmGateway::new(Arc::new(backend), config)),
        counts,
    )
}

// ============================================================================
// Scripted Environment
// ============================================================================

#[derive(Clone, Default)]
struct EnvProbe {
    observes: Arc<AtomicUsize>,
    steps: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

/// In-memory environment that serves numbered pages.
struct ScriptedEnv {
    probe: EnvProbe,
    /// `step` reports termination at this step index.
    terminate_at_step: Option<usize>,
    /// Score reported per step index; missing entries report none.
    step_scores: Vec<Option<f64>>,
    observe_delay: Option<Duration>,
}

impl ScriptedEnv {
    fn new() -> Self {
        Self {
            probe: EnvProbe::default(),
            terminate_at_step: None,
            step_scores: Vec::new(),
            observe_delay: None,
        }
    }

    fn terminate_at_step(mut self, index: usize) -> Self {
        self.terminate_at_step = Some(index);
        self
    }

    fn with_step_scores(mut self, scores: Vec<Option<f64>>) -> Self {
        self.step_scores = scores;
        self
    }

    fn with_observe_delay(mut self, delay: Duration) -> Self {
        self.observe_delay = Some(delay);
        self
    }

    fn probe(&self) -> EnvProbe {
        self.probe.clone()
    }

    fn page(index: usize) -> PageObservation {
        PageObservation {
            url: format!("https://shop.test/page{index}"),
            html: format!("<html><body>page {index}</body></html>"),
            clickable_elements: vec!["first product".to_string(), "cart".to_string()],
            tabs: vec!["Home".to_string()],
        }
    }
}

#[async_trait]
impl WebEnvironment for ScriptedEnv {
    async fn observe(&mut self) -> Result<PageObservation> {
        if let Some(delay) = self.observe_delay {
            tokio::time::sleep(delay).await;
        }
        let index = self.probe.observes.fetch_add(1, Ordering::SeqCst);
        Ok(Self::page(index))
    }

    async fn step(&mut self, _action: &Action) -> Result<StepOutcome> {
        let index = self.probe.steps.fetch_add(1, Ordering::SeqCst);
        Ok(StepOutcome {
            observation: Self::page(index + 1),
            terminated: self.terminate_at_step == Some(index),
            score: self.step_scores.get(index).copied().flatten(),
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.probe.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn session_over(
    backend: PhaseBackend,
    env: ScriptedEnv,
    config: VisitorConfig,
    max_steps: u64,
) -> (Session, PhaseCounts, EnvProbe) {
    let (gateway, counts) = gateway_over(backend);
    let probe = env.probe();
    let visitor = Arc::new(Visitor::new(
        "Dana, 34, price-conscious shopper",
        "find a waterproof jacket under $100",
        gateway,
        config,
    ));
    let session = Session::new(visitor, Box::new(env), max_steps);
    (session, counts, probe)
}

// ============================================================================
// Step Loop Tests
// ============================================================================

#[tokio::test]
async fn test_session_runs_until_the_environment_terminates() {
    let env = ScriptedEnv::new()
        .terminate_at_step(2)
        .with_step_scores(vec![None, None, Some(0.87)]);
    let (session, _, probe) = session_over(
        PhaseBackend::new(),
        env,
        VisitorConfig::default(),
        10,
    );

    let record = session.run().await;

    assert!(record.terminated);
    assert_eq!(record.error, None);
    assert_eq!(record.steps_taken, 3);
    assert_eq!(record.actions.len(), 3);
    assert_eq!(record.score, Some(0.87));
    assert!(!record.memories.is_empty());
    assert!(!record.run_id.is_empty());

    let steps: Vec<u64> = record.observations.iter().map(|d| d.step).collect();
    assert_eq!(steps, vec![0, 1, 2]);
    assert!(record.observations.iter().all(|d| d.html_chars > 0));

    assert!(record.timing.started_epoch_ms > 0);
    assert!(record.timing.time_to_first_action_ms.is_some());
    assert!(probe.closed.load(Ordering::SeqCst), "env must be closed");
}

#[tokio::test]
async fn test_feedback_starts_on_the_second_step() {
    let env = ScriptedEnv::new().terminate_at_step(2);
    let (session, counts, _) = session_over(
        PhaseBackend::new(),
        env,
        VisitorConfig::default(),
        10,
    );

    session.run().await;

    assert_eq!(counts.perceive.load(Ordering::SeqCst), 3);
    assert_eq!(counts.feedback.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_think_phases_follow_their_step_cadence() {
    // defaults: reflect every 3, wonder every 4, backfill every 2; over four
    // steps that lands reflect on step 2, wonder on step 3, backfill on 1 and 3
    let env = ScriptedEnv::new();
    let (session, counts, _) = session_over(
        PhaseBackend::new(),
        env,
        VisitorConfig::default(),
        4,
    );

    let record = session.run().await;

    assert_eq!(record.steps_taken, 4);
    assert!(!record.terminated, "running out of steps is not termination");
    assert_eq!(counts.reflect.load(Ordering::SeqCst), 1);
    assert_eq!(counts.wonder.load(Ordering::SeqCst), 1);
    assert_eq!(counts.ratings.load(Ordering::SeqCst), 2);
    assert_eq!(counts.plan.load(Ordering::SeqCst), 4);
    assert_eq!(counts.act.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_disabled_phases_never_run() {
    let env = ScriptedEnv::new();
    let mut config = VisitorConfig::default();
    config.enable_reflect = false;
    config.enable_wonder = false;
    config.enable_memory_update = false;
    let (session, counts, _) = session_over(PhaseBackend::new(), env, config, 4);

    session.run().await;

    assert_eq!(counts.reflect.load(Ordering::SeqCst), 0);
    assert_eq!(counts.wonder.load(Ordering::SeqCst), 0);
    assert_eq!(counts.ratings.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_plan_rerequests_until_the_shape_is_valid() {
    let env = ScriptedEnv::new();
    let backend = PhaseBackend::new().with_plan_malformed_first(2);
    let (session, counts, _) = session_over(backend, env, VisitorConfig::default(), 1);

    let record = session.run().await;

    assert_eq!(record.error, None);
    assert_eq!(counts.plan.load(Ordering::SeqCst), 3);
    assert_eq!(record.actions.len(), 1);
}

#[tokio::test]
async fn test_act_without_actions_is_fatal() {
    let env = ScriptedEnv::new();
    let backend = PhaseBackend::new().with_empty_actions();
    let (session, _, probe) = session_over(backend, env, VisitorConfig::default(), 5);

    let record = session.run().await;

    assert!(record.terminated);
    let error = record.error.expect("empty actions must fail the session");
    assert!(error.contains("no actions"), "unexpected error: {error}");
    assert_eq!(record.actions.len(), 0);
    assert!(probe.closed.load(Ordering::SeqCst), "cleanup must still close the env");
}

#[tokio::test]
async fn test_terminal_action_ends_the_session_without_an_env_step() {
    let env = ScriptedEnv::new();
    let backend = PhaseBackend::new().with_act_script(vec![
        json!({"action": "click", "target": "first product"}),
        json!({"action": "terminate", "reason": "found what I came for"}),
    ]);
    let (session, _, probe) = session_over(backend, env, VisitorConfig::default(), 10);

    let record = session.run().await;

    assert!(record.terminated);
    assert_eq!(record.error, None);
    assert_eq!(record.steps_taken, 2);
    assert_eq!(record.actions.len(), 2);
    assert!(record.actions[1].is_terminal());
    // the terminal action never reaches the environment
    assert_eq!(probe.steps.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_score_passthrough_keeps_the_last_reported_value() {
    let env = ScriptedEnv::new()
        .terminate_at_step(2)
        .with_step_scores(vec![Some(0.5), None, None]);
    let (session, _, _) = session_over(
        PhaseBackend::new(),
        env,
        VisitorConfig::default(),
        10,
    );

    let record = session.run().await;

    assert!(record.terminated);
    assert_eq!(record.score, Some(0.5));
}

#[tokio::test]
async fn test_back_actions_are_counted_as_backtracks() {
    let env = ScriptedEnv::new();
    let backend = PhaseBackend::new().with_act_script(vec![
        json!({"action": "click", "target": "first product"}),
        json!({"action": "back"}),
        json!({"action": "terminate"}),
    ]);
    let (session, _, _) = session_over(backend, env, VisitorConfig::default(), 10);

    let record = session.run().await;

    assert_eq!(record.timing.backtrack_count, 1);
}

#[tokio::test]
async fn test_session_timeout_terminates_without_an_error() {
    let env = ScriptedEnv::new().with_observe_delay(Duration::from_millis(80));
    let config = VisitorConfig::default().with_session_timeout_ms(120);
    let (session, _, probe) = session_over(PhaseBackend::new(), env, config, 100);

    let record = session.run().await;

    assert!(record.terminated, "timeout must mark the run terminated");
    assert_eq!(record.error, None, "timeout is not an error");
    assert!(record.steps_taken <= 1);
    assert!(probe.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_run_record_serializes_without_embeddings() {
    let env = ScriptedEnv::new().terminate_at_step(1);
    let (session, _, _) = session_over(
        PhaseBackend::new(),
        env,
        VisitorConfig::default(),
        10,
    );

    let record = session.run().await;
    let value = serde_json::to_value(&record).expect("record serializes");

    let memories = value
        .get("memories")
        .and_then(Value::as_array)
        .expect("memories field");
    assert!(!memories.is_empty());
    for piece in memories {
        assert!(piece.get("embedding").is_none(), "embeddings must stay internal");
    }
}

// ============================================================================
// Cadence Task Tests
// ============================================================================

#[tokio::test]
async fn test_cadence_task_runs_slow_phases_and_stops_on_shutdown() {
    let (gateway, counts) = gateway_over(PhaseBackend::new());
    let visitor = Arc::new(Visitor::new(
        "Sam, 27, browses on a phone",
        "look for a gift idea",
        gateway,
        VisitorConfig::default(),
    ));
    {
        let memory = visitor.memory();
        let mut guard = memory.lock().await;
        guard.append(MemoryPiece::observation("a gift guide landing page"));
        guard.append(MemoryPiece::thought("the hero banner is huge"));
    }

    let cadence = CadenceTask::spawn(Arc::clone(&visitor), Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(150)).await;
    cadence.shutdown(Duration::from_millis(500)).await;

    let reflects = counts.reflect.load(Ordering::SeqCst);
    let wonders = counts.wonder.load(Ordering::SeqCst);
    assert!(reflects >= 1, "cadence never reflected");
    assert!(wonders >= 1, "cadence never wondered");

    // after shutdown the loop is gone: counters must not move again
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(counts.reflect.load(Ordering::SeqCst), reflects);
    assert_eq!(counts.wonder.load(Ordering::SeqCst), wonders);
}

#[tokio::test]
async fn test_background_cadence_starts_once_per_session() {
    let env = ScriptedEnv::new().terminate_at_step(2);
    // a long interval keeps the background loop idle for the whole session;
    // the session must still start and stop it cleanly
    let mut config = VisitorConfig::default();
    config.background_cadence = true;
    config.cadence_interval_ms = 60_000;
    let (session, counts, probe) = session_over(PhaseBackend::new(), env, config, 10);

    let record = session.run().await;

    assert_eq!(record.error, None);
    assert!(probe.closed.load(Ordering::SeqCst));
    // the idle background loop contributed nothing beyond the step cadence
    assert_eq!(counts.reflect.load(Ordering::SeqCst), 1);
}
