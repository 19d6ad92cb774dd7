//! Batch runner tests: the concurrency cap, input-order results, failure
//! isolation, and progress reporting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use footfall_core::action::Action;
use footfall_core::batch::{BatchOptions, BatchRunner, SessionSpec};
use footfall_core::env::{EnvFactory, PageObservation, StepOutcome, WebEnvironment};
use footfall_core::llm::{ChatBackend, ChatRequest, GatewayConfig, LlmGateway};
use footfall_core::{FootfallError, Result};
use serde_json::{json, Value};

/// Persona marker that makes the backend return an empty action list,
/// which is fatal for that one session.
const BROKEN: &str = "[broken]";

// ============================================================================
// Shared Mocks
// ============================================================================

/// Backend whose visitors terminate on their first action, so sessions stay
/// one step long. Personas tagged [`BROKEN`] get an empty action list.
struct PanelBackend;

#[async_trait]
impl ChatBackend for PanelBackend {
    async fn chat(&self, _model: &str, request: &ChatRequest) -> Result<String> {
        let user: Value = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .and_then(|m| serde_json::from_str(&m.content).ok())
            .unwrap_or(Value::Null);
        let response = match request.caller.as_str() {
            "perceive" => json!({"observations": ["a storefront with a hero banner"]}),
            "feedback" => json!({"thoughts": ["the page reacted to my click"]}),
            "reflect" => json!({"insights": ["navigation is shallow"]}),
            "wonder" => json!({"thoughts": ["is there a sale section"]}),
            "memory_update" => {
                let count = user
                    .get("entries")
                    .and_then(Value::as_array)
                    .map(|entries| entries.len())
                    .unwrap_or(0);
                json!({ "ratings": vec![5.0; count] })
            }
            "plan" => json!({
                "plan": "skim the landing page",
                "rationale": "first visit",
                "next_step": "decide whether anything is worth a click",
            }),
            "act" => {
                let persona = user
                    .get("persona")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if persona.contains(BROKEN) {
                    json!({"actions": []})
                } else {
                    json!({"actions": [{"action": "terminate", "reason": "seen enough"}]})
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
        Ok(texts.iter().map(|_| vec![0.5, 0.5]).collect())
    }
}

fn panel_gateway() -> Arc<LlmGateway> {
    let config = GatewayConfig::default()
        .with_max_attempts(1)
        .with_backoff(1, 2);
    Arc::new(LlmGateway::new(Arc::new(PanelBackend), config))
}

/// Tracks how many environments are open at once.
#[derive(Clone, Default)]
struct FleetGauge {
    current: Arc<AtomicUsize>,
    max_seen: Arc<AtomicUsize>,
    opens: Arc<AtomicUsize>,
}

struct GaugeFactory {
    gauge: FleetGauge,
    observe_delay: Duration,
    fail_all: bool,
}

impl GaugeFactory {
    fn new(observe_delay: Duration) -> Self {
        Self {
            gauge: FleetGauge::default(),
            observe_delay,
            fail_all: false,
        }
    }

    fn failing() -> Self {
        Self {
            gauge: FleetGauge::default(),
            observe_delay: Duration::ZERO,
            fail_all: true,
        }
    }

    fn gauge(&self) -> FleetGauge {
        self.gauge.clone()
    }
}

#[async_trait]
impl EnvFactory for GaugeFactory {
    async fn open(&self, start_url: &str) -> Result<Box<dyn WebEnvironment>> {
        self.gauge.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_all {
            return Err(FootfallError::EnvironmentError(
                "browser pool exhausted".to_string(),
            ));
        }
        let now = self.gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.max_seen.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(GaugeEnv {
            gauge: self.gauge.clone(),
            url: start_url.to_string(),
            observe_delay: self.observe_delay,
        }))
    }
}

struct GaugeEnv {
    gauge: FleetGauge,
    url: String,
    observe_delay: Duration,
}

#[async_trait]
impl WebEnvironment for GaugeEnv {
    async fn observe(&mut self) -> Result<PageObservation> {
        tokio::time::sleep(self.observe_delay).await;
        Ok(PageObservation {
            url: self.url.clone(),
            html: "<html><body>storefront</body></html>".to_string(),
            clickable_elements: vec!["sale banner".to_string()],
            tabs: vec![],
        })
    }

    async fn step(&mut self, _action: &Action) -> Result<StepOutcome> {
        Ok(StepOutcome {
            observation: PageObservation {
                url: self.url.clone(),
                html: "<html><body>next page</body></html>".to_string(),
                clickable_elements: vec![],
                tabs: vec![],
            },
            terminated: false,
            score: None,
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.gauge.current.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

fn specs(count: usize) -> Vec<SessionSpec> {
    (0..count)
        .map(|i| {
            SessionSpec::new(
                format!("Visitor {i}, window shopper"),
                format!("errand number {i}"),
            )
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_concurrency_cap_bounds_sessions_in_flight() {
    let factory = GaugeFactory::new(Duration::from_millis(15));
    let gauge = factory.gauge();
    let runner = BatchRunner::new(panel_gateway(), Arc::new(factory));
    let options = BatchOptions::new("https://shop.test").with_concurrency(3);

    let records = runner.run(specs(10), options).await;

    assert_eq!(records.len(), 10);
    assert!(records.iter().all(|r| r.error.is_none()));
    let max_seen = gauge.max_seen.load(Ordering::SeqCst);
    assert!(max_seen <= 3, "cap breached: {max_seen} sessions in flight");
    assert!(max_seen >= 2, "sessions never overlapped");
    assert_eq!(gauge.current.load(Ordering::SeqCst), 0, "an env was left open");
}

#[tokio::test]
async fn test_records_come_back_in_input_order() {
    let factory = GaugeFactory::new(Duration::from_millis(5));
    let runner = BatchRunner::new(panel_gateway(), Arc::new(factory));
    let options = BatchOptions::new("https://shop.test").with_concurrency(5);

    let input = specs(5);
    let expected: Vec<String> = input.iter().map(|s| s.persona.clone()).collect();
    let records = runner.run(input, options).await;

    let personas: Vec<String> = records.iter().map(|r| r.persona.clone()).collect();
    assert_eq!(personas, expected);
}

#[tokio::test]
async fn test_one_dead_session_leaves_the_rest_clean() {
    let factory = GaugeFactory::new(Duration::ZERO);
    let runner = BatchRunner::new(panel_gateway(), Arc::new(factory));
    let options = BatchOptions::new("https://shop.test").with_concurrency(2);

    let mut input = specs(5);
    input[2].persona = format!("Visitor 2 {BROKEN}");
    let records = runner.run(input, options).await;

    assert_eq!(records.len(), 5);
    for (index, record) in records.iter().enumerate() {
        if index == 2 {
            let error = record.error.as_deref().expect("broken session must error");
            assert!(error.contains("no actions"), "unexpected error: {error}");
            assert!(record.persona.contains(BROKEN), "identity must survive failure");
        } else {
            assert_eq!(record.error, None, "session {index} should be clean");
            assert!(record.terminated);
        }
    }
}

#[tokio::test]
async fn test_env_open_failure_becomes_an_error_record() {
    let runner = BatchRunner::new(panel_gateway(), Arc::new(GaugeFactory::failing()));
    let options = BatchOptions::new("https://shop.test");

    let input = specs(3);
    let records = runner.run(input, options).await;

    assert_eq!(records.len(), 3);
    for (index, record) in records.iter().enumerate() {
        assert_eq!(record.run_id, format!("error_{index}"));
        assert!(record.terminated);
        let error = record.error.as_deref().expect("open failure must error");
        assert!(error.contains("browser pool exhausted"));
        assert_eq!(record.persona, format!("Visitor {index}, window shopper"));
        assert_eq!(record.intent, format!("errand number {index}"));
    }
}

#[tokio::test]
async fn test_progress_fires_once_per_session_in_completion_order() {
    let factory = GaugeFactory::new(Duration::from_millis(2));
    let runner = BatchRunner::new(panel_gateway(), Arc::new(factory));

    let seen: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let options = BatchOptions::new("https://shop.test")
        .with_concurrency(3)
        .with_progress(move |completed, total| {
            sink.lock().expect("progress sink").push((completed, total));
        });

    runner.run(specs(5), options).await;

    let pairs = seen.lock().expect("progress sink").clone();
    assert_eq!(pairs, vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]);
}

#[tokio::test]
async fn test_panicking_progress_callback_is_contained() {
    let factory = GaugeFactory::new(Duration::ZERO);
    let gauge = factory.gauge();
    let runner = BatchRunner::new(panel_gateway(), Arc::new(factory));
    let options = BatchOptions::new("https://shop.test")
        .with_concurrency(2)
        .with_progress(|_, _| panic!("reporting dashboard fell over"));

    let records = runner.run(specs(4), options).await;

    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.error.is_none()));
    assert_eq!(gauge.current.load(Ordering::SeqCst), 0, "an env was left open");
}

#[tokio::test]
async fn test_empty_batch_returns_no_records() {
    let runner = BatchRunner::new(panel_gateway(), Arc::new(GaugeFactory::new(Duration::ZERO)));
    let records = runner
        .run(Vec::new(), BatchOptions::new("https://shop.test"))
        .await;
    assert!(records.is_empty());
}
