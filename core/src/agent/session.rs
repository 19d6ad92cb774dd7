//! One visitor driving one environment from start URL to termination.
//!
//! The session owns the step loop: observe, perceive (with feedback after
//! the first step), run the throttled thinking phases, refresh the plan if
//! due, pick an action, and hand it to the environment. Everything the run
//! produced is folded into a [`RunRecord`] at the end, whether the session
//! finished cleanly or died mid-step.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::action::Action;
use crate::agent::cadence::CadenceTask;
use crate::agent::config::VisitorConfig;
use crate::agent::visitor::Visitor;
use crate::env::WebEnvironment;
use crate::memory::MemoryPiece;
use crate::Result;

/// Bound on environment teardown during cleanup.
const ENV_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Compact trace of one observed page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationDigest {
    pub step: u64,
    pub url: String,
    pub html_chars: usize,
}

/// Wall-clock metrics for a finished run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingMetrics {
    pub started_epoch_ms: i64,
    pub total_duration_ms: u64,
    pub time_to_first_action_ms: Option<u64>,
    /// How often the visitor backed out of a page.
    pub backtrack_count: u32,
}

/// Everything one session produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub persona: String,
    pub intent: String,
    pub actions: Vec<Action>,
    pub observations: Vec<ObservationDigest>,
    pub memories: Vec<MemoryPiece>,
    pub terminated: bool,
    pub score: Option<f64>,
    pub steps_taken: u64,
    pub error: Option<String>,
    pub timing: TimingMetrics,
}

impl RunRecord {
    fn started(run_id: String, persona: String, intent: String) -> Self {
        Self {
            run_id,
            persona,
            intent,
            actions: Vec::new(),
            observations: Vec::new(),
            memories: Vec::new(),
            terminated: false,
            score: None,
            steps_taken: 0,
            error: None,
            timing: TimingMetrics {
                started_epoch_ms: Utc::now().timestamp_millis(),
                ..TimingMetrics::default()
            },
        }
    }

    /// Record for a session that died before it could produce its own.
    pub fn failed(
        run_id: impl Into<String>,
        persona: impl Into<String>,
        intent: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let mut record = Self::started(run_id.into(), persona.into(), intent.into());
        record.terminated = true;
        record.error = Some(error.into());
        record
    }
}

enum StepControl {
    Continue,
    Terminated,
}

/// One live session: a visitor, its environment, and the step loop state.
pub struct Session {
    visitor: Arc<Visitor>,
    env: Box<dyn WebEnvironment>,
    config: VisitorConfig,
    max_steps: u64,
    cadence: Option<CadenceTask>,
    rng: StdRng,
    record: RunRecord,
    started: Instant,
    step_count: u64,
    // "last ran at step" markers; -1 so cadences measure from the start
    last_reflect_step: i64,
    last_wonder_step: i64,
    last_update_step: i64,
    last_plan_step: i64,
}

impl Session {
    pub fn new(visitor: Arc<Visitor>, env: Box<dyn WebEnvironment>, max_steps: u64) -> Self {
        let run_id = format!(
            "{}_{}",
            Utc::now().format("%Y-%m-%d_%H-%M-%S"),
            &Uuid::new_v4().simple().to_string()[..4]
        );
        let record = RunRecord::started(
            run_id,
            visitor.persona().to_string(),
            visitor.intent().to_string(),
        );
        let config = visitor.config().clone();
        Self {
            visitor,
            env,
            config,
            max_steps,
            cadence: None,
            rng: StdRng::from_entropy(),
            record,
            started: Instant::now(),
            step_count: 0,
            last_reflect_step: -1,
            last_wonder_step: -1,
            last_update_step: -1,
            last_plan_step: -1,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.record.run_id
    }

    /// Drive the session to completion and fold everything into the record.
    ///
    /// Cleanup (cadence shutdown, environment close) always runs, whatever
    /// happened to the loop.
    pub async fn run(mut self) -> RunRecord {
        info!(
            target = "session",
            run_id = %self.record.run_id,
            persona = %self.visitor.persona(),
            intent = %self.visitor.intent(),
            max_steps = self.max_steps,
            "Session starting"
        );
        self.started = Instant::now();

        let outcome = self.drive().await;
        self.cleanup().await;

        if let Err(error) = outcome {
            warn!(
                target = "session",
                run_id = %self.record.run_id,
                error = %error,
                "Session failed"
            );
            self.record.terminated = true;
            self.record.error = Some(error.to_string());
        }

        self.record.steps_taken = self.step_count;
        self.record.memories = {
            let memory = self.visitor.memory();
            let guard = memory.lock().await;
            guard.snapshot()
        };
        self.record.timing.total_duration_ms = self.started.elapsed().as_millis() as u64;

        info!(
            target = "session",
            run_id = %self.record.run_id,
            steps = self.record.steps_taken,
            actions = self.record.actions.len(),
            terminated = self.record.terminated,
            "Session finished"
        );
        self.record
    }

    async fn drive(&mut self) -> Result<()> {
        let budget = Duration::from_millis(self.config.session_timeout_ms);
        loop {
            if self.step_count >= self.max_steps {
                info!(
                    target = "session",
                    run_id = %self.record.run_id,
                    "Step budget exhausted"
                );
                return Ok(());
            }
            let elapsed = self.started.elapsed();
            if elapsed >= budget {
                self.note_timeout();
                return Ok(());
            }

            // the remaining budget bounds the whole step, including the
            // plan phase's open-ended re-requesting
            let remaining = budget - elapsed;
            match timeout(remaining, self.step_body()).await {
                Err(_) => {
                    self.note_timeout();
                    return Ok(());
                }
                Ok(Err(error)) => return Err(error),
                Ok(Ok(StepControl::Terminated)) => {
                    self.record.terminated = true;
                    return Ok(());
                }
                Ok(Ok(StepControl::Continue)) => {}
            }
        }
    }

    async fn step_body(&mut self) -> Result<StepControl> {
        let step = self.step_count;
        let page = self.env.observe().await?;
        self.record.observations.push(ObservationDigest {
            step,
            url: page.url.clone(),
            html_chars: page.html.chars().count(),
        });

        if step == 0 {
            self.visitor.perceive(&page).await?;
        } else {
            let (perceived, feedback) =
                tokio::join!(self.visitor.perceive(&page), self.visitor.feedback(&page));
            perceived?;
            feedback?;
        }

        // the cadence task starts once, after the first perception has
        // seeded memory with something to think about
        if self.config.background_cadence && self.cadence.is_none() {
            self.cadence = Some(CadenceTask::spawn(
                Arc::clone(&self.visitor),
                Duration::from_millis(self.config.cadence_interval_ms),
            ));
        }

        let due_reflect = self.config.enable_reflect
            && step as i64 - self.last_reflect_step >= self.config.reflect_every_steps as i64;
        let due_wonder = self.config.enable_wonder
            && step as i64 - self.last_wonder_step >= self.config.wonder_every_steps as i64;
        let due_update = self.config.enable_memory_update
            && step as i64 - self.last_update_step >= self.config.memory_update_every_steps as i64;

        let (reflected, wondered, updated) = tokio::join!(
            async {
                if due_reflect {
                    self.visitor.reflect().await.map(|_| true)
                } else {
                    Ok(false)
                }
            },
            async {
                if due_wonder {
                    self.visitor.wonder().await.map(|_| true)
                } else {
                    Ok(false)
                }
            },
            async {
                if due_update {
                    self.visitor.update_memory().await;
                    true
                } else {
                    false
                }
            },
        );
        // markers move only for phases that actually completed
        if matches!(reflected, Ok(true)) {
            self.last_reflect_step = step as i64;
        }
        if matches!(wondered, Ok(true)) {
            self.last_wonder_step = step as i64;
        }
        if updated {
            self.last_update_step = step as i64;
        }
        reflected?;
        wondered?;

        let plan_due = !self.visitor.has_plan().await
            || step as i64 - self.last_plan_step >= self.config.plan_every_steps as i64;
        if plan_due {
            self.visitor.plan().await?;
            self.last_plan_step = step as i64;
        }

        let action = self.visitor.choose_action(&page, &mut self.rng).await?;
        if self.record.timing.time_to_first_action_ms.is_none() {
            self.record.timing.time_to_first_action_ms =
                Some(self.started.elapsed().as_millis() as u64);
        }
        if matches!(action, Action::Back) {
            self.record.timing.backtrack_count += 1;
        }
        self.record.actions.push(action.clone());

        // the step is complete once an action exists; later pieces land
        // under the next timestamp
        {
            let memory = self.visitor.memory();
            let mut guard = memory.lock().await;
            guard.advance();
        }
        self.step_count += 1;

        if action.is_terminal() {
            info!(
                target = "session",
                run_id = %self.record.run_id,
                step,
                "Visitor ended the session"
            );
            return Ok(StepControl::Terminated);
        }

        info!(
            target = "session",
            run_id = %self.record.run_id,
            step,
            action = action.name(),
            "Executing action"
        );
        let outcome = self.env.step(&action).await?;
        // the most recent score reported by the environment wins
        if outcome.score.is_some() {
            self.record.score = outcome.score;
        }
        if outcome.terminated {
            info!(
                target = "session",
                run_id = %self.record.run_id,
                step,
                "Environment reported termination"
            );
            return Ok(StepControl::Terminated);
        }
        Ok(StepControl::Continue)
    }

    fn note_timeout(&mut self) {
        warn!(
            target = "session",
            run_id = %self.record.run_id,
            timeout_ms = self.config.session_timeout_ms,
            "Session timed out"
        );
        self.record.terminated = true;
    }

    async fn cleanup(&mut self) {
        if let Some(cadence) = self.cadence.take() {
            cadence
                .shutdown(Duration::from_millis(self.config.cadence_grace_ms))
                .await;
        }
        match timeout(ENV_CLOSE_TIMEOUT, self.env.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(
                target = "session",
                run_id = %self.record.run_id,
                error = %error,
                "Environment close failed"
            ),
            Err(_) => warn!(
                target = "session",
                run_id = %self.record.run_id,
                "Environment close timed out"
            ),
        }
    }
}
