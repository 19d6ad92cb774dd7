//! Bounded-concurrency execution of a panel of visitor sessions.
//!
//! Every (persona, intent) pair gets its own session with a fresh
//! environment and memory; they all share one gateway. A semaphore caps how
//! many sessions run at once, and results come back in input order. A dead
//! session never takes the batch down: it becomes an error record instead.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, warn};

use crate::agent::{RunRecord, Session, Visitor, VisitorConfig};
use crate::env::EnvFactory;
use crate::llm::LlmGateway;

/// Progress callback, fired as `(completed, total)` after each session.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// One (persona, intent) pair to simulate.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub persona: String,
    pub intent: String,
}

impl SessionSpec {
    pub fn new(persona: impl Into<String>, intent: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            intent: intent.into(),
        }
    }
}

/// Batch-wide knobs.
#[derive(Clone)]
pub struct BatchOptions {
    /// Every session's environment opens on this URL.
    pub start_url: String,
    /// Per-session step budget.
    pub max_steps: u64,
    /// Sessions allowed in flight at once.
    pub concurrency: usize,
    /// Fired after each session completes; panics are swallowed.
    pub on_progress: Option<ProgressFn>,
}

impl BatchOptions {
    pub fn new(start_url: impl Into<String>) -> Self {
        Self {
            start_url: start_url.into(),
            max_steps: 50,
            concurrency: 4,
            on_progress: None,
        }
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_progress(
        mut self,
        callback: impl Fn(usize, usize) + Send + Sync + 'static,
    ) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }
}

/// Runs a panel of sessions against one site.
pub struct BatchRunner {
    gateway: Arc<LlmGateway>,
    env_factory: Arc<dyn EnvFactory>,
    visitor_config: VisitorConfig,
}

impl BatchRunner {
    pub fn new(gateway: Arc<LlmGateway>, env_factory: Arc<dyn EnvFactory>) -> Self {
        Self {
            gateway,
            env_factory,
            visitor_config: VisitorConfig::default(),
        }
    }

    /// Use this config for every visitor in the batch.
    pub fn with_visitor_config(mut self, config: VisitorConfig) -> Self {
        self.visitor_config = config;
        self
    }

    /// Run every spec to completion and return records in input order.
    pub async fn run(&self, specs: Vec<SessionSpec>, options: BatchOptions) -> Vec<RunRecord> {
        let total = specs.len();
        info!(
            target = "batch",
            total,
            concurrency = options.concurrency,
            start_url = %options.start_url,
            "Batch starting"
        );

        let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
        let done = Arc::new(Mutex::new(0usize));

        let mut identities = Vec::with_capacity(total);
        let mut handles = Vec::with_capacity(total);
        for (index, spec) in specs.into_iter().enumerate() {
            identities.push((spec.persona.clone(), spec.intent.clone()));
            let semaphore = Arc::clone(&semaphore);
            let done = Arc::clone(&done);
            let gateway = Arc::clone(&self.gateway);
            let env_factory = Arc::clone(&self.env_factory);
            let config = self.visitor_config.clone();
            let options = options.clone();

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return RunRecord::failed(
                            format!("error_{index}"),
                            spec.persona,
                            spec.intent,
                            "admission semaphore closed",
                        );
                    }
                };
                let record = run_one(gateway, env_factory, config, spec, &options, index).await;

                // tick under the lock so every (completed, total) pair the
                // callback sees is exact
                let mut done = done.lock().await;
                *done += 1;
                if let Some(on_progress) = &options.on_progress {
                    let callback = Arc::clone(on_progress);
                    let completed = *done;
                    let call = AssertUnwindSafe(|| callback(completed, total));
                    if std::panic::catch_unwind(call).is_err() {
                        warn!(target = "batch", "Progress callback panicked");
                    }
                }
                record
            }));
        }

        let mut records = Vec::with_capacity(total);
        for (index, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(record) => records.push(record),
                Err(join_error) => {
                    error!(
                        target = "batch",
                        index,
                        error = %join_error,
                        "Session task died"
                    );
                    let (persona, intent) = identities[index].clone();
                    records.push(RunRecord::failed(
                        format!("error_{index}"),
                        persona,
                        intent,
                        join_error.to_string(),
                    ));
                }
            }
        }

        let failures = records.iter().filter(|record| record.error.is_some()).count();
        info!(target = "batch", total, failures, "Batch finished");
        records
    }
}

async fn run_one(
    gateway: Arc<LlmGateway>,
    env_factory: Arc<dyn EnvFactory>,
    config: VisitorConfig,
    spec: SessionSpec,
    options: &BatchOptions,
    index: usize,
) -> RunRecord {
    let env = match env_factory.open(&options.start_url).await {
        Ok(env) => env,
        Err(error) => {
            error!(
                target = "batch",
                index,
                error = %error,
                "Environment open failed"
            );
            return RunRecord::failed(
                format!("error_{index}"),
                spec.persona,
                spec.intent,
                error.to_string(),
            );
        }
    };
    let visitor = Arc::new(Visitor::new(spec.persona, spec.intent, gateway, config));
    Session::new(visitor, env, options.max_steps).run().await
}
