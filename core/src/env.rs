//! Environment collaborator boundary.
//!
//! The browser-automation adapter lives outside this crate; sessions talk to
//! it through [`WebEnvironment`], and the batch runner mints one environment
//! per session through [`EnvFactory`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::Result;

/// What the agent can currently see on the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageObservation {
    pub url: String,
    pub html: String,
    #[serde(default)]
    pub clickable_elements: Vec<String>,
    #[serde(default)]
    pub tabs: Vec<String>,
}

/// Result of executing one action: the new page plus termination state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepOutcome {
    #[serde(flatten)]
    pub observation: PageObservation,
    #[serde(default)]
    pub terminated: bool,
    #[serde(default)]
    pub score: Option<f64>,
}

/// One live browsing context, exclusively owned by a single session.
#[async_trait]
pub trait WebEnvironment: Send + Sync {
    /// Snapshot the current page.
    async fn observe(&mut self) -> Result<PageObservation>;

    /// Execute one action and return the resulting page state.
    async fn step(&mut self, action: &Action) -> Result<StepOutcome>;

    /// Release underlying resources (browser context, network handles).
    async fn close(&mut self) -> Result<()>;
}

/// Produces one fresh [`WebEnvironment`] per session, already navigated to
/// the batch's start URL.
#[async_trait]
pub trait EnvFactory: Send + Sync {
    async fn open(&self, start_url: &str) -> Result<Box<dyn WebEnvironment>>;
}
