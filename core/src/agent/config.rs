//! Configuration for simulated visitors.

use serde::{Deserialize, Serialize};

use crate::memory::ScoringParams;

/// Configuration for a simulated visitor and its session loop.
#[derive(Debug, Clone)]
pub struct VisitorConfig {
    /// Steps between reflect passes
    pub reflect_every_steps: u64,

    /// Steps between wonder passes
    pub wonder_every_steps: u64,

    /// Steps between memory score backfills
    pub memory_update_every_steps: u64,

    /// Steps between plan refreshes (a missing plan always triggers one)
    pub plan_every_steps: u64,

    /// Whether reflect runs at all
    pub enable_reflect: bool,

    /// Whether wonder runs at all
    pub enable_wonder: bool,

    /// Whether the memory score backfill runs at all
    pub enable_memory_update: bool,

    /// Run reflect/wonder/update on a background timer as well
    pub background_cadence: bool,

    /// Background cadence interval in milliseconds
    pub cadence_interval_ms: u64,

    /// Grace period for the cadence task to wind down before abort
    pub cadence_grace_ms: u64,

    /// Wall-clock budget for a whole session in milliseconds
    pub session_timeout_ms: u64,

    /// How many trailing pieces the wonder phase sees
    pub wonder_window: usize,

    /// Cap on ranked pieces returned per retrieval
    pub retrieval_max_items: usize,

    /// Page HTML is cut to this many characters before prompting
    pub max_html_chars: usize,

    /// Terms scrubbed from page payloads before they reach the model
    pub redact_terms: Vec<String>,

    /// Scoring blend used by retrieval
    pub scoring: ScoringParams,

    /// Human-noise substitution for planned actions
    pub humanize: HumanizeConfig,
}

impl Default for VisitorConfig {
    fn default() -> Self {
        Self {
            reflect_every_steps: 3,
            wonder_every_steps: 4,
            memory_update_every_steps: 2,
            plan_every_steps: 1,
            enable_reflect: true,
            enable_wonder: true,
            enable_memory_update: true,
            background_cadence: false,
            cadence_interval_ms: 15_000,
            cadence_grace_ms: 2_000,
            session_timeout_ms: 1_200_000,
            wonder_window: 50,
            retrieval_max_items: 25,
            max_html_chars: 60_000,
            redact_terms: Vec::new(),
            scoring: ScoringParams::default(),
            humanize: HumanizeConfig::default(),
        }
    }
}

impl VisitorConfig {
    /// Set the reflect cadence in steps
    pub fn with_reflect_every(mut self, steps: u64) -> Self {
        self.reflect_every_steps = steps;
        self
    }

    /// Set the wonder cadence in steps
    pub fn with_wonder_every(mut self, steps: u64) -> Self {
        self.wonder_every_steps = steps;
        self
    }

    /// Set the memory backfill cadence in steps
    pub fn with_memory_update_every(mut self, steps: u64) -> Self {
        self.memory_update_every_steps = steps;
        self
    }

    /// Enable the background cadence timer
    pub fn with_background_cadence(mut self, interval_ms: u64) -> Self {
        self.background_cadence = true;
        self.cadence_interval_ms = interval_ms;
        self
    }

    /// Set the session wall-clock budget
    pub fn with_session_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.session_timeout_ms = timeout_ms;
        self
    }

    /// Set the terms scrubbed from page payloads
    pub fn with_redact_terms(mut self, terms: Vec<String>) -> Self {
        self.redact_terms = terms;
        self
    }

    /// Set the humanize knobs
    pub fn with_humanize(mut self, humanize: HumanizeConfig) -> Self {
        self.humanize = humanize;
        self
    }
}

/// Knobs for substituting planned actions with human-like noise.
///
/// Applied after the model picks an action and before the environment sees
/// it. Terminal actions are never substituted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanizeConfig {
    /// Whether substitution happens at all
    pub enabled: bool,

    /// Probability that a given planned action is replaced
    pub substitution_prob: f64,

    /// Relative weight of a read pause
    pub read_weight: f64,

    /// Relative weight of an idle wait
    pub wait_weight: f64,

    /// Relative weight of a scroll
    pub scroll_weight: f64,

    /// Relative weight of hovering a clickable
    pub hover_weight: f64,

    /// Read pause duration bounds in milliseconds
    pub read_ms_min: u64,
    pub read_ms_max: u64,

    /// Idle wait duration bounds in milliseconds
    pub wait_ms_min: u64,
    pub wait_ms_max: u64,

    /// Scroll distance bounds in pixels
    pub scroll_px_min: u32,
    pub scroll_px_max: u32,

    /// Probability that a substituted scroll goes down rather than up
    pub scroll_down_bias: f64,
}

impl Default for HumanizeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            substitution_prob: 0.35,
            read_weight: 0.30,
            wait_weight: 0.25,
            scroll_weight: 0.35,
            hover_weight: 0.10,
            read_ms_min: 1_500,
            read_ms_max: 4_500,
            wait_ms_min: 800,
            wait_ms_max: 2_000,
            scroll_px_min: 200,
            scroll_px_max: 600,
            scroll_down_bias: 0.8,
        }
    }
}

impl HumanizeConfig {
    /// Enabled with default weights and bounds
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Set the substitution probability
    pub fn with_substitution_prob(mut self, prob: f64) -> Self {
        self.substitution_prob = prob;
        self
    }
}
