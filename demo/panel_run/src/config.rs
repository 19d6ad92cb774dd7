use std::fs;
use std::path::{Path, PathBuf};

use footfall_core::agent::HumanizeConfig;
use footfall_core::llm::{BackendConfig, GatewayConfig};
use footfall_core::{SessionSpec, VisitorConfig};

/// High-level configuration for the panel demo
#[derive(Clone, Debug)]
pub struct PanelConfig {
    pub llm: LlmSettings,
    pub panel: PanelSettings,
    pub personas: Vec<PersonaEntry>,
}

/// LLM connection and routing settings, one section over both the backend
/// and the gateway.
#[derive(Clone, Debug)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
    pub temperature: f32,
    pub fast_model: String,
    pub deep_model: String,
    pub embed_model: String,
    pub max_attempts: u32,
}

/// Batch-level knobs for the demo panel.
#[derive(Clone, Debug)]
pub struct PanelSettings {
    pub start_url: String,
    pub max_steps: u64,
    pub concurrency: usize,
    pub session_timeout_ms: u64,
    pub humanize: bool,
    pub background_cadence: bool,
    pub cadence_interval_ms: u64,
    /// Where the final JSON report lands; empty string disables it.
    pub report_path: Option<PathBuf>,
}

/// One simulated visitor: who they are and what they came to do.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct PersonaEntry {
    pub persona: String,
    pub intent: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        // the core defaults already read LLM_* env vars; inherit them
        let backend = BackendConfig::default();
        let gateway = GatewayConfig::default();
        Self {
            base_url: backend.base_url,
            api_key: backend.api_key,
            request_timeout_ms: backend.request_timeout_ms,
            temperature: backend.temperature,
            fast_model: gateway.fast_model,
            deep_model: gateway.deep_model,
            embed_model: gateway.embed_model,
            max_attempts: gateway.max_attempts,
        }
    }
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            start_url: std::env::var("PANEL_START_URL")
                .unwrap_or_else(|_| "https://demo-storefront.test".to_string()),
            max_steps: std::env::var("PANEL_MAX_STEPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(12),
            concurrency: std::env::var("PANEL_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            session_timeout_ms: 300_000,
            humanize: true,
            background_cadence: false,
            cadence_interval_ms: 15_000,
            report_path: Some(PathBuf::from("panel_report.json")),
        }
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            panel: PanelSettings::default(),
            personas: vec![
                PersonaEntry {
                    persona: "Maya, 29, UX researcher who shops online weekly and skims pages fast"
                        .to_string(),
                    intent: "find a waterproof jacket under $100 and get it into the cart"
                        .to_string(),
                },
                PersonaEntry {
                    persona: "Raj, 41, careful comparison shopper who reads details before acting"
                        .to_string(),
                    intent: "check whether shipping is free before committing to a purchase"
                        .to_string(),
                },
                PersonaEntry {
                    persona: "Elena, 63, occasional online shopper who dislikes cluttered pages"
                        .to_string(),
                    intent: "buy a birthday gift for a grandchild who likes hiking".to_string(),
                },
            ],
        }
    }
}

impl PanelConfig {
    /// Load configuration from a TOML file (path via PANEL_CONFIG or
    /// ./panel_run.toml), overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path = std::env::var("PANEL_CONFIG").unwrap_or_else(|_| "panel_run.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target = "panel_run", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<PanelToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target = "panel_run", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target = "panel_run", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            base_url: self.llm.base_url.clone(),
            api_key: self.llm.api_key.clone(),
            request_timeout_ms: self.llm.request_timeout_ms,
            temperature: self.llm.temperature,
        }
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig::default()
            .with_models(
                self.llm.fast_model.clone(),
                self.llm.deep_model.clone(),
                self.llm.embed_model.clone(),
            )
            .with_max_attempts(self.llm.max_attempts)
    }

    pub fn visitor_config(&self) -> VisitorConfig {
        let mut config =
            VisitorConfig::default().with_session_timeout_ms(self.panel.session_timeout_ms);
        if self.panel.humanize {
            config = config.with_humanize(HumanizeConfig::enabled());
        }
        if self.panel.background_cadence {
            config = config.with_background_cadence(self.panel.cadence_interval_ms);
        }
        config
    }

    pub fn session_specs(&self) -> Vec<SessionSpec> {
        self.personas
            .iter()
            .map(|entry| SessionSpec::new(entry.persona.clone(), entry.intent.clone()))
            .collect()
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct PanelToml {
    pub llm: Option<LlmToml>,
    pub panel: Option<PanelSectionToml>,
    pub personas: Option<Vec<PersonaEntry>>,
}

impl PanelToml {
    fn overlay(self, mut base: PanelConfig) -> PanelConfig {
        if let Some(l) = self.llm {
            l.apply(&mut base.llm);
        }
        if let Some(p) = self.panel {
            p.apply(&mut base.panel);
        }
        if let Some(personas) = self.personas {
            if !personas.is_empty() {
                base.personas = personas;
            }
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct LlmToml {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub temperature: Option<f32>,
    pub fast_model: Option<String>,
    pub deep_model: Option<String>,
    pub embed_model: Option<String>,
    pub max_attempts: Option<u32>,
}

impl LlmToml {
    fn apply(self, l: &mut LlmSettings) {
        if let Some(x) = self.base_url {
            l.base_url = x;
        }
        if let Some(x) = self.api_key {
            l.api_key = Some(x);
        }
        if let Some(x) = self.request_timeout_ms {
            l.request_timeout_ms = x;
        }
        if let Some(x) = self.temperature {
            l.temperature = x;
        }
        if let Some(x) = self.fast_model {
            l.fast_model = x;
        }
        if let Some(x) = self.deep_model {
            l.deep_model = x;
        }
        if let Some(x) = self.embed_model {
            l.embed_model = x;
        }
        if let Some(x) = self.max_attempts {
            l.max_attempts = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct PanelSectionToml {
    pub start_url: Option<String>,
    pub max_steps: Option<u64>,
    pub concurrency: Option<usize>,
    pub session_timeout_ms: Option<u64>,
    pub humanize: Option<bool>,
    pub background_cadence: Option<bool>,
    pub cadence_interval_ms: Option<u64>,
    pub report_path: Option<String>,
}

impl PanelSectionToml {
    fn apply(self, p: &mut PanelSettings) {
        if let Some(x) = self.start_url {
            p.start_url = x;
        }
        if let Some(x) = self.max_steps {
            p.max_steps = x;
        }
        if let Some(x) = self.concurrency {
            p.concurrency = x.max(1);
        }
        if let Some(x) = self.session_timeout_ms {
            p.session_timeout_ms = x;
        }
        if let Some(x) = self.humanize {
            p.humanize = x;
        }
        if let Some(x) = self.background_cadence {
            p.background_cadence = x;
        }
        if let Some(x) = self.cadence_interval_ms {
            p.cadence_interval_ms = x;
        }
        if let Some(x) = self.report_path {
            p.report_path = if x.is_empty() {
                None
            } else {
                Some(PathBuf::from(x))
            };
        }
    }
}
