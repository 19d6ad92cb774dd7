mod config;
mod scripted;

use config::PanelConfig;
use footfall_core::llm::{CallLog, LlmGateway, OpenAiBackend};
use footfall_core::{BatchOptions, BatchRunner};
use scripted::ScriptedStorefront;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,footfall_core=info,panel_run=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        target = "panel_run",
        "Starting panel demo: personas → sessions → scripted storefront → report"
    );

    // Load configuration (defaults + env + optional TOML overlay)
    let cfg = PanelConfig::load();
    info!(
        target = "panel_run",
        base_url = %cfg.llm.base_url,
        fast_model = %cfg.llm.fast_model,
        deep_model = %cfg.llm.deep_model,
        personas = cfg.personas.len(),
        "Configuration loaded"
    );

    // Gateway over an OpenAI-compatible server, with a call log for the
    // end-of-run stats
    let backend = Arc::new(OpenAiBackend::new(cfg.backend_config())?);
    let call_log = Arc::new(CallLog::new());
    let gateway = Arc::new(
        LlmGateway::new(backend, cfg.gateway_config()).with_call_log(Arc::clone(&call_log)),
    );

    // The storefront is scripted and in-memory, so the demo runs without a
    // browser; swap in a real EnvFactory to point the panel at a live site.
    let factory = Arc::new(ScriptedStorefront);
    let runner = BatchRunner::new(gateway, factory).with_visitor_config(cfg.visitor_config());

    let specs = cfg.session_specs();
    let options = BatchOptions::new(cfg.panel.start_url.clone())
        .with_max_steps(cfg.panel.max_steps)
        .with_concurrency(cfg.panel.concurrency)
        .with_progress(|completed, total| {
            info!(target = "panel_run", completed, total, "Session finished");
        });

    let records = runner.run(specs, options).await;

    // Per-session summary
    for record in &records {
        match &record.error {
            Some(error) => warn!(
                target = "panel_run",
                run_id = %record.run_id,
                persona = %record.persona,
                error = %error,
                "Session failed"
            ),
            None => info!(
                target = "panel_run",
                run_id = %record.run_id,
                persona = %record.persona,
                steps = record.steps_taken,
                terminated = record.terminated,
                score = ?record.score,
                backtracks = record.timing.backtrack_count,
                "Session summary"
            ),
        }
    }

    let failures = records.iter().filter(|r| r.error.is_some()).count();
    info!(
        target = "panel_run",
        sessions = records.len(),
        failures,
        llm_calls = call_log.len(),
        "Panel complete"
    );

    // Full records as JSON for offline analysis
    if let Some(path) = &cfg.panel.report_path {
        match serde_json::to_string_pretty(&records) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    error!(target = "panel_run", path = %path.display(), error = %e, "Failed to write report");
                } else {
                    info!(target = "panel_run", path = %path.display(), "Report written");
                }
            }
            Err(e) => error!(target = "panel_run", error = %e, "Failed to serialize report"),
        }
    }

    Ok(())
}
