//! LLM plumbing: backend transport, tiered gateway, JSON extraction, and
//! call tracing.
//!
//! This module provides:
//! - [`ChatBackend`] / [`OpenAiBackend`] for talking to OpenAI-compatible servers
//! - [`LlmGateway`] with tier routing, retry with backoff, and JSON-mode extraction
//! - [`extract_json_object`] for carving a balanced JSON object out of prose
//! - [`CallLog`] as an optional transcript of every completion

mod backend;
mod gateway;
mod json;
mod trace;

pub use backend::{BackendConfig, ChatBackend, OpenAiBackend};
pub use gateway::{ChatMessage, ChatRequest, GatewayConfig, LlmGateway, ModelTier};
pub use json::extract_json_object;
pub use trace::{CallLog, CallRecord};
