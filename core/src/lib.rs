// Footfall Core Library
// LLM-driven simulated-visitor engine for website usability panels

pub mod action;
pub mod agent;
pub mod batch;
pub mod env;
pub mod llm;
pub mod memory;
pub mod prompts;

// Export core types
pub use action::{Action, ScrollDirection};
pub use agent::{RunRecord, Session, Visitor, VisitorConfig};
pub use batch::{BatchOptions, BatchRunner, SessionSpec};
pub use env::{EnvFactory, PageObservation, StepOutcome, WebEnvironment};
pub use llm::{CallLog, ChatBackend, ChatMessage, ChatRequest, GatewayConfig, LlmGateway, ModelTier};
pub use memory::{KindWeights, MemoryKind, MemoryLog, MemoryPiece, RecentAnchors, RetrievalQuery};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FootfallError {
    #[error("Gateway error: {0}")]
    GatewayError(String),

    #[error("Environment error: {0}")]
    EnvironmentError(String),

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, FootfallError>;
