//! # Engine Error Types
//!
//! Error handling for the hardening engine.
//!
//! Recoverable failures (an agent that produced nothing usable, a sandbox
//! that could not launch) are consumed inside the round controller and never
//! abort a run. Only configuration problems are fatal. Evaluation timeouts
//! are not errors at all: the sandbox reports them as structured results.

use thiserror::Error;

/// Hardening engine specific errors
#[derive(Error, Debug)]
pub enum HardenError {
    #[error("Agent failure: {reason}")]
    AgentFailure { reason: String },

    #[error("Sandbox failure: {reason}")]
    SandboxFailure { reason: String },

    #[error("Configuration error: {field} - {reason}")]
    ConfigurationError { field: String, reason: String },

    #[error("Target error: {0}")]
    Target(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, HardenError>;
