//! # RedQueen Agents
//!
//! LLM-backed implementations of the engine's attacker and defender
//! contracts, speaking the OpenAI-compatible chat-completions dialect that
//! OpenRouter, NanoGPT and OpenAI all share.
//!
//! Credentials are discovered from the environment at startup; response
//! parsing is deliberately tolerant because models vary in formatting; the
//! only retry policy is one retry on transient API failures.

pub mod attacker;
pub mod client;
pub mod credentials;
pub mod defender;

pub use attacker::LlmAttacker;
pub use client::{ChatClient, ChatPrompt};
pub use credentials::*;
pub use defender::LlmDefender;

use redqueen_engine::Result;

/// Builds an attacker/defender pair from environment credentials.
///
/// Fails with a configuration error when no API key is set; a run must not
/// start without working agents.
pub fn agents_from_env(
    attacker_model: &str,
    defender_model: &str,
) -> Result<(LlmAttacker, LlmDefender)> {
    let credentials = ApiCredentials::require_from_env()?;
    tracing::info!("Using {} as the API provider", credentials.provider);

    let attacker_client = ChatClient::new(credentials.clone())
        .map_err(redqueen_engine::HardenError::Generic)?;
    let defender_client = ChatClient::new(credentials)
        .map_err(redqueen_engine::HardenError::Generic)?;

    Ok((
        LlmAttacker::new(attacker_client, attacker_model),
        LlmDefender::new(defender_client, defender_model),
    ))
}
