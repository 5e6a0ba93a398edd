//! API credential discovery.
//!
//! Providers are probed through environment variables in a fixed priority
//! order. Missing credentials are a fatal configuration error at startup,
//! never mid-run.

use redqueen_engine::{HardenError, Result};

pub const API_OPENROUTER: &str = "https://openrouter.ai/api/v1";
pub const API_NANOGPT: &str = "https://nano-gpt.com/api/v1";
pub const API_OPENAI: &str = "https://api.openai.com/v1";

// Model identifiers in OpenRouter notation.
pub const MODEL_GPT4O_MINI: &str = "openai/gpt-4o-mini";
pub const MODEL_GPT4O: &str = "openai/gpt-4o";
pub const MODEL_DEEPSEEK_CHAT: &str = "deepseek/deepseek-chat";
pub const MODEL_CLAUDE_HAIKU: &str = "anthropic/claude-3-haiku";
pub const MODEL_CLAUDE_SONNET: &str = "anthropic/claude-3.5-sonnet";
pub const MODEL_LLAMA_70B: &str = "meta-llama/llama-3.1-70b-instruct";

/// Resolved API endpoint and key.
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub base_url: String,
    pub provider: &'static str,
}

impl ApiCredentials {
    /// Probes `OPENROUTER_API_KEY`, `NANOGPT_API_KEY`, then
    /// `OPENAI_API_KEY`.
    pub fn from_env() -> Option<Self> {
        let candidates = [
            ("OPENROUTER_API_KEY", API_OPENROUTER, "OpenRouter"),
            ("NANOGPT_API_KEY", API_NANOGPT, "NanoGPT"),
            ("OPENAI_API_KEY", API_OPENAI, "OpenAI"),
        ];

        for (var, base_url, provider) in candidates {
            if let Ok(key) = std::env::var(var) {
                if !key.trim().is_empty() {
                    return Some(Self {
                        api_key: key,
                        base_url: base_url.to_string(),
                        provider,
                    });
                }
            }
        }
        None
    }

    pub fn require_from_env() -> Result<Self> {
        Self::from_env().ok_or_else(|| HardenError::ConfigurationError {
            field: "api_key".to_string(),
            reason: "no API key set; export OPENROUTER_API_KEY, NANOGPT_API_KEY or \
                     OPENAI_API_KEY"
                .to_string(),
        })
    }
}
