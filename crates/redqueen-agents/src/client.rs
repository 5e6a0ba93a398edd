//! OpenAI-compatible chat-completions client.
//!
//! One client serves every supported provider; they all speak the same
//! `/chat/completions` dialect. Transient API failures (rate limits, auth
//! hiccups, server errors) are retried exactly once after a short pause,
//! which is the whole retry policy the agent contract allows.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::credentials::ApiCredentials;

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);
const RETRY_PAUSE: Duration = Duration::from_secs(2);

/// One chat turn to send.
#[derive(Debug, Clone)]
pub struct ChatPrompt {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

pub struct ChatClient {
    api_key: String,
    base_url: String,
    client: Client,
}

impl ChatClient {
    pub fn new(credentials: ApiCredentials) -> Result<Self> {
        Ok(Self {
            api_key: credentials.api_key,
            base_url: credentials.base_url,
            client: Client::builder().timeout(HTTP_TIMEOUT).build()?,
        })
    }

    /// Sends a prompt, retrying once on transient failures.
    pub async fn complete(&self, prompt: &ChatPrompt) -> Result<String> {
        match self.complete_once(prompt).await {
            Ok(content) => Ok(content),
            Err(e) if is_transient(&e) => {
                warn!("API error (will retry once): {}", truncated(&e));
                tokio::time::sleep(RETRY_PAUSE).await;
                self.complete_once(prompt).await
            }
            Err(e) => Err(e),
        }
    }

    async fn complete_once(&self, prompt: &ChatPrompt) -> Result<String> {
        #[derive(Serialize)]
        struct ChatRequest {
            model: String,
            messages: Vec<Message>,
            max_tokens: u32,
            temperature: f32,
        }

        #[derive(Serialize, Deserialize)]
        struct Message {
            role: String,
            content: String,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }

        let request = ChatRequest {
            model: prompt.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                Message {
                    role: "user".to_string(),
                    content: prompt.user.clone(),
                },
            ],
            max_tokens: prompt.max_tokens,
            temperature: prompt.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("failed to send chat request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("API error {}: {}", status, body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("failed to parse chat response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("no choices in chat response"))
    }
}

fn is_transient(error: &anyhow::Error) -> bool {
    let message = error.to_string();
    message.contains("401")
        || message.contains("429")
        || message.contains("500")
        || message.contains("502")
        || message.contains("503")
        || error.downcast_ref::<reqwest::Error>().map(|e| e.is_timeout()).unwrap_or(false)
}

fn truncated(error: &anyhow::Error) -> String {
    let message = error.to_string();
    message.chars().take(100).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses_are_retryable() {
        assert!(is_transient(&anyhow!("API error 429 Too Many Requests: slow down")));
        assert!(is_transient(&anyhow!("API error 500 Internal Server Error: oops")));
        assert!(!is_transient(&anyhow!("API error 400 Bad Request: bad payload")));
    }
}
