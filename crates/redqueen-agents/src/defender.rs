// RedQueen LLM defender
// Prompts a model for a patched target and parses the replacement source

use async_trait::async_trait;
use regex::Regex;
use tracing::warn;

use redqueen_engine::{AttackCandidate, DefenseAgent, HardenError, PatchCandidate, Result};

use crate::client::{ChatClient, ChatPrompt};

const MAX_TOKENS: u32 = 2000;
const DEFENSE_TEMPERATURE: f32 = 0.5;
const EXPLANATION_LIMIT: usize = 300;
const SHOWN_ATTACKS: usize = 3;

const SYSTEM_PROMPT: &str = r#"You are a senior security engineer. Make the code BULLETPROOF.

Your job: Fix ALL vulnerabilities while keeping original functionality.

DEFENSE STRATEGIES (use multiple):

1. INPUT VALIDATION (at function start):
   - Check types: isinstance(x, str)
   - Check values: if not x or len(x) > MAX_SIZE
   - Raise ValueError/TypeError with clear messages

2. RECURSION PROTECTION:
   - Add max_depth parameter with default
   - Track current depth, raise if exceeded

3. DICT AND COLLECTION SAFETY:
   - Use .get() instead of []
   - Check key exists before access
   - Handle None values

4. RESOURCE LIMITS:
   - Limit string length and recursion depth
   - Reject absurdly large inputs with ValueError

CRITICAL RULES:
1. Keep original function signatures
2. Original functionality MUST still work (sanity tests must pass)
3. Add validation at the START of each function
4. Use specific exceptions (ValueError, TypeError), not bare Exception
5. Include helpful error messages like "Input cannot be empty"

Output format:
```python
# Complete fixed code for ALL functions
```

Then briefly explain each fix."#;

/// LLM-backed implementation of the engine's defender contract.
pub struct LlmDefender {
    client: ChatClient,
    model: String,
    code_block_re: Regex,
    any_block_re: Regex,
    strip_blocks_re: Regex,
}

impl LlmDefender {
    pub fn new(client: ChatClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            code_block_re: Regex::new(r"(?s)```python\s*\n(.*?)```").unwrap(),
            any_block_re: Regex::new(r"(?s)```\s*\n(.*?)```").unwrap(),
            strip_blocks_re: Regex::new(r"(?s)```.*?```").unwrap(),
        }
    }

    fn build_prompt(target_source: &str, failing_attacks: &[AttackCandidate]) -> String {
        let mut prompt = format!("Current code:\n```python\n{}\n```\n\n", target_source);

        prompt.push_str("Failing tests:\n");
        for attack in failing_attacks.iter().take(SHOWN_ATTACKS) {
            prompt.push_str(&format!("```python\n{}\n```\n", attack.test_code));
        }

        prompt.push_str("\nFix the code:");
        prompt
    }

    fn parse(&self, content: &str) -> Option<PatchCandidate> {
        let fixed_code = self
            .code_block_re
            .captures(content)
            .or_else(|| self.any_block_re.captures(content))
            .map(|caps| caps[1].trim().to_string());

        let Some(fixed_code) = fixed_code else {
            warn!("No code block in defender response");
            return None;
        };

        let explanation: String = self
            .strip_blocks_re
            .replace_all(content, "")
            .trim()
            .chars()
            .take(EXPLANATION_LIMIT)
            .collect();

        Some(PatchCandidate {
            fixed_code,
            explanation,
        })
    }
}

#[async_trait]
impl DefenseAgent for LlmDefender {
    async fn generate_defense(
        &self,
        target_source: &str,
        failing_attacks: &[AttackCandidate],
        previous_fixes: &[String],
    ) -> Result<Option<PatchCandidate>> {
        let mut prompt = Self::build_prompt(target_source, failing_attacks);
        if !previous_fixes.is_empty() {
            prompt.push_str("\n\nEarlier fixes that were not enough:\n");
            for fix in previous_fixes.iter().rev().take(3) {
                let summary: String = fix.chars().take(120).collect();
                prompt.push_str(&format!("- {}\n", summary));
            }
        }

        let content = self
            .client
            .complete(&ChatPrompt {
                model: self.model.clone(),
                system: SYSTEM_PROMPT.to_string(),
                user: prompt,
                temperature: DEFENSE_TEMPERATURE,
                max_tokens: MAX_TOKENS,
            })
            .await
            .map_err(|e| HardenError::AgentFailure {
                reason: e.to_string(),
            })?;

        Ok(self.parse(&content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::ApiCredentials;

    fn defender() -> LlmDefender {
        let credentials = ApiCredentials {
            api_key: "test-key".to_string(),
            base_url: "http://localhost:0".to_string(),
            provider: "test",
        };
        LlmDefender::new(ChatClient::new(credentials).unwrap(), "test-model")
    }

    #[test]
    fn parses_patch_and_explanation() {
        let content = "```python\ndef div(a, b):\n    if b == 0:\n        raise ValueError('Invalid input')\n    return a / b\n```\nAdded a zero-divisor guard.";
        let patch = defender().parse(content).unwrap();
        assert!(patch.fixed_code.contains("raise ValueError"));
        assert_eq!(patch.explanation, "Added a zero-divisor guard.");
    }

    #[test]
    fn rejects_response_without_code() {
        assert!(defender().parse("I suggest adding validation.").is_none());
    }

    #[test]
    fn prompt_shows_at_most_three_attacks() {
        let attacks: Vec<AttackCandidate> = (0..5)
            .map(|i| AttackCandidate {
                test_code: format!("def test_{}():\n    boom({})", i, i),
                description: format!("attack {}", i),
                type_hint: None,
            })
            .collect();

        let prompt = LlmDefender::build_prompt("def boom(x):\n    return x\n", &attacks);
        assert!(prompt.contains("def test_0"));
        assert!(prompt.contains("def test_2"));
        assert!(!prompt.contains("def test_3"));
    }
}
