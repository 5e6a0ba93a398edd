// RedQueen LLM attacker
// Prompts a model for crashing test cases and parses whatever comes back

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use redqueen_engine::{
    extract_functions, AttackAgent, AttackCandidate, AttackType, HardenError, Result,
};

use crate::client::{ChatClient, ChatPrompt};

const MAX_TOKENS: u32 = 2000;
const GENERATION_TEMPERATURE: f32 = 1.0;
const MUTATION_TEMPERATURE: f32 = 1.0;
const CROSSOVER_TEMPERATURE: f32 = 0.9;
const DESCRIPTION_LIMIT: usize = 100;

const SYSTEM_PROMPT: &str = r#"You are an elite adversarial security researcher. Find bugs that others miss.

IMPORTANT: You must find NEW and DIFFERENT vulnerabilities each time. Do not repeat attacks!

Attack categories (USE ALL OF THEM, not just edge_case):
1. edge_case: empty string "", None, [], {}
2. invalid_input: wrong types (int instead of str, list instead of dict)
3. overflow: deep recursion, huge numbers (10**1000), very long strings (10000 chars)
4. injection: control characters (\x00, \n, \r), unicode exploits, escape sequences
5. boundary: MAX_INT, MIN_INT, float('inf'), float('nan')
6. concurrency: (if applicable) race conditions
7. resource: memory exhaustion, CPU exhaustion

CRITICAL RULES:
1. DO NOT use pytest.raises() - let the code CRASH
2. DO NOT use try/except - let exceptions propagate
3. Each test must call a REAL function from the target code
4. The target usually has MULTIPLE functions - attack different ones

VARIETY IS KEY: if previous attacks hit one function, go after another!

Output ONE test function in a ```python``` block, then state:
Attack type: <category>
Description: <one line>

Generate ONE creative attack that is DIFFERENT from previous attempts."#;

const MUTATION_SYSTEM_PROMPT: &str = "You evolve attacks through mutation.";
const CROSSOVER_SYSTEM_PROMPT: &str = "You combine attack strategies.";

/// LLM-backed implementation of the engine's attacker contract.
pub struct LlmAttacker {
    client: ChatClient,
    model: String,
    parser: AttackParser,
}

impl LlmAttacker {
    pub fn new(client: ChatClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            parser: AttackParser::new(),
        }
    }

    fn build_generation_prompt(
        target_source: &str,
        previous_attacks: &[AttackCandidate],
        failed_attacks: &[AttackCandidate],
    ) -> String {
        let functions = extract_functions(target_source);

        let mut prompt = format!("Target code:\n```python\n{}\n```\n\n", target_source);

        if !functions.is_empty() {
            prompt.push_str(&format!("Attack ONLY these functions: {:?}\n\n", functions));
        }

        if !previous_attacks.is_empty() {
            let mut by_type: std::collections::BTreeMap<&str, usize> =
                std::collections::BTreeMap::new();
            let mut by_function: std::collections::BTreeMap<&str, usize> =
                std::collections::BTreeMap::new();
            for attack in previous_attacks {
                if let Some(tag) = attack.type_hint {
                    *by_type.entry(tag.as_str()).or_insert(0) += 1;
                }
                for function in &functions {
                    if attack.test_code.contains(function.as_str()) {
                        *by_function.entry(function.as_str()).or_insert(0) += 1;
                    }
                }
            }

            prompt.push_str("ALREADY TRIED (find something DIFFERENT!):\n");
            prompt.push_str(&format!("Attack types used: {:?}\n", by_type));
            prompt.push_str(&format!("Functions attacked: {:?}\n", by_function));

            prompt.push_str("\nRecent attacks:\n");
            for attack in previous_attacks.iter().rev().take(5) {
                let tag = attack
                    .type_hint
                    .map(|t| t.as_str())
                    .unwrap_or("unknown");
                let description: String =
                    attack.description.chars().take(60).collect();
                prompt.push_str(&format!("- [{}] {}...\n", tag, description));
            }

            let untried: Vec<&str> = AttackType::ALL
                .iter()
                .filter(|t| **t != AttackType::Unknown && !by_type.contains_key(t.as_str()))
                .map(|t| t.as_str())
                .collect();
            let unattacked: Vec<&str> = functions
                .iter()
                .filter(|f| !by_function.contains_key(f.as_str()))
                .map(String::as_str)
                .collect();

            if !untried.is_empty() {
                prompt.push_str(&format!("\nHINT: Try these attack types: {:?}\n", untried));
            }
            if !unattacked.is_empty() {
                prompt.push_str(&format!("HINT: Try attacking these functions: {:?}\n", unattacked));
            }
            prompt.push('\n');
        }

        if !failed_attacks.is_empty() {
            prompt.push_str("These recent attempts did NOT crash the code, avoid them:\n");
            for attack in failed_attacks.iter().rev().take(5) {
                let description: String =
                    attack.description.chars().take(60).collect();
                prompt.push_str(&format!("- {}\n", description));
            }
            prompt.push('\n');
        }

        prompt.push_str("Generate a NEW and DIFFERENT attack:");
        prompt
    }

    async fn ask(&self, system: &str, user: String, temperature: f32) -> Result<String> {
        self.client
            .complete(&ChatPrompt {
                model: self.model.clone(),
                system: system.to_string(),
                user,
                temperature,
                max_tokens: MAX_TOKENS,
            })
            .await
            .map_err(|e| HardenError::AgentFailure {
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl AttackAgent for LlmAttacker {
    async fn generate_attack(
        &self,
        target_source: &str,
        previous_attacks: &[AttackCandidate],
        failed_attacks: &[AttackCandidate],
    ) -> Result<Option<AttackCandidate>> {
        let prompt = Self::build_generation_prompt(target_source, previous_attacks, failed_attacks);
        let content = self.ask(SYSTEM_PROMPT, prompt, GENERATION_TEMPERATURE).await?;
        Ok(self.parser.parse(&content))
    }

    async fn mutate_attack(&self, parent: &AttackCandidate) -> Result<Option<AttackCandidate>> {
        let description: String = parent.description.chars().take(200).collect();
        let prompt = format!(
            "You are mutating a successful attack to create a variant.\n\n\
             ORIGINAL ATTACK (this worked!):\n```python\n{}\n```\n\n\
             What it did: {}\n\n\
             Create a MUTATION - keep the core idea but change ONE thing:\n\
             - Different input values (but same attack vector)\n\
             - Same input, target a different function\n\
             - Make it more extreme (deeper recursion, longer string, etc.)\n\n\
             The mutation should still crash the code but in a slightly different way.\n\n\
             Output the mutated test in a ```python``` block.",
            parent.test_code, description
        );

        let content = self.ask(MUTATION_SYSTEM_PROMPT, prompt, MUTATION_TEMPERATURE).await?;
        let mut candidate = self.parser.parse(&content);
        if let Some(candidate) = candidate.as_mut() {
            candidate.type_hint = candidate.type_hint.or(parent.type_hint);
            let parent_summary: String = parent.description.chars().take(50).collect();
            candidate.description = format!("Mutated: {}", parent_summary);
        }
        Ok(candidate)
    }

    async fn crossover_attacks(
        &self,
        first: &AttackCandidate,
        second: &AttackCandidate,
    ) -> Result<Option<AttackCandidate>> {
        let tag = |attack: &AttackCandidate| {
            attack
                .type_hint
                .map(|t| t.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string())
        };
        let prompt = format!(
            "Combine two successful attacks into one stronger attack.\n\n\
             ATTACK 1 ({}):\n```python\n{}\n```\n\n\
             ATTACK 2 ({}):\n```python\n{}\n```\n\n\
             Create ONE NEW attack that combines their strategies.\n\n\
             Output the combined test in a ```python``` block.",
            tag(first),
            first.test_code,
            tag(second),
            second.test_code
        );

        let content = self.ask(CROSSOVER_SYSTEM_PROMPT, prompt, CROSSOVER_TEMPERATURE).await?;
        let mut candidate = self.parser.parse(&content);
        if let Some(candidate) = candidate.as_mut() {
            candidate.description = "Crossover".to_string();
        }
        Ok(candidate)
    }
}

/// Tolerant parser for attacker responses. Models vary wildly in formatting,
/// so every extraction has fallbacks.
struct AttackParser {
    python_block_re: Regex,
    any_block_re: Regex,
    type_line_re: Regex,
    type_comment_re: Regex,
    description_line_re: Regex,
    code_comment_re: Regex,
}

impl AttackParser {
    fn new() -> Self {
        Self {
            python_block_re: Regex::new(r"(?s)```python\s*\n(.*?)```").unwrap(),
            any_block_re: Regex::new(r"(?s)```\s*\n(.*?)```").unwrap(),
            type_line_re: Regex::new(r"(?i)Attack type:\s*([a-z_ -]+)").unwrap(),
            type_comment_re: Regex::new(
                r"(?i)#\s*Attack.*?(edge.?case|invalid.?input|overflow|injection|boundary|resource)",
            )
            .unwrap(),
            description_line_re: Regex::new(r"(?i)Description:\s*(.+)").unwrap(),
            code_comment_re: Regex::new(r"#\s*(.+)").unwrap(),
        }
    }

    fn parse(&self, content: &str) -> Option<AttackCandidate> {
        debug!("Attacker response: {}", &content.chars().take(500).collect::<String>());

        let test_code = self
            .python_block_re
            .captures(content)
            .or_else(|| self.any_block_re.captures(content))
            .map(|caps| caps[1].trim().to_string())?;

        if !test_code.contains("def test") {
            warn!("No test function in attacker response");
            return None;
        }

        let type_hint = self
            .type_line_re
            .captures(content)
            .and_then(|caps| AttackType::from_tag(&caps[1]))
            .or_else(|| {
                self.type_comment_re
                    .captures(content)
                    .and_then(|caps| AttackType::from_tag(&caps[1]))
            });

        let description = self.extract_description(content, &test_code);

        Some(AttackCandidate {
            test_code,
            description,
            type_hint,
        })
    }

    fn extract_description(&self, content: &str, test_code: &str) -> String {
        if let Some(caps) = self.description_line_re.captures(content) {
            return caps[1].trim().chars().take(DESCRIPTION_LIMIT).collect();
        }

        if let Some(caps) = self.code_comment_re.captures(test_code) {
            return caps[1].trim().chars().take(DESCRIPTION_LIMIT).collect();
        }

        // Last resort: the final full sentence before the code block.
        let before_code = content.split("```").next().unwrap_or("").trim();
        for sentence in before_code.split('.').rev() {
            let sentence = sentence.trim();
            if sentence.len() > 10 {
                return sentence.chars().take(DESCRIPTION_LIMIT).collect();
            }
        }

        "No description".to_string()
    }
}
