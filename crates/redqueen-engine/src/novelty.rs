//! Novelty gate for fresh attacks.
//!
//! Without deduplication an attacker happily rediscovers the same crash
//! forever, which reads as progress while the archive learns nothing. Three
//! checks, cheapest first: exact duplicates by normalized-code hash,
//! semantic duplicates by error signature cluster, and saturation of a whole
//! attack category.

use std::collections::{BTreeMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::genome::AttackType;

const SEMANTIC_CLUSTER_LIMIT: usize = 3;
const TYPE_SATURATION_LIMIT: u32 = 5;

/// Verdict on one candidate attack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoveltyVerdict {
    pub is_novel: bool,
    pub novelty_score: f64,
    pub reason: String,
    pub similar_to: Option<String>,
}

/// Tracker statistics for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoveltyStats {
    pub total_attacks: usize,
    pub unique_error_signatures: usize,
    pub attacks_by_type: BTreeMap<String, u32>,
    pub largest_cluster: usize,
}

pub struct NoveltyTracker {
    seen_hashes: HashSet<String>,
    error_clusters: BTreeMap<String, Vec<String>>,
    type_counts: BTreeMap<AttackType, u32>,
    comment_re: Regex,
    whitespace_re: Regex,
    exception_re: Regex,
}

impl NoveltyTracker {
    pub fn new() -> Self {
        Self {
            seen_hashes: HashSet::new(),
            error_clusters: BTreeMap::new(),
            type_counts: BTreeMap::new(),
            comment_re: Regex::new(r"#.*").unwrap(),
            whitespace_re: Regex::new(r"\s+").unwrap(),
            exception_re: Regex::new(r"(\w+Error|\w+Exception)").unwrap(),
        }
    }

    /// Hash of the code with comments stripped, whitespace collapsed, and
    /// case folded, so trivial reformatting does not count as novelty.
    fn hash_code(&self, code: &str) -> String {
        let without_comments = self.comment_re.replace_all(code, "");
        let collapsed = self.whitespace_re.replace_all(&without_comments, " ");
        let normalized = collapsed.trim().to_lowercase();
        let digest = Sha256::digest(normalized.as_bytes());
        hex::encode(digest)[..12].to_string()
    }

    /// Compact signature used to cluster semantically equivalent crashes.
    fn error_signature(&self, error_msg: &str) -> String {
        if error_msg.is_empty() {
            return "no_error".to_string();
        }

        let exception = self
            .exception_re
            .captures(error_msg)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let lower = error_msg.to_lowercase();
        let mut keywords = Vec::new();
        for (needle, keyword) in [
            ("division by zero", "div_zero"),
            ("index", "index"),
            ("key", "key"),
            ("type", "type"),
            ("overflow", "overflow"),
            ("recursion", "recursion"),
            ("timeout", "timeout"),
        ] {
            if lower.contains(needle) {
                keywords.push(keyword);
            }
        }

        if keywords.is_empty() {
            format!("{}:generic", exception)
        } else {
            format!("{}:{}", exception, keywords.join(","))
        }
    }

    pub fn check_novelty(
        &self,
        code: &str,
        attack_type: AttackType,
        error_msg: &str,
    ) -> NoveltyVerdict {
        let code_hash = self.hash_code(code);

        if self.seen_hashes.contains(&code_hash) {
            return NoveltyVerdict {
                is_novel: false,
                novelty_score: 0.0,
                reason: "exact_duplicate".to_string(),
                similar_to: Some(code_hash),
            };
        }

        let signature = self.error_signature(error_msg);
        let similar_count = self
            .error_clusters
            .get(&signature)
            .map(Vec::len)
            .unwrap_or(0);

        if similar_count >= SEMANTIC_CLUSTER_LIMIT {
            return NoveltyVerdict {
                is_novel: false,
                novelty_score: 0.2,
                reason: format!("semantic_duplicate: {} similar attacks", similar_count),
                similar_to: Some(signature),
            };
        }

        let type_count = self.type_counts.get(&attack_type).copied().unwrap_or(0);
        if type_count >= TYPE_SATURATION_LIMIT {
            // Saturated categories are still admitted, just devalued.
            let score = (1.0 - f64::from(type_count) * 0.1).max(0.3);
            return NoveltyVerdict {
                is_novel: true,
                novelty_score: score,
                reason: format!(
                    "type_saturated: {} attacks of type {}",
                    type_count, attack_type
                ),
                similar_to: None,
            };
        }

        let score = (1.0 - similar_count as f64 * 0.15).max(0.5);
        NoveltyVerdict {
            is_novel: true,
            novelty_score: score,
            reason: "novel".to_string(),
            similar_to: None,
        }
    }

    /// Registers an accepted attack so later candidates are compared to it.
    pub fn register(&mut self, code: &str, attack_type: AttackType, error_msg: &str) {
        let code_hash = self.hash_code(code);
        self.seen_hashes.insert(code_hash.clone());

        let signature = self.error_signature(error_msg);
        self.error_clusters.entry(signature).or_default().push(code_hash);

        *self.type_counts.entry(attack_type).or_insert(0) += 1;
    }

    pub fn stats(&self) -> NoveltyStats {
        NoveltyStats {
            total_attacks: self.seen_hashes.len(),
            unique_error_signatures: self.error_clusters.len(),
            attacks_by_type: self
                .type_counts
                .iter()
                .map(|(t, c)| (t.as_str().to_string(), *c))
                .collect(),
            largest_cluster: self
                .error_clusters
                .values()
                .map(Vec::len)
                .max()
                .unwrap_or(0),
        }
    }
}

impl Default for NoveltyTracker {
    fn default() -> Self {
        Self::new()
    }
}
