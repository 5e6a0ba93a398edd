// RedQueen defense quality check
// Static inspection that catches patches which "win" by deleting behavior

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Penalty applied when a patch deletes more than half of the target.
const CODE_REDUCTION_PENALTY: f64 = 0.5;
/// Penalty applied when a patch adds more than this many try blocks.
const TRY_EXPLOSION_LIMIT: usize = 3;
const TRY_EXPLOSION_PENALTY: f64 = 0.2;

/// Outcome of a quality inspection. Advisory only: the controller records
/// the warnings and lets empirical fitness decide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub penalty: f64,
    pub warnings: Vec<String>,
}

impl QualityReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

struct SuspiciousPattern {
    regex: Regex,
    name: &'static str,
    penalty: f64,
}

/// Detects gaming patterns in candidate patches: handlers that swallow
/// everything, blanket early returns, and wholesale deletion of the target.
pub struct DefenseQualityChecker {
    patterns: Vec<SuspiciousPattern>,
    try_re: Regex,
}

impl DefenseQualityChecker {
    pub fn new() -> Self {
        let table: [(&str, &str, f64); 8] = [
            (r"except.*:\s*pass", "empty_except", 0.3),
            (r"except.*:\s*return None", "swallow_to_none", 0.4),
            (r"except.*:\s*return \{\}", "swallow_to_empty", 0.4),
            (r#"except.*:\s*return """#, "swallow_to_empty_str", 0.4),
            (r"except.*:\s*return \[\]", "swallow_to_empty_list", 0.4),
            (r"except\s*:", "bare_except", 0.2),
            (r"except Exception:", "catch_all_exception", 0.1),
            (r"if.*:\s*return None", "early_return_none", 0.1),
        ];

        Self {
            patterns: table
                .into_iter()
                .map(|(pattern, name, penalty)| SuspiciousPattern {
                    regex: Regex::new(pattern).unwrap(),
                    name,
                    penalty,
                })
                .collect(),
            try_re: Regex::new(r"\btry\s*:").unwrap(),
        }
    }

    /// Compares a candidate patch against the original target and reports
    /// every newly introduced suspicious pattern. The penalty is capped at
    /// 1.0.
    pub fn check(&self, original_code: &str, fixed_code: &str) -> QualityReport {
        let mut warnings = Vec::new();
        let mut penalty = 0.0;

        for pattern in &self.patterns {
            let old_matches = pattern.regex.find_iter(original_code).count();
            let new_matches = pattern.regex.find_iter(fixed_code).count();

            if new_matches > old_matches {
                let added = new_matches - old_matches;
                warnings.push(format!("{}: +{} occurrences", pattern.name, added));
                penalty += pattern.penalty * added as f64;
            }
        }

        let old_lines = original_code.trim().lines().count();
        let new_lines = fixed_code.trim().lines().count();
        if new_lines * 2 < old_lines {
            warnings.push(format!("code_reduction: {} -> {} lines", old_lines, new_lines));
            penalty += CODE_REDUCTION_PENALTY;
        }

        let old_try = self.try_re.find_iter(original_code).count();
        let new_try = self.try_re.find_iter(fixed_code).count();
        if new_try > old_try + TRY_EXPLOSION_LIMIT {
            warnings.push(format!("try_explosion: {} -> {}", old_try, new_try));
            penalty += TRY_EXPLOSION_PENALTY;
        }

        QualityReport {
            penalty: penalty.min(1.0),
            warnings,
        }
    }
}

impl Default for DefenseQualityChecker {
    fn default() -> Self {
        Self::new()
    }
}
