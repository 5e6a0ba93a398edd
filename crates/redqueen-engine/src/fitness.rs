// RedQueen fitness evaluation
// Scores attacks and defenses by actually executing them in the sandbox

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::genome::AttackGenome;
use crate::sandbox::{RunReport, SandboxRunner};

/// An attack counts as successful at or above this score.
pub const ATTACK_SUCCESS_THRESHOLD: f64 = 0.5;

/// Scored evaluation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitnessReport {
    pub score: f64,
    pub passed: u32,
    pub failed: u32,
    pub errors: Vec<String>,
    pub output: String,
    pub timed_out: bool,
}

impl FitnessReport {
    fn from_run(score: f64, run: RunReport) -> Self {
        Self {
            score,
            passed: run.passed,
            failed: run.failed,
            errors: run.errors,
            output: run.raw_output,
            timed_out: run.timed_out,
        }
    }

    fn clean(score: f64) -> Self {
        Self {
            score,
            passed: 0,
            failed: 0,
            errors: Vec::new(),
            output: String::new(),
            timed_out: false,
        }
    }

    /// First captured error line, the input to the defensive-exception check.
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }
}

/// Evaluates attacks and defenses through the sandbox.
///
/// Attack scoring: 1.0 when a test fails (the target crashed), 0.8 when only
/// collection/import errors were produced (the target still choked), 0.5 on
/// timeout, 0.0 when everything passed. Defense scoring: fraction of attack
/// tests that pass in one aggregate run, overridden to 0.0 whenever sanity
/// tests break under the patch.
pub struct FitnessEvaluator {
    runner: SandboxRunner,
}

impl FitnessEvaluator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            runner: SandboxRunner::new(timeout),
        }
    }

    pub async fn evaluate_attack(&self, target_source: &str, test_code: &str) -> FitnessReport {
        let run = self.runner.run_test(target_source, test_code).await;

        let score = if run.failed > 0 {
            1.0
        } else if run.timed_out {
            0.5
        } else if !run.errors.is_empty() {
            0.8
        } else {
            0.0
        };

        FitnessReport::from_run(score, run)
    }

    /// One aggregate run over every attack, with per-attack function prefixes
    /// so test names cannot collide. A single subprocess amortizes runner
    /// start-up across the whole archive.
    pub async fn evaluate_defense(
        &self,
        patched_source: &str,
        attacks: &[AttackGenome],
        sanity_tests: Option<&str>,
    ) -> FitnessReport {
        if attacks.is_empty() {
            return FitnessReport::clean(1.0);
        }

        let mut combined = String::new();
        for (i, attack) in attacks.iter().enumerate() {
            let renamed = attack.code.replace("def test_", &format!("def test_{}_", i));
            combined.push_str(&format!(
                "\n# Attack {}: {}\n{}\n",
                i, attack.description, renamed
            ));
        }

        let run = self.runner.run_test(patched_source, &combined).await;

        let total = run.passed + run.failed;
        let score = if total > 0 {
            f64::from(run.passed) / f64::from(total)
        } else {
            0.0
        };

        let mut report = FitnessReport::from_run(score, run);

        if let Some(sanity) = sanity_tests.filter(|s| !s.trim().is_empty()) {
            if report.score > 0.0 && !self.sanity_passes(patched_source, sanity).await {
                warn!("🚫 Sanity tests failed - patch breaks original functionality");
                report.score = 0.0;
                report
                    .errors
                    .push("SANITY_FAILED: Original functionality broken".to_string());
            }
        }

        report
    }

    /// True when the caller-provided sanity suite holds under `source`.
    pub async fn sanity_passes(&self, source: &str, sanity_tests: &str) -> bool {
        let run = self.runner.run_test(source, sanity_tests).await;
        run.failed == 0
    }
}
