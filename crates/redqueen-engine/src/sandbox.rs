// RedQueen sandboxed test runner
// Executes a generated test body against a target snapshot in a subprocess

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use uuid::Uuid;

use crate::errors::{HardenError, Result};

const MAX_ERROR_LINES: usize = 5;

/// Structured outcome of one sandboxed evaluation.
///
/// The runner is the trust boundary: every failure mode (timeout, launch
/// failure, garbage output) becomes one of these, never an error surfaced to
/// the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub passed: u32,
    pub failed: u32,
    pub errors: Vec<String>,
    pub raw_output: String,
    pub timed_out: bool,
}

impl RunReport {
    fn timeout() -> Self {
        Self {
            passed: 0,
            failed: 0,
            errors: vec!["Timeout".to_string()],
            raw_output: "Test execution timed out".to_string(),
            timed_out: true,
        }
    }

    fn launch_failure(message: String) -> Self {
        Self {
            passed: 0,
            failed: 0,
            errors: vec![message.clone()],
            raw_output: message,
            timed_out: false,
        }
    }
}

/// Runs pytest bodies against Python target snapshots.
///
/// Each evaluation gets a private scratch directory under the OS temp dir:
/// created, populated with `target.py` and the test file, used once, removed.
/// Bytecode caching is suppressed so consecutive evaluations of different
/// targets never pick up stale artifacts.
pub struct SandboxRunner {
    python_bin: String,
    timeout: Duration,
    passed_re: Regex,
    failed_re: Regex,
    error_re: Regex,
    error_line_re: Regex,
}

impl SandboxRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            python_bin: "python3".to_string(),
            timeout,
            passed_re: Regex::new(r"(\d+) passed").unwrap(),
            failed_re: Regex::new(r"(\d+) failed").unwrap(),
            error_re: Regex::new(r"(\d+) error").unwrap(),
            error_line_re: Regex::new(r"(?m)^E\s+(.+)").unwrap(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Executes `test_source` against `target_source` and reports the
    /// parsed pass/fail counts. Infallible by contract.
    pub async fn run_test(&self, target_source: &str, test_source: &str) -> RunReport {
        let scratch = std::env::temp_dir().join(format!("redqueen_eval_{}", Uuid::new_v4()));

        if let Err(e) = tokio::fs::create_dir_all(&scratch).await {
            return RunReport::launch_failure(format!("failed to create scratch dir: {}", e));
        }

        let report = match self.run_in(&scratch, target_source, test_source).await {
            Ok(report) => report,
            Err(e) => RunReport::launch_failure(e.to_string()),
        };

        tokio::fs::remove_dir_all(&scratch).await.ok();

        report
    }

    async fn run_in(
        &self,
        scratch: &Path,
        target_source: &str,
        test_source: &str,
    ) -> Result<RunReport> {
        tokio::fs::write(scratch.join("target.py"), target_source).await?;
        tokio::fs::write(
            scratch.join("test_attack.py"),
            compose_test_file(scratch, test_source),
        )
        .await?;

        let mut cmd = Command::new(&self.python_bin);
        cmd.arg("-m")
            .arg("pytest")
            .arg(scratch)
            .arg("-v")
            .arg("--tb=short")
            .current_dir(scratch)
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| HardenError::SandboxFailure {
            reason: format!("failed to launch test runner: {}", e),
        })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let combined = format!(
                    "{}{}",
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                );
                let (passed, failed, errors) = self.parse_output(&combined);
                Ok(RunReport {
                    passed,
                    failed,
                    errors,
                    raw_output: combined,
                    timed_out: false,
                })
            }
            Ok(Err(e)) => Err(HardenError::SandboxFailure {
                reason: format!("test runner did not complete: {}", e),
            }),
            // kill_on_drop reaps the subprocess when the wait future drops.
            Err(_) => Ok(RunReport::timeout()),
        }
    }

    /// Parses a pytest summary with three independent count patterns plus the
    /// first few assertion lines.
    fn parse_output(&self, output: &str) -> (u32, u32, Vec<String>) {
        let passed = self
            .passed_re
            .captures(output)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(0);
        let failed = self
            .failed_re
            .captures(output)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(0);

        let mut errors = Vec::new();
        if let Some(caps) = self.error_re.captures(output) {
            errors.push(format!("{} errors", &caps[1]));
        }
        errors.extend(
            self.error_line_re
                .captures_iter(output)
                .take(MAX_ERROR_LINES)
                .map(|c| c[1].trim().to_string()),
        );

        (passed, failed, errors)
    }
}

fn compose_test_file(scratch: &Path, test_source: &str) -> String {
    format!(
        "import sys\nimport pytest\nsys.path.insert(0, '{}')\nfrom target import *\n\n{}\n",
        scratch.display(),
        test_source
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> SandboxRunner {
        SandboxRunner::new(Duration::from_secs(30))
    }

    #[test]
    fn parses_pytest_summary_counts() {
        let output = "test_attack.py::test_a PASSED\n\
                      test_attack.py::test_b FAILED\n\
                      E   ZeroDivisionError: division by zero\n\
                      ===== 1 failed, 1 passed in 0.02s =====\n";
        let (passed, failed, errors) = runner().parse_output(output);
        assert_eq!(passed, 1);
        assert_eq!(failed, 1);
        assert_eq!(errors, vec!["ZeroDivisionError: division by zero"]);
    }

    #[test]
    fn parses_collection_errors() {
        let output = "E   ModuleNotFoundError: No module named 'missing'\n\
                      ===== 1 error in 0.01s =====\n";
        let (passed, failed, errors) = runner().parse_output(output);
        assert_eq!(passed, 0);
        assert_eq!(failed, 0);
        assert_eq!(errors[0], "1 errors");
        assert!(errors[1].contains("ModuleNotFoundError"));
    }

    #[test]
    fn caps_captured_error_lines() {
        let mut output = String::new();
        for i in 0..10 {
            output.push_str(&format!("E   AssertionError: case {}\n", i));
        }
        output.push_str("===== 10 failed in 0.1s =====\n");
        let (_, failed, errors) = runner().parse_output(&output);
        assert_eq!(failed, 10);
        assert_eq!(errors.len(), MAX_ERROR_LINES);
    }

    #[test]
    fn test_file_imports_target_before_the_body() {
        let composed = compose_test_file(Path::new("/tmp/scratch"), "def test_x(): pass");
        assert!(composed.starts_with("import sys"));
        assert!(composed.contains("from target import *"));
        assert!(composed.ends_with("def test_x(): pass\n"));
    }

    #[tokio::test]
    async fn launch_failure_is_a_structured_report() {
        let mut runner = runner();
        runner.python_bin = "redqueen-no-such-interpreter".to_string();
        let report = runner.run_test("def f(): pass", "def test_f(): f()").await;
        assert_eq!(report.passed, 0);
        assert_eq!(report.failed, 0);
        assert!(!report.errors.is_empty());
        assert!(!report.timed_out);
    }
}
