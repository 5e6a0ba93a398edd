//! Defensive-exception recognition.
//!
//! A patched target that raises `ValueError("Input cannot be empty")` has
//! blocked an attack; one that dies with `KeyError` has not. This module is
//! the single decision site for that distinction. Round-level defense
//! scoring, Red-Queen generality pre-scoring, and final robustness all call
//! [`classify_block`] so the three places can never drift apart.

use serde::{Deserialize, Serialize};

use crate::fitness::{FitnessReport, ATTACK_SUCCESS_THRESHOLD};

/// Error fragments that mark a raised exception as deliberate input
/// validation rather than an unintended crash: the validation exception
/// families plus the message vocabulary defenders are expected to use.
pub const DEFENSIVE_PATTERNS: [&str; 10] = [
    "ValueError",
    "TypeError",
    "Input must be",
    "Input cannot be",
    "Input string cannot",
    "must be a string",
    "must be a dict",
    "cannot be empty",
    "cannot be None",
    "Invalid input",
];

/// How a defense fared against one attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockOutcome {
    /// The attack test passed: no crash, assertions hold.
    Passed,
    /// The attack test failed, but with a recognized validation exception.
    Defensive,
    /// The target crashed for real.
    Crashed,
}

/// True when the first captured error line matches the validation vocabulary.
pub fn is_defensive_error(first_error_line: &str) -> bool {
    DEFENSIVE_PATTERNS
        .iter()
        .any(|pattern| first_error_line.contains(pattern))
}

/// Classifies an attack evaluation from the defender's point of view.
pub fn classify_block(report: &FitnessReport) -> BlockOutcome {
    if report.score < ATTACK_SUCCESS_THRESHOLD {
        return BlockOutcome::Passed;
    }
    match report.first_error() {
        Some(line) if is_defensive_error(line) => BlockOutcome::Defensive,
        _ => BlockOutcome::Crashed,
    }
}

/// A defense is credited for an attack unless the target crashed for real.
pub fn is_blocked(report: &FitnessReport) -> bool {
    classify_block(report) != BlockOutcome::Crashed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(score: f64, errors: Vec<&str>) -> FitnessReport {
        FitnessReport {
            score,
            passed: 0,
            failed: if score >= ATTACK_SUCCESS_THRESHOLD { 1 } else { 0 },
            errors: errors.into_iter().map(String::from).collect(),
            output: String::new(),
            timed_out: false,
        }
    }

    #[test]
    fn passing_test_counts_as_blocked() {
        let r = report(0.0, vec![]);
        assert_eq!(classify_block(&r), BlockOutcome::Passed);
        assert!(is_blocked(&r));
    }

    #[test]
    fn validation_exception_counts_as_blocked() {
        let r = report(1.0, vec!["ValueError: Input cannot be empty"]);
        assert_eq!(classify_block(&r), BlockOutcome::Defensive);
        assert!(is_blocked(&r));
    }

    #[test]
    fn raw_crash_is_not_blocked() {
        let r = report(1.0, vec!["KeyError: 'missing'"]);
        assert_eq!(classify_block(&r), BlockOutcome::Crashed);
        assert!(!is_blocked(&r));
    }

    #[test]
    fn only_the_first_error_line_is_consulted() {
        let r = report(1.0, vec!["RecursionError: maximum depth", "ValueError: later"]);
        assert_eq!(classify_block(&r), BlockOutcome::Crashed);
    }

    #[test]
    fn crash_with_no_error_lines_is_not_blocked() {
        let r = report(1.0, vec![]);
        assert_eq!(classify_block(&r), BlockOutcome::Crashed);
    }

    #[test]
    fn message_phrases_alone_are_recognized() {
        let r = report(1.0, vec!["CustomGuardError: value must be a string"]);
        assert_eq!(classify_block(&r), BlockOutcome::Defensive);
    }
}
