// RedQueen attack classification
// Derives (attack_type, error_type) behavior descriptors for new attacks

use regex::Regex;

use crate::genome::{AttackType, ErrorType};

/// Tags fresh attacks before archive insertion.
///
/// Precedence for `attack_type`: the agent's explicit tag, then keywords in
/// the test-function name, then heuristics over the test body, then
/// `unknown`. `error_type` is scanned out of the first observed error
/// message.
pub struct AttackClassifier {
    name_re: Regex,
}

impl AttackClassifier {
    pub fn new() -> Self {
        Self {
            name_re: Regex::new(
                r"(?i)def test_\w*?(edge|invalid|overflow|injection|boundary|empty|none|null)",
            )
            .unwrap(),
        }
    }

    pub fn classify_attack(&self, hint: Option<AttackType>, test_code: &str) -> AttackType {
        if let Some(tag) = hint {
            if tag != AttackType::Unknown {
                return tag;
            }
        }

        if let Some(caps) = self.name_re.captures(test_code) {
            let keyword = caps[1].to_lowercase();
            let tag = match keyword.as_str() {
                "edge" | "empty" | "none" | "null" => AttackType::EdgeCase,
                "invalid" => AttackType::InvalidInput,
                "overflow" => AttackType::Overflow,
                "injection" => AttackType::Injection,
                "boundary" => AttackType::Boundary,
                _ => AttackType::Unknown,
            };
            if tag != AttackType::Unknown {
                return tag;
            }
        }

        Self::classify_body(test_code)
    }

    /// Body heuristics, tried in a fixed order so a test exercising several
    /// vectors gets a deterministic tag.
    fn classify_body(test_code: &str) -> AttackType {
        let lower = test_code.to_lowercase();

        if lower.contains("none")
            || lower.contains("empty")
            || test_code.contains("\"\"")
            || test_code.contains("''")
            || test_code.contains("{}")
        {
            AttackType::EdgeCase
        } else if lower.contains("recursion")
            || lower.contains("depth")
            || test_code.contains("10**")
            || test_code.contains("1000000")
        {
            AttackType::Overflow
        } else if test_code.contains("\\x")
            || test_code.contains("\\n")
            || test_code.contains("\\0")
            || lower.contains("unicode")
        {
            AttackType::Injection
        } else if lower.contains("inf") || lower.contains("nan") || lower.contains("max_int") {
            AttackType::Boundary
        } else if test_code.contains("str(")
            || test_code.contains("int(")
            || lower.contains("isinstance")
        {
            AttackType::InvalidInput
        } else {
            AttackType::Unknown
        }
    }

    /// Scans the first error message for a known exception class.
    pub fn classify_error(&self, errors: &[String]) -> ErrorType {
        let Some(first) = errors.first() else {
            return ErrorType::Unknown;
        };

        for error_type in ErrorType::OBSERVABLE {
            if first.contains(error_type.as_str()) {
                return error_type;
            }
        }
        ErrorType::Unknown
    }
}

impl Default for AttackClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_hint_wins() {
        let classifier = AttackClassifier::new();
        let tag = classifier.classify_attack(
            Some(AttackType::Injection),
            "def test_empty(): parse('')",
        );
        assert_eq!(tag, AttackType::Injection);
    }

    #[test]
    fn unknown_hint_falls_through_to_name() {
        let classifier = AttackClassifier::new();
        let tag = classifier.classify_attack(
            Some(AttackType::Unknown),
            "def test_parse_overflow():\n    parse('9' * 100000)",
        );
        assert_eq!(tag, AttackType::Overflow);
    }

    #[test]
    fn function_name_keywords_are_recognized() {
        let classifier = AttackClassifier::new();
        assert_eq!(
            classifier.classify_attack(None, "def test_merge_with_none_value(): merge(None, {})"),
            AttackType::EdgeCase
        );
        assert_eq!(
            classifier.classify_attack(None, "def test_invalid_schema(): validate(1, 2)"),
            AttackType::InvalidInput
        );
    }

    #[test]
    fn body_heuristics_cover_the_common_vectors() {
        let classifier = AttackClassifier::new();
        assert_eq!(
            classifier.classify_attack(None, "def test_a():\n    parse(10**1000)"),
            AttackType::Overflow
        );
        assert_eq!(
            classifier.classify_attack(None, "def test_b():\n    parse('\\x00abc')"),
            AttackType::Injection
        );
        assert_eq!(
            classifier.classify_attack(None, "def test_c():\n    compare(float('inf'), 1)"),
            AttackType::Boundary
        );
        assert_eq!(
            classifier.classify_attack(None, "def test_d():\n    handle(int('x'))"),
            AttackType::InvalidInput
        );
    }

    #[test]
    fn unclassifiable_body_is_unknown() {
        let classifier = AttackClassifier::new();
        assert_eq!(
            classifier.classify_attack(None, "def test_misc():\n    run_pipeline(42)"),
            AttackType::Unknown
        );
    }

    #[test]
    fn error_type_scans_first_message_only() {
        let classifier = AttackClassifier::new();
        let errors = vec![
            "ZeroDivisionError: division by zero".to_string(),
            "TypeError: later".to_string(),
        ];
        assert_eq!(classifier.classify_error(&errors), ErrorType::ZeroDivisionError);
        assert_eq!(classifier.classify_error(&[]), ErrorType::Unknown);
        assert_eq!(
            classifier.classify_error(&["something exotic".to_string()]),
            ErrorType::Unknown
        );
    }
}
