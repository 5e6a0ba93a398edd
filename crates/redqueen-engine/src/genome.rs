//! Attack and defense genomes plus the behavior-descriptor tags they are
//! archived under.
//!
//! Tags are closed sum types internally; the serialized form keeps the wire
//! strings (`edge_case`, `TypeError`, ...) that appear in archive JSON and in
//! raw test-runner output.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Behavioral category of an attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackType {
    EdgeCase,
    InvalidInput,
    Overflow,
    Injection,
    Boundary,
    Resource,
    Concurrency,
    Unicode,
    Unknown,
}

impl AttackType {
    pub const ALL: [AttackType; 9] = [
        AttackType::EdgeCase,
        AttackType::InvalidInput,
        AttackType::Overflow,
        AttackType::Injection,
        AttackType::Boundary,
        AttackType::Resource,
        AttackType::Concurrency,
        AttackType::Unicode,
        AttackType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttackType::EdgeCase => "edge_case",
            AttackType::InvalidInput => "invalid_input",
            AttackType::Overflow => "overflow",
            AttackType::Injection => "injection",
            AttackType::Boundary => "boundary",
            AttackType::Resource => "resource",
            AttackType::Concurrency => "concurrency",
            AttackType::Unicode => "unicode",
            AttackType::Unknown => "unknown",
        }
    }

    /// Parses an agent-supplied tag. Tolerates the spellings different models
    /// produce (`edge case`, `edge-case`, bare `edge`).
    pub fn from_tag(tag: &str) -> Option<AttackType> {
        let normalized = tag.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "edge_case" | "edge" | "edgecase" => Some(AttackType::EdgeCase),
            "invalid_input" | "invalid" | "invalid_type" => Some(AttackType::InvalidInput),
            "overflow" => Some(AttackType::Overflow),
            "injection" => Some(AttackType::Injection),
            "boundary" => Some(AttackType::Boundary),
            "resource" => Some(AttackType::Resource),
            "concurrency" => Some(AttackType::Concurrency),
            "unicode" => Some(AttackType::Unicode),
            "unknown" => Some(AttackType::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exception class observed when an attack crashed the target, or a lineage
/// sentinel for genomes produced by mutation/crossover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorType {
    TypeError,
    ValueError,
    KeyError,
    IndexError,
    RecursionError,
    MemoryError,
    #[serde(rename = "JSONDecodeError")]
    JsonDecodeError,
    AttributeError,
    ZeroDivisionError,
    RuntimeError,
    #[serde(rename = "mutated")]
    Mutated,
    #[serde(rename = "crossover")]
    Crossover,
    #[serde(rename = "unknown")]
    Unknown,
}

impl ErrorType {
    /// Exception classes that can actually be observed in runner output.
    /// The lineage sentinels and `Unknown` are excluded.
    pub const OBSERVABLE: [ErrorType; 10] = [
        ErrorType::TypeError,
        ErrorType::ValueError,
        ErrorType::KeyError,
        ErrorType::IndexError,
        ErrorType::RecursionError,
        ErrorType::MemoryError,
        ErrorType::JsonDecodeError,
        ErrorType::AttributeError,
        ErrorType::ZeroDivisionError,
        ErrorType::RuntimeError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::TypeError => "TypeError",
            ErrorType::ValueError => "ValueError",
            ErrorType::KeyError => "KeyError",
            ErrorType::IndexError => "IndexError",
            ErrorType::RecursionError => "RecursionError",
            ErrorType::MemoryError => "MemoryError",
            ErrorType::JsonDecodeError => "JSONDecodeError",
            ErrorType::AttributeError => "AttributeError",
            ErrorType::ZeroDivisionError => "ZeroDivisionError",
            ErrorType::RuntimeError => "RuntimeError",
            ErrorType::Mutated => "mutated",
            ErrorType::Crossover => "crossover",
            ErrorType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// MAP-Elites behavior descriptor.
pub type Niche = (AttackType, ErrorType);

/// Content-addressed genome identity: SHA-256 of the code, truncated to 12
/// hex characters.
pub fn content_hash(code: &str) -> String {
    let digest = Sha256::digest(code.as_bytes());
    hex::encode(digest)[..12].to_string()
}

/// An archived attack: a test body plus the metadata MAP-Elites and the Red
/// Queen cross-tester need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackGenome {
    /// Test body calling into the target.
    pub code: String,
    pub attack_type: AttackType,
    pub error_type: ErrorType,
    pub description: String,

    /// 1.0 = crashed the target outright, 0.0 = the target survived.
    pub fitness: f64,

    /// How many archived defenders this attack still breaks.
    pub defeats_count: u32,
    /// How many defenders it has been re-tested against.
    pub tested_against: u32,

    /// Round the genome originated in.
    pub generation: u32,
    /// Lineage pointer for mutation/crossover children.
    pub parent_hash: Option<String>,
}

impl AttackGenome {
    pub fn niche(&self) -> Niche {
        (self.attack_type, self.error_type)
    }

    /// Fraction of tested defenders this attack defeats.
    pub fn generality(&self) -> f64 {
        if self.tested_against == 0 {
            0.0
        } else {
            f64::from(self.defeats_count) / f64::from(self.tested_against)
        }
    }

    pub fn content_hash(&self) -> String {
        content_hash(&self.code)
    }
}

/// An archived defense: a full replacement target source plus robustness
/// bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefenseGenome {
    /// Replacement target source.
    pub code: String,
    pub description: String,

    /// Robustness at the time of evaluation; forced to 0.0 on sanity failure.
    pub fitness: f64,

    pub blocks_count: u32,
    pub tested_against: u32,

    pub generation: u32,
    pub parent_hash: Option<String>,
}

impl DefenseGenome {
    /// Fraction of archived attacks this defense blocks.
    pub fn robustness(&self) -> f64 {
        if self.tested_against == 0 {
            0.0
        } else {
            f64::from(self.blocks_count) / f64::from(self.tested_against)
        }
    }

    pub fn content_hash(&self) -> String {
        content_hash(&self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attack_type_round_trips_through_serde() {
        let json = serde_json::to_string(&AttackType::EdgeCase).unwrap();
        assert_eq!(json, "\"edge_case\"");
        let back: AttackType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AttackType::EdgeCase);
    }

    #[test]
    fn error_type_keeps_exception_class_names() {
        assert_eq!(
            serde_json::to_string(&ErrorType::JsonDecodeError).unwrap(),
            "\"JSONDecodeError\""
        );
        assert_eq!(serde_json::to_string(&ErrorType::Crossover).unwrap(), "\"crossover\"");
    }

    #[test]
    fn from_tag_tolerates_model_spellings() {
        assert_eq!(AttackType::from_tag("edge case"), Some(AttackType::EdgeCase));
        assert_eq!(AttackType::from_tag("Edge-Case"), Some(AttackType::EdgeCase));
        assert_eq!(AttackType::from_tag("invalid_input"), Some(AttackType::InvalidInput));
        assert_eq!(AttackType::from_tag("sql smuggling"), None);
    }

    #[test]
    fn generality_handles_untested_genomes() {
        let genome = AttackGenome {
            code: "def test_x(): pass".to_string(),
            attack_type: AttackType::EdgeCase,
            error_type: ErrorType::Unknown,
            description: "untested".to_string(),
            fitness: 1.0,
            defeats_count: 0,
            tested_against: 0,
            generation: 1,
            parent_hash: None,
        };
        assert_eq!(genome.generality(), 0.0);
    }

    #[test]
    fn content_hash_is_stable_and_short() {
        let a = content_hash("def test(): pass");
        let b = content_hash("def test(): pass");
        let c = content_hash("def test(): crash()");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 12);
    }
}
