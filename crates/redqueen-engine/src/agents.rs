//! Agent interface: the boundary between the controller and whatever
//! generates attacks and patches.
//!
//! Implementations are opaque to the engine. A `None` return means the agent
//! produced nothing usable this time (unparseable response, refusal); the
//! controller treats that, and any `Err`, as a recoverable skip. Transient
//! retry policy lives behind this boundary, never in the controller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::genome::{AttackGenome, AttackType};

/// A proposed attack: a test body plus whatever the generator said about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackCandidate {
    /// Test body calling into the target.
    pub test_code: String,
    pub description: String,
    /// Explicit category tag, when the generator supplied one.
    pub type_hint: Option<AttackType>,
}

impl AttackCandidate {
    pub fn from_genome(genome: &AttackGenome) -> Self {
        Self {
            test_code: genome.code.clone(),
            description: genome.description.clone(),
            type_hint: Some(genome.attack_type),
        }
    }
}

/// A proposed patch: a full replacement target source plus an explanation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchCandidate {
    pub fixed_code: String,
    pub explanation: String,
}

/// Generates attacks against a target, plus evolutionary variations of
/// attacks already in the archive.
#[async_trait]
pub trait AttackAgent: Send + Sync {
    /// Proposes a new attack. `previous_attacks` is a diverse sample from
    /// the archive for context; `failed_attacks` are recent duds to steer
    /// away from.
    async fn generate_attack(
        &self,
        target_source: &str,
        previous_attacks: &[AttackCandidate],
        failed_attacks: &[AttackCandidate],
    ) -> Result<Option<AttackCandidate>>;

    /// Produces a variant of one successful attack.
    async fn mutate_attack(&self, parent: &AttackCandidate) -> Result<Option<AttackCandidate>>;

    /// Combines two successful attacks into one.
    async fn crossover_attacks(
        &self,
        first: &AttackCandidate,
        second: &AttackCandidate,
    ) -> Result<Option<AttackCandidate>>;
}

/// Generates patches that should block the presented attacks while keeping
/// the target's legitimate behavior intact.
#[async_trait]
pub trait DefenseAgent: Send + Sync {
    async fn generate_defense(
        &self,
        target_source: &str,
        failing_attacks: &[AttackCandidate],
        previous_fixes: &[String],
    ) -> Result<Option<PatchCandidate>>;
}
