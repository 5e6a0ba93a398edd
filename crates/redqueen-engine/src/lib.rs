//! # RedQueen Engine
//!
//! Co-evolutionary adversarial hardening: an attacker agent proposes failing
//! tests, a defender agent proposes patches, and a Red Queen round controller
//! forces each generation to beat the last. A MAP-Elites archive preserves
//! behaviorally distinct attacks so defenders face diversity, not one
//! champion attack replayed forever.
//!
//! ## Components
//! - Sandboxed subprocess test runner with wall-clock timeouts
//! - Fitness evaluation for attacks and defenses, with sanity-test guard
//! - Defensive-exception recognition (validation errors count as blocks)
//! - MAP-Elites attack archive and bounded defense archive
//! - Attack classification over behavior descriptors
//! - Novelty gating and defense quality inspection
//! - Round controller with checkpointing and resumable state

pub mod agents;
pub mod archive;
pub mod checkpoint;
pub mod classify;
pub mod controller;
pub mod defensive;
pub mod errors;
pub mod fitness;
pub mod genome;
pub mod metrics;
pub mod novelty;
pub mod quality;
pub mod sandbox;
pub mod target;

pub use agents::*;
pub use archive::*;
pub use checkpoint::*;
pub use classify::*;
pub use controller::*;
pub use defensive::*;
pub use errors::*;
pub use fitness::*;
pub use genome::*;
pub use metrics::*;
pub use novelty::*;
pub use quality::*;
pub use sandbox::*;
pub use target::*;

use serde::{Deserialize, Serialize};

/// Hardening run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardeningConfig {
    /// Number of Red Queen rounds
    pub n_rounds: u32,
    /// Attack generation attempts per round
    pub attacks_per_round: u32,
    /// MAP-Elites niche capacity
    pub max_attacks_per_niche: usize,
    /// Defense archive bound
    pub max_defenders: usize,
    /// How many recent defenders new attacks are cross-tested against
    pub test_against_previous: usize,
    /// Directory for checkpoints, archives and results
    pub output_dir: std::path::PathBuf,
    /// Wall-clock timeout for one sandboxed evaluation
    pub evaluation_timeout_seconds: u64,
    /// Checkpoint cadence in rounds
    pub checkpoint_every: u32,
    /// Whether the novelty tracker gates archive insertion
    pub use_novelty: bool,
}

impl Default for HardeningConfig {
    fn default() -> Self {
        Self {
            n_rounds: 10,
            attacks_per_round: 5,
            max_attacks_per_niche: 3,
            max_defenders: 50,
            test_against_previous: 10,
            output_dir: std::path::PathBuf::from("results/drq"),
            evaluation_timeout_seconds: 30,
            checkpoint_every: 2,
            use_novelty: true,
        }
    }
}

impl HardeningConfig {
    /// Rejects configurations the controller cannot run with.
    pub fn validate(&self) -> errors::Result<()> {
        if self.n_rounds == 0 {
            return Err(errors::HardenError::ConfigurationError {
                field: "n_rounds".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.attacks_per_round == 0 {
            return Err(errors::HardenError::ConfigurationError {
                field: "attacks_per_round".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_attacks_per_niche == 0 {
            return Err(errors::HardenError::ConfigurationError {
                field: "max_attacks_per_niche".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.evaluation_timeout_seconds == 0 {
            return Err(errors::HardenError::ConfigurationError {
                field: "evaluation_timeout_seconds".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.checkpoint_every == 0 {
            return Err(errors::HardenError::ConfigurationError {
                field: "checkpoint_every".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
