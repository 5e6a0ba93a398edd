//! Checkpoint and results persistence.
//!
//! A checkpoint carries everything needed to resume a run: the current
//! target, both archives in full, and the metrics so far. Results are the
//! final human- and machine-readable record written at the end of a run.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::archive::{ArchiveSnapshot, ArchiveStats, DefenseArchiveStats, DefenseSnapshot};
use crate::errors::Result;
use crate::metrics::RunMetrics;
use crate::HardeningConfig;

/// Resumable mid-run snapshot, written every `checkpoint_every` rounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub round: u32,
    pub run_id: Uuid,
    pub original_code: String,
    pub current_code: String,
    pub attack_stats: ArchiveStats,
    pub defense_stats: DefenseArchiveStats,
    pub metrics: RunMetrics,
    pub attack_archive: ArchiveSnapshot,
    pub defense_archive: DefenseSnapshot,
}

impl Checkpoint {
    pub fn save(&self, output_dir: &Path) -> Result<std::path::PathBuf> {
        let path = output_dir.join(format!("checkpoint_round_{}.json", self.round));
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

/// Final results record written as `results.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsRecord {
    pub timestamp: String,
    pub run_id: Uuid,
    pub config: HardeningConfig,
    pub metrics: RunMetrics,
    pub attack_archive_stats: ArchiveStats,
    pub defense_archive_stats: DefenseArchiveStats,
}

impl ResultsRecord {
    pub fn new(
        run_id: Uuid,
        config: HardeningConfig,
        metrics: RunMetrics,
        attack_archive_stats: ArchiveStats,
        defense_archive_stats: DefenseArchiveStats,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            run_id,
            config,
            metrics,
            attack_archive_stats,
            defense_archive_stats,
        }
    }

    pub fn save(&self, output_dir: &Path) -> Result<std::path::PathBuf> {
        let path = output_dir.join("results.json");
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
