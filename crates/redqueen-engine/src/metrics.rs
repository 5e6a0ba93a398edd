//! Run metrics: robustness growth and attack diversity over time.

use serde::{Deserialize, Serialize};

/// Per-round statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundStats {
    pub round: u32,
    pub attacks_generated: u32,
    pub attacks_successful: u32,
    pub defense_improved: bool,
    pub new_robustness: f64,
    /// Advisory warnings from the defense quality check, if any.
    pub quality_warnings: Vec<String>,
}

impl RoundStats {
    pub fn new(round: u32) -> Self {
        Self {
            round,
            attacks_generated: 0,
            attacks_successful: 0,
            defense_improved: false,
            new_robustness: 0.0,
            quality_warnings: Vec::new(),
        }
    }
}

/// Whole-run metrics record, serialized into checkpoints and results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    pub rounds: Vec<RoundStats>,
    pub robustness_over_time: Vec<f64>,
    pub generality_over_time: Vec<f64>,
    pub api_calls: u64,
    pub total_time_sec: f64,
    pub final_robustness: f64,
    pub final_generality: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_serialize_with_stable_field_names() {
        let mut metrics = RunMetrics::default();
        metrics.robustness_over_time.push(0.5);
        metrics.api_calls = 7;

        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["robustness_over_time"][0], 0.5);
        assert_eq!(json["api_calls"], 7);
        assert!(json.get("generality_over_time").is_some());
    }
}
