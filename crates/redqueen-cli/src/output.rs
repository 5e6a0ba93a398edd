//! Console output: banner, run plan, final summary.

use std::path::Path;

use colored::Colorize;

use redqueen_engine::HardeningOutcome;

use crate::presets::Preset;

const RULE_WIDTH: usize = 70;

pub fn banner() {
    println!("{}", "=".repeat(RULE_WIDTH));
    println!("{}", "🔴🟢 redqueen — adversarial code hardening".bold());
    println!("{}", "=".repeat(RULE_WIDTH));
}

pub fn print_plan(preset: &Preset, rounds: u32, attacks: u32, target: &Path) {
    println!("Mode:      {}", preset.label.cyan());
    println!("Attacker:  {}", preset.attacker_model);
    println!("Defender:  {}", preset.defender_model);
    println!("Rounds:    {} × {} attacks", rounds, attacks);
    println!("Target:    {}", target.display());
    println!("Est. cost: {}", preset.cost_hint.yellow());
    println!("{}", "=".repeat(RULE_WIDTH));
}

pub fn print_summary(outcome: &HardeningOutcome, cost_per_call: f64) {
    let metrics = &outcome.metrics;
    let estimated_cost = metrics.api_calls as f64 * cost_per_call;

    println!();
    println!("{}", "=".repeat(RULE_WIDTH));
    println!("{}", "📊 RESULTS SUMMARY".bold());
    println!("{}", "=".repeat(RULE_WIDTH));

    println!(
        "Final robustness:   {}",
        format!("{:.1}%", metrics.final_robustness * 100.0).green().bold()
    );
    if let (Some(first), Some(last)) = (
        metrics.robustness_over_time.first(),
        metrics.robustness_over_time.last(),
    ) {
        println!(
            "Improvement:        {:.1}% → {:.1}%",
            first * 100.0,
            last * 100.0
        );
    }
    println!("Attack generality:  {:.1}%", metrics.final_generality * 100.0);
    println!(
        "Attacks discovered: {} across {} niches",
        outcome.attack_stats.total_genomes, outcome.attack_stats.total_niches
    );
    println!("Defenses archived:  {}", outcome.defense_stats.total);
    println!("Rounds completed:   {}", metrics.rounds.len());
    println!("API calls:          {}", metrics.api_calls);
    println!("Estimated cost:     ${:.2}", estimated_cost);
    println!("Total time:         {:.0}s", metrics.total_time_sec);

    if let Some(path) = &outcome.hardened_path {
        println!();
        println!("💾 Hardened code: {}", path.display().to_string().green());
    }
}
