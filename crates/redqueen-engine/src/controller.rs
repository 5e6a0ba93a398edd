// RedQueen round controller
// Drives the co-evolutionary loop: attack phase, cross-testing, defense
// phase, strict-improvement promotion of the current target

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agents::{AttackAgent, AttackCandidate, DefenseAgent};
use crate::archive::{ArchiveStats, DefenseArchive, DefenseArchiveStats, MapElitesArchive};
use crate::checkpoint::{Checkpoint, ResultsRecord};
use crate::classify::AttackClassifier;
use crate::defensive::{classify_block, BlockOutcome};
use crate::errors::Result;
use crate::fitness::{FitnessEvaluator, ATTACK_SUCCESS_THRESHOLD};
use crate::genome::{AttackGenome, DefenseGenome, ErrorType};
use crate::metrics::{RoundStats, RunMetrics};
use crate::novelty::NoveltyTracker;
use crate::quality::DefenseQualityChecker;
use crate::target::TargetSnapshot;
use crate::HardeningConfig;

/// Archive sample size shown to the attacker as context.
const ATTACK_CONTEXT_SAMPLE: usize = 5;
/// Diverse attacks shown to the defender.
const DEFENSE_DISPLAY_ATTACKS: usize = 3;
/// Failed-attack memory: trim at the cap, keep the most recent.
const FAILED_MEMORY_CAP: usize = 50;
const FAILED_MEMORY_KEEP: usize = 30;
const FAILED_CONTEXT_SIZE: usize = 10;

/// Final artifacts of a hardening run.
#[derive(Debug, Clone)]
pub struct HardeningOutcome {
    pub run_id: Uuid,
    pub original_source: String,
    pub hardened_source: String,
    pub hardened_path: Option<PathBuf>,
    pub metrics: RunMetrics,
    pub attack_stats: ArchiveStats,
    pub defense_stats: DefenseArchiveStats,
}

/// The co-evolutionary loop.
///
/// State across rounds: the current target, the MAP-Elites attack archive,
/// the defense archive, and the metrics record. Rounds are sequential; the
/// only parallelism anywhere is the evaluation subprocess, which runs to
/// completion before control returns. Agent failures and sandbox failures
/// are recoverable skips; a run ends only when the configured rounds are
/// exhausted.
pub struct RedQueenController {
    config: HardeningConfig,
    run_id: Uuid,
    attacker: Arc<dyn AttackAgent>,
    defender: Arc<dyn DefenseAgent>,
    evaluator: FitnessEvaluator,
    classifier: AttackClassifier,
    quality: DefenseQualityChecker,
    novelty: Option<NoveltyTracker>,
    attack_archive: MapElitesArchive,
    defense_archive: DefenseArchive,
    original_target: TargetSnapshot,
    current_target: TargetSnapshot,
    target_path: PathBuf,
    sanity_tests: Option<String>,
    failed_attacks: Vec<AttackCandidate>,
    metrics: RunMetrics,
    completed_rounds: u32,
}

impl RedQueenController {
    pub fn new(
        config: HardeningConfig,
        attacker: Arc<dyn AttackAgent>,
        defender: Arc<dyn DefenseAgent>,
        target: TargetSnapshot,
        target_path: PathBuf,
        sanity_tests: Option<String>,
    ) -> Result<Self> {
        config.validate()?;

        let timeout = Duration::from_secs(config.evaluation_timeout_seconds);
        let novelty = config.use_novelty.then(NoveltyTracker::new);
        let attack_archive = MapElitesArchive::new(config.max_attacks_per_niche);
        let defense_archive = DefenseArchive::new(config.max_defenders);

        Ok(Self {
            evaluator: FitnessEvaluator::new(timeout),
            classifier: AttackClassifier::new(),
            quality: DefenseQualityChecker::new(),
            novelty,
            attack_archive,
            defense_archive,
            original_target: target.clone(),
            current_target: target,
            target_path,
            sanity_tests,
            failed_attacks: Vec::new(),
            metrics: RunMetrics::default(),
            completed_rounds: 0,
            run_id: Uuid::new_v4(),
            attacker,
            defender,
            config,
        })
    }

    /// Restores a controller from a checkpoint written by a previous run.
    pub fn resume(
        config: HardeningConfig,
        attacker: Arc<dyn AttackAgent>,
        defender: Arc<dyn DefenseAgent>,
        checkpoint: Checkpoint,
        target_path: PathBuf,
        sanity_tests: Option<String>,
    ) -> Result<Self> {
        let mut controller = Self::new(
            config,
            attacker,
            defender,
            TargetSnapshot::new(checkpoint.original_code),
            target_path,
            sanity_tests,
        )?;

        controller.run_id = checkpoint.run_id;
        controller.current_target = TargetSnapshot::new(checkpoint.current_code);
        controller.attack_archive = MapElitesArchive::from_snapshot(
            checkpoint.attack_archive,
            controller.config.max_attacks_per_niche,
        );
        controller.defense_archive = DefenseArchive::from_snapshot(
            checkpoint.defense_archive,
            controller.config.max_defenders,
        );
        controller.metrics = checkpoint.metrics;
        controller.completed_rounds = checkpoint.round;

        info!(
            "↩️  Resumed run {} at round {} ({} archived attacks)",
            controller.run_id,
            checkpoint.round,
            controller.attack_archive.len()
        );

        Ok(controller)
    }

    pub fn current_source(&self) -> &str {
        self.current_target.source()
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Runs the remaining rounds and writes the final artifacts.
    pub async fn run(&mut self) -> Result<HardeningOutcome> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        info!("🔴🟢 RedQueen hardening run {}", self.run_id);
        info!(
            "   {} rounds × {} attacks, target {} ({} bytes)",
            self.config.n_rounds,
            self.config.attacks_per_round,
            self.target_path.display(),
            self.current_target.len()
        );

        let start = Instant::now();

        for round_num in (self.completed_rounds + 1)..=self.config.n_rounds {
            let stats = self.run_round(round_num).await;
            self.metrics.rounds.push(stats);

            if round_num % self.config.checkpoint_every == 0 {
                if let Err(e) = self.save_checkpoint(round_num) {
                    warn!("Failed to write checkpoint for round {}: {}", round_num, e);
                }
            }
        }

        self.metrics.total_time_sec = start.elapsed().as_secs_f64();
        self.metrics.final_robustness = self.measure_robustness().await;
        self.metrics.final_generality = self.mean_generality();

        let hardened_path = self.save_results()?;

        info!("📊 FINAL: robustness {:.1}%, {} attacks in {} niches, {} API calls",
            self.metrics.final_robustness * 100.0,
            self.attack_archive.len(),
            self.attack_archive.niche_count(),
            self.metrics.api_calls
        );

        Ok(HardeningOutcome {
            run_id: self.run_id,
            original_source: self.original_target.source().to_string(),
            hardened_source: self.current_target.source().to_string(),
            hardened_path,
            metrics: self.metrics.clone(),
            attack_stats: self.attack_archive.stats(),
            defense_stats: self.defense_archive.stats(),
        })
    }

    async fn run_round(&mut self, round_num: u32) -> RoundStats {
        info!("🔄 ROUND {}/{}", round_num, self.config.n_rounds);

        let mut stats = RoundStats::new(round_num);
        self.attack_phase(round_num, &mut stats).await;
        self.defense_phase(round_num, &mut stats).await;

        info!(
            "   Round {} done: +{} attacks, archive {} across {} niches",
            round_num,
            stats.attacks_successful,
            self.attack_archive.len(),
            self.attack_archive.niche_count()
        );

        stats
    }

    // ── Attack phase ────────────────────────────────────────────────────

    async fn attack_phase(&mut self, round_num: u32, stats: &mut RoundStats) {
        info!("🔴 ATTACKER: generating {} attacks", self.config.attacks_per_round);

        let attacker = Arc::clone(&self.attacker);

        for i in 1..=self.config.attacks_per_round {
            let target_source = self.current_target.source().to_string();
            let previous: Vec<AttackCandidate> = self
                .attack_archive
                .get_diverse_sample(ATTACK_CONTEXT_SAMPLE)
                .iter()
                .map(AttackCandidate::from_genome)
                .collect();
            let failed_tail: Vec<AttackCandidate> = self
                .failed_attacks
                .iter()
                .rev()
                .take(FAILED_CONTEXT_SIZE)
                .rev()
                .cloned()
                .collect();

            self.metrics.api_calls += 1;
            let candidate = match attacker
                .generate_attack(&target_source, &previous, &failed_tail)
                .await
            {
                Ok(Some(candidate)) => candidate,
                Ok(None) => {
                    warn!("   Attack {}: unparseable agent response, skipping", i);
                    continue;
                }
                Err(e) => {
                    warn!("   Attack {}: agent failure, skipping: {}", i, e);
                    continue;
                }
            };

            stats.attacks_generated += 1;

            if self
                .score_and_insert(candidate, round_num, None, None)
                .await
            {
                stats.attacks_successful += 1;
            }
        }

        // No fresh attack landed: fall back to evolving the archive itself.
        if stats.attacks_successful == 0 && self.attack_archive.len() >= 2 {
            self.evolve_archive(round_num, stats).await;
        }
    }

    /// Scores one candidate on the current target and, if it succeeded,
    /// classifies it, pre-scores its generality against recent defenders,
    /// and offers it to the archive.
    async fn score_and_insert(
        &mut self,
        candidate: AttackCandidate,
        round_num: u32,
        parent_hash: Option<String>,
        lineage: Option<ErrorType>,
    ) -> bool {
        let report = self
            .evaluator
            .evaluate_attack(self.current_target.source(), &candidate.test_code)
            .await;

        debug!(
            "   score={:.2} passed={} failed={} errors={}",
            report.score,
            report.passed,
            report.failed,
            report.errors.len()
        );

        if report.score < ATTACK_SUCCESS_THRESHOLD {
            self.remember_failed(candidate);
            return false;
        }

        let attack_type = self
            .classifier
            .classify_attack(candidate.type_hint, &candidate.test_code);
        let error_type = lineage.unwrap_or_else(|| self.classifier.classify_error(&report.errors));

        if let Some(tracker) = self.novelty.as_mut() {
            let first_error = report.errors.first().cloned().unwrap_or_default();
            let verdict = tracker.check_novelty(&candidate.test_code, attack_type, &first_error);
            if !verdict.is_novel {
                debug!("   rejected as non-novel: {}", verdict.reason);
                return false;
            }
            tracker.register(&candidate.test_code, attack_type, &first_error);
        }

        let mut genome = AttackGenome {
            code: candidate.test_code,
            attack_type,
            error_type,
            description: candidate.description,
            fitness: report.score,
            defeats_count: 0,
            tested_against: 0,
            generation: round_num,
            parent_hash,
        };

        self.prescore_generality(&mut genome).await;

        let generality = genome.generality();
        let accepted = self.attack_archive.add(genome);
        if accepted {
            info!(
                "   ✅ [{}] accepted (generality {:.0}%)",
                attack_type,
                generality * 100.0
            );
        }
        accepted
    }

    /// Red Queen pre-scoring: how many of the recent defenders does this
    /// fresh attack still break? A defender is only counted as defeated on a
    /// real crash, never on a defensive exception.
    async fn prescore_generality(&self, genome: &mut AttackGenome) {
        let defenders = self.defense_archive.recent(self.config.test_against_previous);
        if defenders.is_empty() {
            return;
        }

        let mut defeats = 0;
        for defense in &defenders {
            let report = self.evaluator.evaluate_attack(&defense.code, &genome.code).await;
            if classify_block(&report) == BlockOutcome::Crashed {
                defeats += 1;
            }
        }

        genome.defeats_count = defeats;
        genome.tested_against = defenders.len() as u32;
    }

    /// Mutation first, crossover second; stop at the first accepted child.
    async fn evolve_archive(&mut self, round_num: u32, stats: &mut RoundStats) {
        info!("🧬 No new attacks this round, trying mutation/crossover");

        let all = self.attack_archive.get_all();
        let attacker = Arc::clone(&self.attacker);

        if let Some(best) = all.iter().max_by(|a, b| {
            a.fitness
                .partial_cmp(&b.fitness)
                .unwrap_or(std::cmp::Ordering::Equal)
        }) {
            let parent = AttackCandidate::from_genome(best);
            let parent_hash = best.content_hash();
            let parent_type = best.attack_type;

            self.metrics.api_calls += 1;
            match attacker.mutate_attack(&parent).await {
                Ok(Some(mut child)) => {
                    child.type_hint = child.type_hint.or(Some(parent_type));
                    if self
                        .score_and_insert(
                            child,
                            round_num,
                            Some(parent_hash),
                            Some(ErrorType::Mutated),
                        )
                        .await
                    {
                        info!("   ✅ Mutation accepted");
                        stats.attacks_successful += 1;
                        return;
                    }
                }
                Ok(None) => debug!("   mutation produced nothing usable"),
                Err(e) => warn!("   mutation failed: {}", e),
            }
        }

        if all.len() >= 2 {
            // ThreadRng is not Send; keep it out of scope before any await.
            let (first_idx, second_idx) = {
                let mut rng = rand::thread_rng();
                let mut indices: Vec<usize> = (0..all.len()).collect();
                indices.shuffle(&mut rng);
                (indices[0], indices[1])
            };
            let (first, second) = (&all[first_idx], &all[second_idx]);

            // The child inherits the stronger parent's behavior tag.
            let dominant = if first.fitness >= second.fitness { first } else { second };
            let dominant_hash = dominant.content_hash();
            let dominant_type = dominant.attack_type;

            self.metrics.api_calls += 1;
            match attacker
                .crossover_attacks(
                    &AttackCandidate::from_genome(first),
                    &AttackCandidate::from_genome(second),
                )
                .await
            {
                Ok(Some(mut child)) => {
                    child.type_hint = Some(dominant_type);
                    if self
                        .score_and_insert(
                            child,
                            round_num,
                            Some(dominant_hash),
                            Some(ErrorType::Crossover),
                        )
                        .await
                    {
                        info!("   ✅ Crossover accepted");
                        stats.attacks_successful += 1;
                    }
                }
                Ok(None) => debug!("   crossover produced nothing usable"),
                Err(e) => warn!("   crossover failed: {}", e),
            }
        }
    }

    fn remember_failed(&mut self, candidate: AttackCandidate) {
        self.failed_attacks.push(candidate);
        if self.failed_attacks.len() > FAILED_MEMORY_CAP {
            let start = self.failed_attacks.len() - FAILED_MEMORY_KEEP;
            self.failed_attacks.drain(..start);
        }
    }

    // ── Defense phase ───────────────────────────────────────────────────

    async fn defense_phase(&mut self, round_num: u32, stats: &mut RoundStats) {
        let display = self.attack_archive.get_diverse_sample(DEFENSE_DISPLAY_ATTACKS);
        if display.is_empty() {
            info!("🟢 DEFENDER: no attacks to defend against yet");
            return;
        }

        info!(
            "🟢 DEFENDER: patching against {} archived attacks",
            self.attack_archive.len()
        );

        let failing: Vec<AttackCandidate> =
            display.iter().map(AttackCandidate::from_genome).collect();
        let target_source = self.current_target.source().to_string();

        self.metrics.api_calls += 1;
        let patch = match self
            .defender
            .generate_defense(&target_source, &failing, &[])
            .await
        {
            Ok(Some(patch)) => patch,
            Ok(None) => {
                warn!("   Defender produced no usable patch this round");
                return;
            }
            Err(e) => {
                warn!("   Defender failed this round: {}", e);
                return;
            }
        };

        let quality = self
            .quality
            .check(self.original_target.source(), &patch.fixed_code);
        if !quality.is_clean() {
            warn!(
                "   ⚠️  Quality warnings (penalty {:.2}): {:?}",
                quality.penalty, quality.warnings
            );
            stats.quality_warnings = quality.warnings.clone();
        }

        // Red Queen: the patch faces the archive as it stands right now,
        // attacks accepted earlier in this same round included.
        let genomes = self.attack_archive.get_all();
        let mut blocks = 0u32;
        let mut cross_tests = Vec::with_capacity(genomes.len());

        for genome in &genomes {
            let report = self
                .evaluator
                .evaluate_attack(&patch.fixed_code, &genome.code)
                .await;
            match classify_block(&report) {
                BlockOutcome::Passed => {
                    blocks += 1;
                    debug!("   ✓ blocked: {}", genome.attack_type);
                    cross_tests.push((genome.content_hash(), false));
                }
                BlockOutcome::Defensive => {
                    blocks += 1;
                    debug!("   ✓ handled: {} (defensive exception)", genome.attack_type);
                    cross_tests.push((genome.content_hash(), false));
                }
                BlockOutcome::Crashed => {
                    debug!(
                        "   ✗ crashed: {} - {}",
                        genome.attack_type,
                        report.first_error().unwrap_or("unknown")
                    );
                    cross_tests.push((genome.content_hash(), true));
                }
            }
        }

        for (hash, defeated) in cross_tests {
            self.attack_archive.record_cross_test(&hash, defeated);
        }

        let total = genomes.len() as u32;
        let mut robustness = f64::from(blocks) / f64::from(total);
        let mut blocks_count = blocks;

        if let Some(sanity) = self.sanity_tests.as_deref().filter(|s| !s.trim().is_empty()) {
            if !self.evaluator.sanity_passes(&patch.fixed_code, sanity).await {
                warn!("   🚫 Patch fails sanity tests, fitness forced to 0");
                robustness = 0.0;
                blocks_count = 0;
            }
        }

        let best_prior = self
            .defense_archive
            .get_best()
            .map(DefenseGenome::robustness)
            .unwrap_or(0.0);

        self.defense_archive.add(DefenseGenome {
            code: patch.fixed_code.clone(),
            description: patch.explanation,
            fitness: robustness,
            blocks_count,
            tested_against: total,
            generation: round_num,
            parent_hash: None,
        });

        // Promotion requires strict improvement; a tie keeps the incumbent.
        if robustness > best_prior {
            self.current_target = TargetSnapshot::new(patch.fixed_code);
            stats.defense_improved = true;
            info!(
                "   ✅ Defense improved: {:.1}% → {:.1}%",
                best_prior * 100.0,
                robustness * 100.0
            );
        } else {
            info!(
                "   📊 Robustness {:.1}% (best so far {:.1}%), target unchanged",
                robustness * 100.0,
                best_prior * 100.0
            );
        }

        stats.new_robustness = robustness;
        self.metrics.robustness_over_time.push(robustness);
        self.metrics.generality_over_time.push(self.mean_generality());
    }

    // ── Measurement and persistence ─────────────────────────────────────

    /// Final robustness of the current target against the whole archive,
    /// with the same blocked/crashed rule the round loop uses.
    async fn measure_robustness(&self) -> f64 {
        let genomes = self.attack_archive.get_all();
        if genomes.is_empty() {
            return 1.0;
        }

        let mut blocks = 0usize;
        for genome in &genomes {
            let report = self
                .evaluator
                .evaluate_attack(self.current_target.source(), &genome.code)
                .await;
            if classify_block(&report) != BlockOutcome::Crashed {
                blocks += 1;
            }
        }
        blocks as f64 / genomes.len() as f64
    }

    fn mean_generality(&self) -> f64 {
        let genomes = self.attack_archive.get_all();
        if genomes.is_empty() {
            return 0.0;
        }
        genomes.iter().map(AttackGenome::generality).sum::<f64>() / genomes.len() as f64
    }

    fn save_checkpoint(&self, round_num: u32) -> Result<()> {
        let checkpoint = Checkpoint {
            round: round_num,
            run_id: self.run_id,
            original_code: self.original_target.source().to_string(),
            current_code: self.current_target.source().to_string(),
            attack_stats: self.attack_archive.stats(),
            defense_stats: self.defense_archive.stats(),
            metrics: self.metrics.clone(),
            attack_archive: self.attack_archive.snapshot(),
            defense_archive: self.defense_archive.snapshot(),
        };

        let path = checkpoint.save(&self.config.output_dir)?;
        debug!("💾 Checkpoint written to {}", path.display());
        Ok(())
    }

    /// Writes the archive, the results record, and the hardened source: one
    /// copy in the output directory, one next to the original input.
    fn save_results(&self) -> Result<Option<PathBuf>> {
        self.attack_archive
            .save(&self.config.output_dir.join("attack_archive.json"))?;

        ResultsRecord::new(
            self.run_id,
            self.config.clone(),
            self.metrics.clone(),
            self.attack_archive.stats(),
            self.defense_archive.stats(),
        )
        .save(&self.config.output_dir)?;

        std::fs::write(
            self.config.output_dir.join("hardened_code.py"),
            self.current_target.source(),
        )?;

        let hardened_path = hardened_sibling(&self.target_path);
        match &hardened_path {
            Some(path) => {
                std::fs::write(path, self.current_target.source())?;
                info!("💾 Hardened target written to {}", path.display());
            }
            None => warn!("Could not derive a hardened-copy path next to the input"),
        }

        Ok(hardened_path)
    }
}

/// `<dir>/<stem>_hardened.py` next to the original input.
fn hardened_sibling(target_path: &Path) -> Option<PathBuf> {
    let stem = target_path.file_stem()?.to_str()?;
    Some(target_path.with_file_name(format!("{}_hardened.py", stem)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardened_copy_lands_next_to_the_input() {
        let path = hardened_sibling(Path::new("/work/examples/parser/target.py")).unwrap();
        assert_eq!(path, Path::new("/work/examples/parser/target_hardened.py"));
    }
}
