//! Integration tests for the RedQueen engine.
//!
//! The sandbox tests execute real pytest subprocesses; they skip themselves
//! on hosts without `python3` and pytest so the pure-logic suite stays
//! runnable everywhere.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use redqueen_engine::*;

fn pytest_available() -> bool {
    std::process::Command::new("python3")
        .args(["-c", "import pytest"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

macro_rules! require_pytest {
    () => {
        if !pytest_available() {
            eprintln!("skipping: python3/pytest not available on this host");
            return;
        }
    };
}

fn evaluator() -> FitnessEvaluator {
    FitnessEvaluator::new(Duration::from_secs(30))
}

fn genome_from(code: &str, description: &str, fitness: f64) -> AttackGenome {
    AttackGenome {
        code: code.to_string(),
        attack_type: AttackType::EdgeCase,
        error_type: ErrorType::Unknown,
        description: description.to_string(),
        fitness,
        defeats_count: 0,
        tested_against: 0,
        generation: 1,
        parent_hash: None,
    }
}

// ── Fitness scenarios ───────────────────────────────────────────────────

#[tokio::test]
async fn crashing_attack_scores_full_fitness() {
    require_pytest!();

    let target = "def div(a, b):\n    return a / b\n";
    let attack = "def test_div_zero():\n    div(10, 0)\n";

    let report = evaluator().evaluate_attack(target, attack).await;
    assert_eq!(report.score, 1.0);
    assert_eq!(report.failed, 1);
    assert!(report
        .first_error()
        .map(|e| e.contains("ZeroDivisionError"))
        .unwrap_or(false));

    let mut archive = MapElitesArchive::new(3);
    assert!(archive.add(genome_from(attack, "division by zero", report.score)));
    assert_eq!(archive.len(), 1);
}

#[tokio::test]
async fn surviving_target_scores_zero() {
    require_pytest!();

    let target = "def div(a, b):\n    return None if b == 0 else a / b\n";
    let attack = "def test_div_zero():\n    assert div(10, 0) is None\n";

    let report = evaluator().evaluate_attack(target, attack).await;
    assert_eq!(report.score, 0.0);
    assert_eq!(report.passed, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn broken_target_counts_as_partial_success() {
    require_pytest!();

    // Unparseable target: pytest reports a collection error, no tests run.
    let target = "def broken(:\n";
    let attack = "def test_broken():\n    broken()\n";

    let report = evaluator().evaluate_attack(target, attack).await;
    assert_eq!(report.score, 0.8);
    assert_eq!(report.failed, 0);
    assert!(!report.errors.is_empty());
}

#[tokio::test]
async fn timeout_maps_to_half_fitness() {
    require_pytest!();

    let target = "def spin():\n    while True:\n        pass\n";
    let attack = "def test_spin():\n    spin()\n";

    let evaluator = FitnessEvaluator::new(Duration::from_secs(2));
    let report = evaluator.evaluate_attack(target, attack).await;
    assert_eq!(report.score, 0.5);
    assert!(report.timed_out);
    assert_eq!(report.errors, vec!["Timeout".to_string()]);
}

#[tokio::test]
async fn defensive_exception_is_credited_as_blocked() {
    require_pytest!();

    let patched = "def handle(value):\n    if value == \"\":\n        raise ValueError(\"Input cannot be empty\")\n    return value\n";
    let attack = "def test_handle_empty():\n    assert handle(\"\") == \"\"\n";

    // The raw run is a failed test...
    let report = evaluator().evaluate_attack(patched, attack).await;
    assert_eq!(report.score, 1.0);

    // ...but the classifier recognizes deliberate validation.
    assert_eq!(classify_block(&report), BlockOutcome::Defensive);
    assert!(is_blocked(&report));
}

#[tokio::test]
async fn sanity_failure_zeroes_defense_fitness() {
    require_pytest!();

    // The patch blocks every attack by doing nothing at all.
    let patch = "def add(a, b):\n    return None\n";
    let attacks = vec![genome_from(
        "def test_add_huge():\n    add(10**100, 10**100)\n",
        "huge operands",
        1.0,
    )];
    let sanity = "def test_add_sanity():\n    assert add(2, 3) == 5\n";

    let report = evaluator()
        .evaluate_defense(patch, &attacks, Some(sanity))
        .await;
    assert_eq!(report.score, 0.0);
    assert!(report.errors.iter().any(|e| e.starts_with("SANITY_FAILED")));
}

#[tokio::test]
async fn defense_fitness_is_the_fraction_of_blocked_attacks() {
    require_pytest!();

    let patch = "def div(a, b):\n    if b == 0:\n        return None\n    return a / b\n";
    let attacks = vec![
        genome_from("def test_zero():\n    assert div(10, 0) is None\n", "zero", 1.0),
        genome_from("def test_types():\n    div('x', 'y')\n", "strings", 1.0),
    ];

    let report = evaluator().evaluate_defense(patch, &attacks, None).await;
    assert_eq!(report.passed, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.score, 0.5);
}

#[tokio::test]
async fn evaluation_is_deterministic_without_timeouts() {
    require_pytest!();

    let target = "def div(a, b):\n    return a / b\n";
    let attack = "def test_div_zero():\n    div(10, 0)\n";

    let first = evaluator().evaluate_attack(target, attack).await;
    let second = evaluator().evaluate_attack(target, attack).await;
    assert_eq!(first.passed, second.passed);
    assert_eq!(first.failed, second.failed);
    assert_eq!(first.score, second.score);
}

// ── Controller scenarios with scripted agents ───────────────────────────

struct ScriptedAttacker {
    responses: Mutex<VecDeque<Option<AttackCandidate>>>,
}

impl ScriptedAttacker {
    fn new(responses: Vec<Option<AttackCandidate>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl AttackAgent for ScriptedAttacker {
    async fn generate_attack(
        &self,
        _target_source: &str,
        _previous_attacks: &[AttackCandidate],
        _failed_attacks: &[AttackCandidate],
    ) -> Result<Option<AttackCandidate>> {
        Ok(self.responses.lock().unwrap().pop_front().flatten())
    }

    async fn mutate_attack(&self, _parent: &AttackCandidate) -> Result<Option<AttackCandidate>> {
        Ok(None)
    }

    async fn crossover_attacks(
        &self,
        _first: &AttackCandidate,
        _second: &AttackCandidate,
    ) -> Result<Option<AttackCandidate>> {
        Ok(None)
    }
}

struct ScriptedDefender {
    responses: Mutex<VecDeque<Option<PatchCandidate>>>,
}

impl ScriptedDefender {
    fn new(responses: Vec<Option<PatchCandidate>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl DefenseAgent for ScriptedDefender {
    async fn generate_defense(
        &self,
        _target_source: &str,
        _failing_attacks: &[AttackCandidate],
        _previous_fixes: &[String],
    ) -> Result<Option<PatchCandidate>> {
        Ok(self.responses.lock().unwrap().pop_front().flatten())
    }
}

fn attack_candidate(code: &str, description: &str) -> Option<AttackCandidate> {
    Some(AttackCandidate {
        test_code: code.to_string(),
        description: description.to_string(),
        type_hint: None,
    })
}

const GUARDED_DIV: &str = "def div(a, b):\n    if b == 0:\n        raise ValueError(\"Invalid input: division by zero\")\n    return a / b\n";

#[tokio::test]
async fn promotion_requires_strict_improvement() {
    require_pytest!();

    let workdir = tempfile::tempdir().unwrap();
    let target_path = workdir.path().join("target.py");
    std::fs::write(&target_path, "def div(a, b):\n    return a / b\n").unwrap();

    let config = HardeningConfig {
        n_rounds: 2,
        attacks_per_round: 1,
        output_dir: workdir.path().join("results"),
        checkpoint_every: 2,
        use_novelty: false,
        ..Default::default()
    };

    let attacker = Arc::new(ScriptedAttacker::new(vec![
        attack_candidate("def test_div_zero():\n    div(10, 0)\n", "divide by zero"),
        attack_candidate("def test_div_zero_again():\n    div(5, 0)\n", "divide by zero again"),
    ]));
    // The same patch twice: round two ties on robustness and must not promote.
    let defender = Arc::new(ScriptedDefender::new(vec![
        Some(PatchCandidate {
            fixed_code: GUARDED_DIV.to_string(),
            explanation: "validate divisor".to_string(),
        }),
        Some(PatchCandidate {
            fixed_code: GUARDED_DIV.to_string(),
            explanation: "validate divisor (again)".to_string(),
        }),
    ]));

    let (source, path) = load_target(&target_path).unwrap();
    let mut controller = RedQueenController::new(
        config,
        attacker,
        defender,
        TargetSnapshot::new(source),
        path,
        None,
    )
    .unwrap();

    let outcome = controller.run().await.unwrap();

    assert_eq!(outcome.metrics.rounds.len(), 2);
    assert!(outcome.metrics.rounds[0].defense_improved);
    assert!(!outcome.metrics.rounds[1].defense_improved);
    assert_eq!(outcome.hardened_source, GUARDED_DIV);
    assert_eq!(outcome.metrics.robustness_over_time, vec![1.0, 1.0]);
    assert_eq!(outcome.defense_stats.total, 2);
    assert_eq!(outcome.metrics.final_robustness, 1.0);

    // Persisted artifacts.
    assert!(workdir.path().join("results/results.json").exists());
    assert!(workdir.path().join("results/attack_archive.json").exists());
    assert!(workdir.path().join("results/checkpoint_round_2.json").exists());
    assert!(workdir.path().join("target_hardened.py").exists());
}

#[tokio::test]
async fn agent_failures_are_recoverable_skips() {
    require_pytest!();

    let workdir = tempfile::tempdir().unwrap();
    let target_path = workdir.path().join("target.py");
    std::fs::write(&target_path, "def div(a, b):\n    return a / b\n").unwrap();

    let config = HardeningConfig {
        n_rounds: 1,
        attacks_per_round: 2,
        output_dir: workdir.path().join("results"),
        ..Default::default()
    };

    // First response is unparseable, the defender never answers.
    let attacker = Arc::new(ScriptedAttacker::new(vec![
        None,
        attack_candidate("def test_div_zero():\n    div(10, 0)\n", "divide by zero"),
    ]));
    let defender = Arc::new(ScriptedDefender::new(vec![None]));

    let mut controller = RedQueenController::new(
        config,
        attacker,
        defender,
        TargetSnapshot::new(std::fs::read_to_string(&target_path).unwrap()),
        target_path,
        None,
    )
    .unwrap();

    let outcome = controller.run().await.unwrap();

    // The run completed: one attack archived, no defense, target unchanged.
    assert_eq!(outcome.attack_stats.total_genomes, 1);
    assert_eq!(outcome.defense_stats.total, 0);
    assert_eq!(outcome.hardened_source, outcome.original_source);
    assert_eq!(outcome.metrics.rounds.len(), 1);
}

#[tokio::test]
async fn checkpoints_resume_into_a_new_controller() {
    require_pytest!();

    let workdir = tempfile::tempdir().unwrap();
    let target_path = workdir.path().join("target.py");
    std::fs::write(&target_path, "def div(a, b):\n    return a / b\n").unwrap();

    let config = HardeningConfig {
        n_rounds: 2,
        attacks_per_round: 1,
        output_dir: workdir.path().join("results"),
        checkpoint_every: 2,
        use_novelty: false,
        ..Default::default()
    };

    let attacker = Arc::new(ScriptedAttacker::new(vec![
        attack_candidate("def test_div_zero():\n    div(10, 0)\n", "divide by zero"),
        None,
    ]));
    let defender = Arc::new(ScriptedDefender::new(vec![
        Some(PatchCandidate {
            fixed_code: GUARDED_DIV.to_string(),
            explanation: "validate divisor".to_string(),
        }),
        None,
    ]));

    let mut controller = RedQueenController::new(
        config.clone(),
        attacker,
        defender,
        TargetSnapshot::new(std::fs::read_to_string(&target_path).unwrap()),
        target_path.clone(),
        None,
    )
    .unwrap();
    controller.run().await.unwrap();

    let checkpoint =
        Checkpoint::load(&workdir.path().join("results/checkpoint_round_2.json")).unwrap();
    assert_eq!(checkpoint.round, 2);

    let resumed = RedQueenController::resume(
        HardeningConfig {
            n_rounds: 4,
            ..config
        },
        Arc::new(ScriptedAttacker::new(vec![])),
        Arc::new(ScriptedDefender::new(vec![])),
        checkpoint,
        target_path,
        None,
    )
    .unwrap();

    assert_eq!(resumed.current_source(), GUARDED_DIV);
    assert!(resumed.metrics().robustness_over_time.len() >= 1);
}
