// RedQueen CLI
// Command-line front end for the adversarial hardening engine

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

mod output;
mod presets;

use redqueen_agents::{agents_from_env, ApiCredentials};
use redqueen_engine::{
    load_target, Checkpoint, HardeningConfig, RedQueenController, TargetSnapshot,
};

/// RedQueen - harden code against latent bugs with a co-evolutionary
/// attacker/defender loop
#[derive(Parser)]
#[command(name = "redqueen")]
#[command(about = "RedQueen - adversarial code hardening with Red Queen dynamics and MAP-Elites")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Target file or directory to harden
    target: PathBuf,

    /// Number of rounds (overrides the preset)
    #[arg(short, long)]
    rounds: Option<u32>,

    /// Attack attempts per round (overrides the preset)
    #[arg(short, long)]
    attacks: Option<u32>,

    /// Preset: quick, standard, thorough, premium, max
    #[arg(short, long)]
    preset: Option<String>,

    /// Output directory for checkpoints, archives and results
    #[arg(short, long, default_value = "results/drq")]
    output: PathBuf,

    /// Wall-clock timeout per sandboxed evaluation, in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Sanity test file that every patch must keep passing
    #[arg(long)]
    sanity: Option<PathBuf>,

    /// Resume from a checkpoint JSON written by a previous run
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Disable the novelty gate in front of the attack archive
    #[arg(long)]
    no_novelty: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    output::banner();

    if ApiCredentials::from_env().is_none() {
        eprintln!("{}", "❌ API key not set!".red().bold());
        eprintln!();
        eprintln!("OpenRouter (recommended):");
        eprintln!("  export OPENROUTER_API_KEY='sk-or-...'");
        eprintln!("NanoGPT:");
        eprintln!("  export NANOGPT_API_KEY='...'");
        eprintln!("OpenAI:");
        eprintln!("  export OPENAI_API_KEY='sk-...'");
        std::process::exit(1);
    }

    let preset = presets::resolve(cli.preset.as_deref())?;
    let rounds = cli.rounds.unwrap_or(preset.rounds);
    let attacks = cli.attacks.unwrap_or(preset.attacks);
    output::print_plan(preset, rounds, attacks, &cli.target);

    let config = HardeningConfig {
        n_rounds: rounds,
        attacks_per_round: attacks,
        output_dir: cli.output.clone(),
        evaluation_timeout_seconds: cli.timeout,
        use_novelty: !cli.no_novelty,
        ..Default::default()
    };

    let sanity_tests = match &cli.sanity {
        Some(path) => Some(std::fs::read_to_string(path).with_context(|| {
            format!("failed to read sanity tests from {}", path.display())
        })?),
        None => None,
    };

    let (attacker, defender) = agents_from_env(preset.attacker_model, preset.defender_model)?;
    let attacker = Arc::new(attacker);
    let defender = Arc::new(defender);

    let (source, target_path) =
        load_target(&cli.target).context("failed to load the target")?;
    tracing::info!("Loaded {} bytes from {}", source.len(), target_path.display());

    let mut controller = match &cli.resume {
        Some(path) => {
            let checkpoint = Checkpoint::load(path)
                .with_context(|| format!("failed to load checkpoint {}", path.display()))?;
            RedQueenController::resume(
                config,
                attacker,
                defender,
                checkpoint,
                target_path,
                sanity_tests,
            )?
        }
        None => RedQueenController::new(
            config,
            attacker,
            defender,
            TargetSnapshot::new(source),
            target_path,
            sanity_tests,
        )?,
    };

    let outcome = controller.run().await?;
    output::print_summary(&outcome, preset.cost_per_call);

    Ok(())
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
