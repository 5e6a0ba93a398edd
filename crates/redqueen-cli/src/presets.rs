//! Run presets: rounds × attacks × models, with cost expectations.

use anyhow::{anyhow, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;

use redqueen_agents::{MODEL_GPT4O, MODEL_GPT4O_MINI};

pub struct Preset {
    pub key: &'static str,
    pub label: &'static str,
    pub rounds: u32,
    pub attacks: u32,
    pub attacker_model: &'static str,
    pub defender_model: &'static str,
    pub cost_hint: &'static str,
    pub cost_per_call: f64,
}

pub const PRESETS: [Preset; 5] = [
    Preset {
        key: "quick",
        label: "Quick Test",
        rounds: 5,
        attacks: 3,
        attacker_model: MODEL_GPT4O_MINI,
        defender_model: MODEL_GPT4O_MINI,
        cost_hint: "~$0.05",
        cost_per_call: 0.002,
    },
    Preset {
        key: "standard",
        label: "Standard",
        rounds: 10,
        attacks: 5,
        attacker_model: MODEL_GPT4O_MINI,
        defender_model: MODEL_GPT4O_MINI,
        cost_hint: "~$0.15",
        cost_per_call: 0.002,
    },
    Preset {
        key: "thorough",
        label: "Thorough",
        rounds: 15,
        attacks: 8,
        attacker_model: MODEL_GPT4O_MINI,
        defender_model: MODEL_GPT4O_MINI,
        cost_hint: "~$0.40",
        cost_per_call: 0.002,
    },
    Preset {
        key: "premium",
        label: "Premium (GPT-4o)",
        rounds: 10,
        attacks: 5,
        attacker_model: MODEL_GPT4O,
        defender_model: MODEL_GPT4O,
        cost_hint: "~$1.50",
        cost_per_call: 0.01,
    },
    Preset {
        key: "max",
        label: "Maximum (GPT-4o + more rounds)",
        rounds: 20,
        attacks: 10,
        attacker_model: MODEL_GPT4O,
        defender_model: MODEL_GPT4O,
        cost_hint: "~$5.00",
        cost_per_call: 0.01,
    },
];

const DEFAULT_PRESET: usize = 1; // standard

/// Resolves a preset by name, interactively on a terminal, or falls back to
/// standard.
pub fn resolve(name: Option<&str>) -> Result<&'static Preset> {
    match name {
        Some(name) => PRESETS
            .iter()
            .find(|p| p.key.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                anyhow!(
                    "unknown preset '{}'; expected one of quick, standard, thorough, premium, max",
                    name
                )
            }),
        None if console::user_attended() => select_interactive(),
        None => Ok(&PRESETS[DEFAULT_PRESET]),
    }
}

fn select_interactive() -> Result<&'static Preset> {
    let items: Vec<String> = PRESETS
        .iter()
        .map(|p| {
            format!(
                "{} - {} rounds × {} attacks | {}",
                p.label, p.rounds, p.attacks, p.cost_hint
            )
        })
        .collect();

    let choice = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select mode")
        .items(&items)
        .default(DEFAULT_PRESET)
        .interact()?;

    Ok(&PRESETS[choice])
}
