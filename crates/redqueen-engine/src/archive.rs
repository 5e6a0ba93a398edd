//! MAP-Elites attack archive and the defense archive.
//!
//! MAP-Elites keeps the best few attacks in every `(attack_type, error_type)`
//! niche instead of one global best. That diversity is what gives the Red
//! Queen loop its pressure: a defender must survive many distinct failure
//! modes, not one champion attack replayed forever.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::genome::{AttackGenome, AttackType, DefenseGenome, Niche};

/// Default capacity of one behavior niche.
pub const DEFAULT_MAX_PER_NICHE: usize = 3;

/// Aggregate archive statistics, serialized into checkpoints and results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveStats {
    pub total_niches: usize,
    pub total_genomes: usize,
    pub total_evaluated: u64,
    pub total_added: u64,
    pub acceptance_rate: f64,
    pub coverage_by_type: BTreeMap<String, usize>,
    pub avg_fitness: f64,
    pub avg_generality: f64,
}

/// Serialized archive payload: enough to reconstruct the niche map exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSnapshot {
    pub genomes: Vec<AttackGenome>,
    pub history: Vec<AttackGenome>,
    pub stats: ArchiveStats,
}

/// Quality-diversity archive of attacks keyed by behavior descriptor.
pub struct MapElitesArchive {
    max_per_niche: usize,
    niches: BTreeMap<Niche, Vec<AttackGenome>>,
    history: Vec<AttackGenome>,
    total_evaluated: u64,
    total_added: u64,
}

impl MapElitesArchive {
    pub fn new(max_per_niche: usize) -> Self {
        Self {
            max_per_niche: max_per_niche.max(1),
            niches: BTreeMap::new(),
            history: Vec::new(),
            total_evaluated: 0,
            total_added: 0,
        }
    }

    /// Offers a genome to its niche.
    ///
    /// Acceptance requires either free capacity or strictly higher fitness
    /// than the niche minimum. Eviction removes the minimum-fitness genome,
    /// breaking ties toward the oldest generation and then the earliest
    /// insertion. Re-offering a genome already present in its niche (same
    /// content hash) changes nothing.
    pub fn add(&mut self, genome: AttackGenome) -> bool {
        self.total_evaluated += 1;
        self.history.push(genome.clone());

        let niche = genome.niche();
        let list = self.niches.entry(niche).or_default();

        let hash = genome.content_hash();
        if list.iter().any(|g| g.content_hash() == hash) {
            return false;
        }

        if list.len() < self.max_per_niche {
            list.push(genome);
            sort_by_fitness_desc(list);
            self.total_added += 1;
            return true;
        }

        let min_fitness = list
            .iter()
            .map(|g| g.fitness)
            .fold(f64::INFINITY, f64::min);
        if genome.fitness > min_fitness {
            list.remove(eviction_index(list));
            list.push(genome);
            sort_by_fitness_desc(list);
            self.total_added += 1;
            return true;
        }

        false
    }

    /// Records one Red-Queen cross-test outcome for an archived attack.
    pub fn record_cross_test(&mut self, hash: &str, defeated: bool) {
        for list in self.niches.values_mut() {
            for genome in list.iter_mut() {
                if genome.content_hash() == hash {
                    genome.tested_against += 1;
                    if defeated {
                        genome.defeats_count += 1;
                    }
                }
            }
        }
    }

    /// Every archived genome, flattened in niche order.
    pub fn get_all(&self) -> Vec<AttackGenome> {
        self.niches.values().flatten().cloned().collect()
    }

    pub fn get_by_type(&self, attack_type: AttackType) -> Vec<AttackGenome> {
        self.niches
            .iter()
            .filter(|((t, _), _)| *t == attack_type)
            .flat_map(|(_, list)| list.iter().cloned())
            .collect()
    }

    /// Round-robin sample across niches: every niche's best first, then
    /// every second-best, and so on until `n` are collected. Coverage over
    /// behavior descriptors beats fitness concentration here.
    pub fn get_diverse_sample(&self, n: usize) -> Vec<AttackGenome> {
        if self.len() <= n {
            return self.get_all();
        }

        let mut sample = Vec::with_capacity(n);
        let mut depth = 0;
        'outer: loop {
            let mut found_any = false;
            for list in self.niches.values() {
                if let Some(genome) = list.get(depth) {
                    found_any = true;
                    sample.push(genome.clone());
                    if sample.len() >= n {
                        break 'outer;
                    }
                }
            }
            if !found_any {
                break;
            }
            depth += 1;
        }
        sample
    }

    pub fn len(&self) -> usize {
        self.niches.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.niches.values().all(Vec::is_empty)
    }

    pub fn niche_count(&self) -> usize {
        self.niches.values().filter(|list| !list.is_empty()).count()
    }

    pub fn history(&self) -> &[AttackGenome] {
        &self.history
    }

    pub fn stats(&self) -> ArchiveStats {
        let all = self.get_all();
        let count = all.len().max(1) as f64;

        let mut coverage = BTreeMap::new();
        for attack_type in AttackType::ALL {
            coverage.insert(
                attack_type.as_str().to_string(),
                self.get_by_type(attack_type).len(),
            );
        }

        ArchiveStats {
            total_niches: self.niche_count(),
            total_genomes: all.len(),
            total_evaluated: self.total_evaluated,
            total_added: self.total_added,
            acceptance_rate: self.total_added as f64 / self.total_evaluated.max(1) as f64,
            coverage_by_type: coverage,
            avg_fitness: all.iter().map(|g| g.fitness).sum::<f64>() / count,
            avg_generality: all.iter().map(|g| g.generality()).sum::<f64>() / count,
        }
    }

    pub fn snapshot(&self) -> ArchiveSnapshot {
        ArchiveSnapshot {
            genomes: self.get_all(),
            history: self.history.clone(),
            stats: self.stats(),
        }
    }

    /// Reconstructs an archive from a snapshot, niche placement and counters
    /// included.
    pub fn from_snapshot(snapshot: ArchiveSnapshot, max_per_niche: usize) -> Self {
        let mut archive = Self::new(max_per_niche);
        for genome in snapshot.genomes {
            let list = archive.niches.entry(genome.niche()).or_default();
            list.push(genome);
        }
        for list in archive.niches.values_mut() {
            sort_by_fitness_desc(list);
        }
        archive.history = snapshot.history;
        archive.total_evaluated = snapshot.stats.total_evaluated;
        archive.total_added = snapshot.stats.total_added;
        archive
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path, data)?;
        Ok(())
    }

    pub fn load(path: &Path, max_per_niche: usize) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let snapshot: ArchiveSnapshot = serde_json::from_str(&data)?;
        Ok(Self::from_snapshot(snapshot, max_per_niche))
    }
}

fn sort_by_fitness_desc(list: &mut [AttackGenome]) {
    list.sort_by(|a, b| {
        b.fitness
            .partial_cmp(&a.fitness)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Index of the genome to evict: minimum fitness, ties broken toward the
/// oldest generation, then the earliest position. Within equal fitness the
/// stable descending sort keeps earlier insertions first, so the first
/// qualifying index is the earliest-inserted genome.
fn eviction_index(list: &[AttackGenome]) -> usize {
    let mut victim = 0;
    for (i, genome) in list.iter().enumerate().skip(1) {
        let current = &list[victim];
        if genome.fitness < current.fitness
            || (genome.fitness == current.fitness && genome.generation < current.generation)
        {
            victim = i;
        }
    }
    victim
}

/// Defense archive statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefenseArchiveStats {
    pub total: usize,
    pub total_history: usize,
    pub best_robustness: f64,
    pub avg_robustness: f64,
}

/// Serialized defense archive payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefenseSnapshot {
    pub genomes: Vec<DefenseGenome>,
    pub history: Vec<DefenseGenome>,
    pub stats: DefenseArchiveStats,
}

/// Bounded, insertion-ordered archive of defenses.
///
/// Unlike attacks, defenses are not organized by niche; recency matters
/// because new attacks are cross-tested against the last few defenders.
pub struct DefenseArchive {
    max_size: usize,
    genomes: Vec<DefenseGenome>,
    history: Vec<DefenseGenome>,
}

impl DefenseArchive {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            genomes: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Appends unconditionally; when over capacity, the lowest-robustness
    /// genomes are dropped, earliest first on ties, and insertion order is
    /// preserved for the survivors.
    pub fn add(&mut self, genome: DefenseGenome) {
        self.history.push(genome.clone());
        self.genomes.push(genome);

        while self.genomes.len() > self.max_size {
            let mut victim = 0;
            for (i, genome) in self.genomes.iter().enumerate().skip(1) {
                if genome.robustness() < self.genomes[victim].robustness() {
                    victim = i;
                }
            }
            self.genomes.remove(victim);
        }
    }

    pub fn get_best(&self) -> Option<&DefenseGenome> {
        self.genomes.iter().max_by(|a, b| {
            a.robustness()
                .partial_cmp(&b.robustness())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    pub fn get_all(&self) -> Vec<DefenseGenome> {
        self.genomes.clone()
    }

    /// The most recent `n` defenses in insertion order.
    pub fn recent(&self, n: usize) -> Vec<DefenseGenome> {
        let start = self.genomes.len().saturating_sub(n);
        self.genomes[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.genomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genomes.is_empty()
    }

    pub fn history(&self) -> &[DefenseGenome] {
        &self.history
    }

    pub fn stats(&self) -> DefenseArchiveStats {
        let count = self.genomes.len().max(1) as f64;
        DefenseArchiveStats {
            total: self.genomes.len(),
            total_history: self.history.len(),
            best_robustness: self.get_best().map(DefenseGenome::robustness).unwrap_or(0.0),
            avg_robustness: self.genomes.iter().map(DefenseGenome::robustness).sum::<f64>()
                / count,
        }
    }

    pub fn snapshot(&self) -> DefenseSnapshot {
        DefenseSnapshot {
            genomes: self.genomes.clone(),
            history: self.history.clone(),
            stats: self.stats(),
        }
    }

    pub fn from_snapshot(snapshot: DefenseSnapshot, max_size: usize) -> Self {
        let mut archive = Self::new(max_size);
        archive.genomes = snapshot.genomes;
        archive.history = snapshot.history;
        archive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::ErrorType;

    fn attack(code: &str, fitness: f64, generation: u32) -> AttackGenome {
        AttackGenome {
            code: code.to_string(),
            attack_type: AttackType::EdgeCase,
            error_type: ErrorType::ValueError,
            description: format!("fitness {}", fitness),
            fitness,
            defeats_count: 0,
            tested_against: 0,
            generation,
            parent_hash: None,
        }
    }

    fn defense(code: &str, blocks: u32, tested: u32) -> DefenseGenome {
        DefenseGenome {
            code: code.to_string(),
            description: String::new(),
            fitness: if tested == 0 { 0.0 } else { f64::from(blocks) / f64::from(tested) },
            blocks_count: blocks,
            tested_against: tested,
            generation: 1,
            parent_hash: None,
        }
    }

    #[test]
    fn niche_capacity_evicts_only_on_strict_improvement() {
        let mut archive = MapElitesArchive::new(DEFAULT_MAX_PER_NICHE);

        assert!(archive.add(attack("a", 0.6, 1)));
        assert!(archive.add(attack("b", 0.7, 1)));
        assert!(archive.add(attack("c", 0.8, 1)));
        // Niche full; 0.5 does not beat the 0.6 minimum.
        assert!(!archive.add(attack("d", 0.5, 2)));

        let fitnesses: Vec<f64> = archive.get_all().iter().map(|g| g.fitness).collect();
        assert_eq!(fitnesses, vec![0.8, 0.7, 0.6]);
        assert_eq!(archive.len(), 3);
    }

    #[test]
    fn eviction_replaces_the_minimum() {
        let mut archive = MapElitesArchive::new(2);
        archive.add(attack("a", 0.5, 1));
        archive.add(attack("b", 0.9, 1));
        assert!(archive.add(attack("c", 0.7, 2)));

        let fitnesses: Vec<f64> = archive.get_all().iter().map(|g| g.fitness).collect();
        assert_eq!(fitnesses, vec![0.9, 0.7]);
    }

    #[test]
    fn eviction_tie_break_prefers_oldest_generation() {
        let mut archive = MapElitesArchive::new(2);
        archive.add(attack("old", 0.5, 1));
        archive.add(attack("new", 0.5, 3));
        assert!(archive.add(attack("better", 0.6, 4)));

        let survivors: Vec<String> =
            archive.get_all().iter().map(|g| g.code.clone()).collect();
        assert!(survivors.contains(&"better".to_string()));
        assert!(survivors.contains(&"new".to_string()));
        assert!(!survivors.contains(&"old".to_string()));
    }

    #[test]
    fn acceptance_is_idempotent() {
        let mut archive = MapElitesArchive::new(3);
        assert!(archive.add(attack("same", 0.8, 1)));
        assert!(!archive.add(attack("same", 0.8, 1)));
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.stats().total_evaluated, 2);
        assert_eq!(archive.stats().total_added, 1);
    }

    #[test]
    fn genomes_in_different_niches_do_not_compete() {
        let mut archive = MapElitesArchive::new(1);
        archive.add(attack("a", 0.8, 1));

        let mut other = attack("b", 0.3, 1);
        other.attack_type = AttackType::Overflow;
        assert!(archive.add(other));
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.niche_count(), 2);
    }

    #[test]
    fn every_genome_appears_exactly_once_in_get_all() {
        let mut archive = MapElitesArchive::new(3);
        for (i, attack_type) in AttackType::ALL.iter().take(4).enumerate() {
            let mut genome = attack(&format!("code {}", i), 0.6, 1);
            genome.attack_type = *attack_type;
            archive.add(genome);
        }

        let all = archive.get_all();
        assert_eq!(all.len(), 4);
        let mut hashes: Vec<String> = all.iter().map(|g| g.content_hash()).collect();
        hashes.sort();
        hashes.dedup();
        assert_eq!(hashes.len(), 4);
        assert!(archive.stats().total_added <= archive.stats().total_evaluated);
    }

    #[test]
    fn diverse_sample_round_robins_over_niches() {
        let mut archive = MapElitesArchive::new(3);
        for attack_type in [AttackType::EdgeCase, AttackType::Overflow, AttackType::Injection] {
            for fitness in [0.9, 0.7] {
                let mut genome = attack(&format!("{:?}-{}", attack_type, fitness), fitness, 1);
                genome.attack_type = attack_type;
                archive.add(genome);
            }
        }

        let sample = archive.get_diverse_sample(4);
        assert_eq!(sample.len(), 4);
        // First pass takes each niche's best before any second-best appears.
        assert!(sample[..3].iter().all(|g| g.fitness == 0.9));
        assert_eq!(sample[3].fitness, 0.7);
    }

    #[test]
    fn diverse_sample_returns_everything_when_small() {
        let mut archive = MapElitesArchive::new(3);
        archive.add(attack("only", 0.8, 1));
        assert_eq!(archive.get_diverse_sample(10).len(), 1);
    }

    #[test]
    fn cross_test_updates_keep_counters_consistent() {
        let mut archive = MapElitesArchive::new(3);
        let genome = attack("probe", 0.9, 1);
        let hash = genome.content_hash();
        archive.add(genome);

        archive.record_cross_test(&hash, true);
        archive.record_cross_test(&hash, false);

        let stored = &archive.get_all()[0];
        assert_eq!(stored.tested_against, 2);
        assert_eq!(stored.defeats_count, 1);
        assert!(stored.defeats_count <= stored.tested_against);
    }

    #[test]
    fn snapshot_round_trips() {
        let mut archive = MapElitesArchive::new(3);
        archive.add(attack("a", 0.9, 1));
        archive.add(attack("b", 0.4, 2));
        let mut other = attack("c", 0.6, 2);
        other.attack_type = AttackType::Boundary;
        archive.add(other);

        let restored =
            MapElitesArchive::from_snapshot(archive.snapshot(), DEFAULT_MAX_PER_NICHE);
        assert_eq!(restored.len(), archive.len());
        assert_eq!(restored.niche_count(), archive.niche_count());
        assert_eq!(restored.stats().total_evaluated, archive.stats().total_evaluated);
        assert_eq!(restored.history().len(), archive.history().len());
    }

    #[test]
    fn archive_save_load_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attack_archive.json");

        let mut archive = MapElitesArchive::new(3);
        archive.add(attack("persisted", 0.85, 3));
        archive.save(&path).unwrap();

        let restored = MapElitesArchive::load(&path, 3).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.get_all()[0].description, "fitness 0.85");
    }

    #[test]
    fn defense_archive_drops_lowest_robustness_when_full() {
        let mut archive = DefenseArchive::new(3);
        for (i, blocks) in [1u32, 4, 2, 3].iter().enumerate() {
            archive.add(defense(&format!("patch {}", i), *blocks, 4));
        }

        assert_eq!(archive.len(), 3);
        let survivors: Vec<u32> = archive.get_all().iter().map(|g| g.blocks_count).collect();
        // patch 0 (robustness 0.25) was pruned; insertion order kept.
        assert_eq!(survivors, vec![4, 2, 3]);
        assert_eq!(archive.history().len(), 4);
    }

    #[test]
    fn defense_archive_best_and_recent() {
        let mut archive = DefenseArchive::new(10);
        archive.add(defense("weak", 1, 4));
        archive.add(defense("strong", 4, 4));
        archive.add(defense("middle", 2, 4));

        assert_eq!(archive.get_best().unwrap().code, "strong");
        let recent: Vec<String> = archive.recent(2).iter().map(|g| g.code.clone()).collect();
        assert_eq!(recent, vec!["strong", "middle"]);
    }

    #[test]
    fn best_robustness_is_monotone_under_appends() {
        let mut archive = DefenseArchive::new(10);
        let mut best = 0.0;
        for blocks in [2u32, 1, 3, 2] {
            archive.add(defense(&format!("p{}", blocks), blocks, 4));
            let current = archive.get_best().unwrap().robustness();
            assert!(current >= best);
            best = current;
        }
    }
}
