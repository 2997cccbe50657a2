//! Bandit selection over a cluster's skills
//!
//! Each skill is an arm scored by an upper-confidence bound; one extra
//! Explore arm stands for trying something new. Scores become a
//! distribution through a softmax whose temperature cools as evidence
//! accumulates, and one arm is sampled from it.

use crate::core::config::BrainConfig;
use crate::core::error::Result;
use crate::core::types::{ClusterId, NodeId, Screen, SkillId};
use crate::judge::Judge;
use crate::memory::records::{Skill, SkillCluster};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

/// Lowest temperature the cooling schedule reaches
pub const MIN_TEMPERATURE: f64 = 0.1;
/// Hard floor applied before dividing by the temperature
pub const TEMPERATURE_FLOOR: f64 = 0.01;
/// Smallest exponential kept in the softmax
pub const EXP_FLOOR: f64 = 1e-10;
/// Explore probability above which a sampled Explore suspends the cluster
pub const SUSPEND_PROBABILITY: f64 = 0.9;

/// Cooling schedule: `max(0.1, exp(-0.1 * total_trials))`
pub fn temperature(total_trials: f64) -> f64 {
    (-0.1 * total_trials).exp().max(MIN_TEMPERATURE)
}

/// Upper-confidence score of one skill
pub fn skill_score(fitness: i64, trials: u32, total_trials: f64, c: f64) -> f64 {
    fitness as f64 + c * (total_trials.ln() / trials.max(1) as f64).sqrt()
}

/// Score of the Explore arm
pub fn explore_score(uct_threshold: f64, explore_count: u32, total_trials: f64, c: f64) -> f64 {
    uct_threshold + c * (total_trials.ln() / explore_count.max(1) as f64).sqrt()
}

/// Numerically stable temperature-scaled softmax
pub fn softmax(scores: &[f64], temperature: f64) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let t = temperature.max(TEMPERATURE_FLOOR);
    let scaled: Vec<f64> = scores.iter().map(|s| s / t).collect();
    let max = scaled.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scaled
        .iter()
        .map(|s| (s - max).exp().max(EXP_FLOOR))
        .collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

/// Index drawn from `probabilities`
pub fn sample_arm<R: Rng + ?Sized>(probabilities: &[f64], rng: &mut R) -> usize {
    let r: f64 = rng.gen();
    let mut cumulative = 0.0;
    for (i, p) in probabilities.iter().enumerate() {
        cumulative += p;
        if r < cumulative {
            return i;
        }
    }
    // rounding can leave the cumulative sum just short of 1
    probabilities.len().saturating_sub(1)
}

/// What to do with the selected cluster
#[derive(Debug, Clone, PartialEq)]
pub enum Choice {
    /// Grow the search tree, starting from `origin` when known
    Explore { origin: Option<NodeId> },
    Skill(Skill),
}

impl Choice {
    pub fn is_explore(&self) -> bool {
        matches!(self, Choice::Explore { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub choice: Choice,
    /// Suspend the cluster if this attempt fails
    pub suspend: bool,
    /// Distribution the choice was sampled from; empty when no sampling happened
    pub probabilities: Vec<f64>,
}

pub struct SelectionPolicy {
    pub uct_c: f64,
    pub uct_threshold: f64,
    /// Never offer the Explore arm
    pub close_explore: bool,
    rng: ChaCha8Rng,
}

impl SelectionPolicy {
    pub fn new(uct_c: f64, uct_threshold: f64, close_explore: bool, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            uct_c,
            uct_threshold,
            close_explore,
            rng,
        }
    }

    pub fn from_config(brain: &BrainConfig, close_explore: bool, seed: Option<u64>) -> Self {
        Self::new(brain.uct_c, brain.uct_threshold, close_explore, seed)
    }

    /// Let the judge pick a cluster for the current screen
    pub fn select_cluster<J: Judge + ?Sized>(
        &self,
        judge: &mut J,
        task: &str,
        clusters: &[SkillCluster],
        screen: &Screen,
    ) -> Result<Option<ClusterId>> {
        if clusters.is_empty() {
            return Ok(None);
        }
        judge.select_cluster(task, clusters, screen)
    }

    /// Choose between the cluster's unsuspended skills and exploring
    pub fn select_skill(
        &mut self,
        skills: &[Skill],
        cluster: &SkillCluster,
        suspended: &[SkillId],
    ) -> Selection {
        if skills.is_empty() {
            return Selection {
                choice: Choice::Explore { origin: None },
                suspend: false,
                probabilities: Vec::new(),
            };
        }

        // exploration resumes from the branch of the fittest skill
        let mut best: Option<&Skill> = None;
        for skill in skills {
            if best.map(|b| skill.fitness > b.fitness).unwrap_or(true) {
                best = Some(skill);
            }
        }
        let origin = best.and_then(|s| s.node_id);

        let candidates: Vec<&Skill> = skills
            .iter()
            .filter(|s| !suspended.contains(&s.id))
            .collect();
        if candidates.is_empty() {
            return Selection {
                choice: Choice::Explore { origin },
                suspend: true,
                probabilities: Vec::new(),
            };
        }

        let total_trials = candidates.iter().map(|s| s.trials as f64).sum::<f64>()
            + cluster.explore_count as f64;
        let mut scores: Vec<f64> = candidates
            .iter()
            .map(|s| skill_score(s.fitness, s.trials, total_trials, self.uct_c))
            .collect();
        if !self.close_explore {
            scores.push(explore_score(
                self.uct_threshold,
                cluster.explore_count,
                total_trials,
                self.uct_c,
            ));
        }

        let temp = temperature(total_trials);
        let probabilities = softmax(&scores, temp);
        let arm = sample_arm(&probabilities, &mut self.rng);
        debug!(
            cluster_id = %cluster.id,
            temperature = temp,
            ?scores,
            ?probabilities,
            arm,
            "sampled arm"
        );

        let (choice, suspend) = match candidates.get(arm) {
            Some(skill) => (Choice::Skill((*skill).clone()), false),
            None => (
                Choice::Explore { origin },
                probabilities[arm] > SUSPEND_PROBABILITY,
            ),
        };
        Selection {
            choice,
            suspend,
            probabilities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Fingerprint, StateId};

    fn skill(id: i64, fitness: i64, trials: u32, node: u32) -> Skill {
        Skill {
            id: SkillId(id),
            name: format!("skill {}", id),
            description: String::new(),
            operations: Vec::new(),
            fitness,
            trials,
            state_id: StateId(1),
            node_id: Some(NodeId(node)),
        }
    }

    fn cluster(explore_count: u32) -> SkillCluster {
        SkillCluster {
            id: ClusterId(1),
            name: "c".into(),
            description: String::new(),
            members: Vec::new(),
            explore_count,
            fingerprint: Fingerprint::default(),
        }
    }

    #[test]
    fn test_temperature_schedule() {
        assert!((temperature(0.0) - 1.0).abs() < 1e-12);
        assert!((temperature(10.0) - (-1.0f64).exp()).abs() < 1e-12);
        assert_eq!(temperature(1000.0), MIN_TEMPERATURE);
    }

    #[test]
    fn test_softmax_prefers_higher_scores() {
        let p = softmax(&[1.0, 2.0, 3.0], 1.0);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(p[2] > p[1] && p[1] > p[0]);
        // cold temperature floors the losers at the exponential floor
        let cold = softmax(&[0.0, 100.0], 0.0);
        assert!(cold[1] > 0.999_999);
        assert!(cold[0] > 0.0);
    }

    #[test]
    fn test_empty_skills_explore_without_suspend() {
        let mut policy = SelectionPolicy::new(1.0, 2.0, false, Some(1));
        let selection = policy.select_skill(&[], &cluster(1), &[]);
        assert_eq!(selection.choice, Choice::Explore { origin: None });
        assert!(!selection.suspend);
    }

    #[test]
    fn test_all_suspended_explores_from_best_branch() {
        let mut policy = SelectionPolicy::new(1.0, 2.0, false, Some(1));
        let skills = vec![skill(1, 1, 2, 4), skill(2, 5, 2, 7), skill(3, 5, 2, 9)];
        let selection = policy.select_skill(&skills, &cluster(1), &[SkillId(1), SkillId(2), SkillId(3)]);
        assert_eq!(
            selection.choice,
            Choice::Explore {
                origin: Some(NodeId(7))
            }
        );
        assert!(selection.suspend);
    }

    #[test]
    fn test_close_explore_only_samples_skills() {
        let mut policy = SelectionPolicy::new(1.0, 100.0, true, Some(3));
        let skills = vec![skill(1, 0, 1, 1), skill(2, 0, 1, 2)];
        for _ in 0..20 {
            let selection = policy.select_skill(&skills, &cluster(1), &[]);
            assert_eq!(selection.probabilities.len(), 2);
            assert!(!selection.choice.is_explore());
            assert!(!selection.suspend);
        }
    }

    #[test]
    fn test_dominant_explore_arm_sets_suspend() {
        // a huge threshold makes Explore nearly certain
        let mut policy = SelectionPolicy::new(1.0, 50.0, false, Some(5));
        let skills = vec![skill(1, 0, 1, 1)];
        let selection = policy.select_skill(&skills, &cluster(1), &[]);
        assert!(selection.choice.is_explore());
        assert!(selection.suspend);
        assert!(selection.probabilities[1] > SUSPEND_PROBABILITY);
    }

    #[test]
    fn test_strong_skill_is_exploited() {
        let mut policy = SelectionPolicy::new(1.0, 2.0, false, Some(9));
        let skills = vec![skill(1, 40, 30, 3), skill(2, 0, 30, 4)];
        let selection = policy.select_skill(&skills, &cluster(30), &[]);
        match selection.choice {
            Choice::Skill(s) => assert_eq!(s.id, SkillId(1)),
            other => panic!("expected a skill, got {:?}", other),
        }
    }

    #[test]
    fn test_sample_arm_falls_back_to_last() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert_eq!(sample_arm(&[0.0, 0.0], &mut rng), 1);
        assert_eq!(sample_arm(&[1.0, 0.0], &mut rng), 0);
    }
}
