//! Policy evaluation harness: referral policies, episode runs, and rankings.
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::env::{EnvSnapshot, ReferralEnv};
use crate::metrics::{DestinationCounts, concentration_hhi, normalized_entropy, record};
use crate::model::{ModelHandle, ModelLoader};
use crate::numbers::{count_to_f64, ratio};
use crate::scoring::overload_score;

/// Decision returned by a [`ReferralPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub action: usize,
    pub rationale: Option<String>,
    /// The policy could not decide itself and used the least-loaded rule.
    pub fallback: bool,
}

impl PolicyDecision {
    #[must_use]
    pub const fn new(action: usize, rationale: Option<String>) -> Self {
        Self {
            action,
            rationale,
            fallback: false,
        }
    }

    #[must_use]
    pub const fn fallback(action: usize, reason: String) -> Self {
        Self {
            action,
            rationale: Some(reason),
            fallback: true,
        }
    }
}

/// Policy interface for environment episodes.
pub trait ReferralPolicy {
    /// Name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Reset any internal randomness before an episode.
    fn reseed(&mut self, _seed: u64) {}

    /// Pick a destination index for the next patient.
    fn choose(&mut self, env: &ReferralEnv) -> PolicyDecision;
}

/// Built-in policies available to the harness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    Heuristic,
    Random,
    Learned,
    GreedyTravel,
}

impl PolicyKind {
    pub const ALL: [Self; 4] = [
        Self::Heuristic,
        Self::Random,
        Self::Learned,
        Self::GreedyTravel,
    ];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::Random => "random",
            Self::Learned => "learned",
            Self::GreedyTravel => "greedy-travel",
        }
    }

    /// Instantiate the policy. `loader` is only consulted for the learned one.
    #[must_use]
    pub fn create_policy(self, seed: u64, loader: &dyn ModelLoader) -> Box<dyn ReferralPolicy> {
        match self {
            Self::Heuristic => Box::new(LeastLoadedPolicy),
            Self::Random => Box::new(RandomPolicy::new(seed)),
            Self::Learned => Box::new(LearnedPolicy::new(loader.load())),
            Self::GreedyTravel => Box::new(GreedyTravelPolicy),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "heuristic" => Ok(Self::Heuristic),
            "random" => Ok(Self::Random),
            "learned" | "rl" => Ok(Self::Learned),
            "greedy-travel" | "greedy" => Ok(Self::GreedyTravel),
            other => Err(format!("unknown policy '{other}'")),
        }
    }
}

/// Least-loaded rule: skip full destinations while any has a bed.
#[must_use]
pub fn least_loaded_action(snapshot: &EnvSnapshot, overload_penalty: f64) -> usize {
    let has_capacity = snapshot.capacities.iter().any(|&cap| cap > 0);
    let mut best: Option<(usize, f64)> = None;
    for (idx, &cap) in snapshot.capacities.iter().enumerate() {
        if has_capacity && cap == 0 {
            continue;
        }
        let value = overload_score(
            snapshot.travel_times[idx],
            snapshot.waits[idx],
            cap,
            overload_penalty,
        );
        if best.is_none_or(|(_, current)| value < current) {
            best = Some((idx, value));
        }
    }
    best.map_or(0, |(idx, _)| idx)
}

struct LeastLoadedPolicy;

impl ReferralPolicy for LeastLoadedPolicy {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn choose(&mut self, env: &ReferralEnv) -> PolicyDecision {
        let snapshot = env.snapshot();
        let action = least_loaded_action(&snapshot, env.config().overload_penalty);
        let overloaded = snapshot.capacities.iter().all(|&cap| cap == 0);
        PolicyDecision::new(action, overloaded.then(|| "all destinations full".to_string()))
    }
}

struct RandomPolicy {
    rng: ChaCha20Rng,
}

impl RandomPolicy {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }
}

impl ReferralPolicy for RandomPolicy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha20Rng::seed_from_u64(seed);
    }

    fn choose(&mut self, env: &ReferralEnv) -> PolicyDecision {
        let snapshot = env.snapshot();
        let available: Vec<usize> = snapshot
            .capacities
            .iter()
            .enumerate()
            .filter(|(_, cap)| **cap > 0)
            .map(|(idx, _)| idx)
            .collect();
        let action = if available.is_empty() {
            self.rng.gen_range(0..env.action_count().max(1))
        } else {
            available[self.rng.gen_range(0..available.len())]
        };
        PolicyDecision::new(action, None)
    }
}

struct GreedyTravelPolicy;

impl ReferralPolicy for GreedyTravelPolicy {
    fn name(&self) -> &'static str {
        "greedy-travel"
    }

    fn choose(&mut self, env: &ReferralEnv) -> PolicyDecision {
        let snapshot = env.snapshot();
        let has_capacity = snapshot.capacities.iter().any(|&cap| cap > 0);
        let action = snapshot
            .travel_times
            .iter()
            .enumerate()
            .filter(|(idx, _)| !has_capacity || snapshot.capacities[*idx] > 0)
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map_or(0, |(idx, _)| idx);
        PolicyDecision::new(action, None)
    }
}

/// Wraps a loaded model; falls back to the least-loaded rule when the model
/// is missing or answers out of range.
struct LearnedPolicy {
    model: ModelHandle,
}

impl LearnedPolicy {
    const fn new(model: ModelHandle) -> Self {
        Self { model }
    }
}

impl ReferralPolicy for LearnedPolicy {
    fn name(&self) -> &'static str {
        "learned"
    }

    fn choose(&mut self, env: &ReferralEnv) -> PolicyDecision {
        match self.model.choose(&env.observation(), env.action_count()) {
            Ok(action) => PolicyDecision::new(action, None),
            Err(err) => {
                let action =
                    least_loaded_action(&env.snapshot(), env.config().overload_penalty);
                PolicyDecision::fallback(action, format!("fallback to heuristic: {err}"))
            }
        }
    }
}

/// Welford accumulator for per-episode values.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningStats {
    count: u32,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn add(&mut self, value: f64) {
        self.count += 1;
        let count = f64::from(self.count);
        let delta = value - self.mean;
        self.mean += delta / count;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    #[must_use]
    pub const fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.mean }
    }

    #[must_use]
    pub fn std_dev(&self) -> f64 {
        if self.count > 1 {
            (self.m2 / f64::from(self.count - 1)).sqrt()
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyMetrics {
    pub policy: String,
    pub episodes: usize,
    pub avg_reward_per_episode: f64,
    pub reward_std_dev: f64,
    pub avg_overloads_per_episode: f64,
    /// Per decision.
    pub avg_travel: f64,
    /// Per decision.
    pub avg_wait: f64,
    pub overload_rate: f64,
    /// Decisions the policy could not make itself.
    pub fallback_decisions: usize,
    /// Decisions the environment rejected; each ends its episode early.
    pub failed_decisions: usize,
    /// Over attempted decisions, failed ones included.
    pub fallback_rate: f64,
    /// Over attempted decisions.
    pub failure_rate: f64,
    pub destinations: DestinationCounts,
    pub entropy_norm: f64,
    pub hhi: f64,
}

/// Run `episodes` full episodes of `policy`, reseeding it with
/// `seed_base + e` before episode `e`.
///
/// A decision the environment rejects is tallied as a failure and ends
/// that episode; the remaining episodes still run.
pub fn evaluate(
    policy: &mut dyn ReferralPolicy,
    env: &mut ReferralEnv,
    episodes: usize,
    seed_base: u64,
) -> PolicyMetrics {
    let mut rewards = RunningStats::default();
    let mut destinations = DestinationCounts::new();
    let mut decisions = 0_usize;
    let mut overloads = 0_usize;
    let mut fallbacks = 0_usize;
    let mut failures = 0_usize;
    let mut travel = 0.0;
    let mut wait = 0.0;

    for episode in 0..episodes {
        env.reset();
        policy.reseed(seed_base.wrapping_add(episode as u64));
        let mut episode_reward = 0.0;
        while !env.is_terminated() {
            let decision = policy.choose(env);
            if decision.fallback {
                fallbacks += 1;
            }
            let outcome = match env.step(decision.action) {
                Ok(outcome) => outcome,
                Err(err) => {
                    failures += 1;
                    log::warn!(
                        "{} episode {episode} step {}: {err}",
                        policy.name(),
                        env.current_step()
                    );
                    break;
                }
            };
            episode_reward += outcome.reward;
            decisions += 1;
            travel += outcome.travel_minutes;
            wait += outcome.wait_minutes;
            if outcome.overload {
                overloads += 1;
            }
            record(&mut destinations, &outcome.destination_id);
        }
        rewards.add(episode_reward);
    }

    let attempts = decisions + failures;
    let per_episode = episodes.max(1);
    let metrics = PolicyMetrics {
        policy: policy.name().to_string(),
        episodes,
        avg_reward_per_episode: rewards.mean(),
        reward_std_dev: rewards.std_dev(),
        avg_overloads_per_episode: ratio(count_to_f64(overloads), per_episode),
        avg_travel: ratio(travel, decisions),
        avg_wait: ratio(wait, decisions),
        overload_rate: ratio(count_to_f64(overloads), decisions),
        fallback_decisions: fallbacks,
        failed_decisions: failures,
        fallback_rate: ratio(count_to_f64(fallbacks), attempts),
        failure_rate: ratio(count_to_f64(failures), attempts),
        entropy_norm: normalized_entropy(&destinations),
        hhi: concentration_hhi(&destinations),
        destinations,
    };
    log::info!(
        "{}: reward {:.3}/episode, overload rate {:.3}, failure rate {:.3}",
        metrics.policy,
        metrics.avg_reward_per_episode,
        metrics.overload_rate,
        metrics.failure_rate
    );
    metrics
}

/// Sort by highest reward, then fewest overloads, then lowest concentration.
#[must_use]
pub fn rank_by_reward(metrics: &[PolicyMetrics]) -> Vec<PolicyMetrics> {
    let mut ranked = metrics.to_vec();
    ranked.sort_by(|a, b| {
        b.avg_reward_per_episode
            .total_cmp(&a.avg_reward_per_episode)
            .then_with(|| {
                a.avg_overloads_per_episode
                    .total_cmp(&b.avg_overloads_per_episode)
            })
            .then_with(|| a.hhi.total_cmp(&b.hhi))
    });
    ranked
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeWeights {
    #[serde(default = "CompositeWeights::default_reward")]
    pub reward: f64,
    #[serde(default = "CompositeWeights::default_travel")]
    pub travel: f64,
    #[serde(default = "CompositeWeights::default_wait")]
    pub wait: f64,
    #[serde(default = "CompositeWeights::default_hhi")]
    pub hhi: f64,
    #[serde(default = "CompositeWeights::default_entropy_gap")]
    pub entropy_gap: f64,
    #[serde(default = "CompositeWeights::default_overloads")]
    pub overloads: f64,
}

impl CompositeWeights {
    const fn default_reward() -> f64 {
        1.0
    }

    const fn default_travel() -> f64 {
        0.6
    }

    const fn default_wait() -> f64 {
        0.8
    }

    const fn default_hhi() -> f64 {
        0.4
    }

    const fn default_entropy_gap() -> f64 {
        0.2
    }

    const fn default_overloads() -> f64 {
        0.4
    }
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            reward: Self::default_reward(),
            travel: Self::default_travel(),
            wait: Self::default_wait(),
            hhi: Self::default_hhi(),
            entropy_gap: Self::default_entropy_gap(),
            overloads: Self::default_overloads(),
        }
    }
}

/// Per-metric normalized values in `[0, 1]`, 0 being best.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedMetrics {
    pub reward: f64,
    pub travel: f64,
    pub wait: f64,
    pub hhi: f64,
    pub entropy_gap: f64,
    pub overloads: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub policy: String,
    pub composite: f64,
    pub normalized: NormalizedMetrics,
}

fn column(metrics: &[PolicyMetrics], value: impl Fn(&PolicyMetrics) -> f64) -> Vec<f64> {
    metrics.iter().map(value).collect()
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// `(v - min) / (max - min)`, or `(max - v) / (max - min)` when higher is
/// better. All-equal columns normalize to 0.
fn normalize(values: &[f64], higher_is_better: bool) -> Vec<f64> {
    let (lo, hi) = min_max(values);
    let span = hi - lo;
    values
        .iter()
        .map(|&v| {
            if span.abs() < f64::EPSILON {
                0.0
            } else if higher_is_better {
                (hi - v) / span
            } else {
                (v - lo) / span
            }
        })
        .collect()
}

/// Weighted sum of normalized metrics; lowest composite first.
#[must_use]
pub fn composite_rank(
    metrics: &[PolicyMetrics],
    weights: &CompositeWeights,
) -> Vec<CompositeScore> {
    let reward = normalize(&column(metrics, |m| m.avg_reward_per_episode), true);
    let travel = normalize(&column(metrics, |m| m.avg_travel), false);
    let wait = normalize(&column(metrics, |m| m.avg_wait), false);
    let hhi = normalize(&column(metrics, |m| m.hhi), false);
    let entropy_gap = normalize(&column(metrics, |m| 1.0 - m.entropy_norm), false);
    let overloads = normalize(&column(metrics, |m| m.overload_rate), false);

    let mut scores: Vec<CompositeScore> = metrics
        .iter()
        .enumerate()
        .map(|(idx, m)| {
            let normalized = NormalizedMetrics {
                reward: reward[idx],
                travel: travel[idx],
                wait: wait[idx],
                hhi: hhi[idx],
                entropy_gap: entropy_gap[idx],
                overloads: overloads[idx],
            };
            let composite = weights.reward * normalized.reward
                + weights.travel * normalized.travel
                + weights.wait * normalized.wait
                + weights.hhi * normalized.hhi
                + weights.entropy_gap * normalized.entropy_gap
                + weights.overloads * normalized.overloads;
            CompositeScore {
                policy: m.policy.clone(),
                composite,
                normalized,
            }
        })
        .collect();
    scores.sort_by(|a, b| a.composite.total_cmp(&b.composite));
    scores
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub source_id: String,
    pub speciality: String,
    pub destination_ids: Vec<String>,
    pub episodes: usize,
    pub seed_base: u64,
    pub weights: CompositeWeights,
    pub policies: Vec<PolicyMetrics>,
    pub reward_ranking: Vec<String>,
    pub composite_ranking: Vec<CompositeScore>,
}

/// Evaluate every policy in `kinds` on `env` and rank them.
#[must_use]
pub fn benchmark(
    kinds: &[PolicyKind],
    env: &mut ReferralEnv,
    episodes: usize,
    seed_base: u64,
    loader: &dyn ModelLoader,
    weights: CompositeWeights,
) -> BenchmarkReport {
    let mut policies = Vec::with_capacity(kinds.len());
    for kind in kinds {
        let mut policy = kind.create_policy(seed_base, loader);
        policies.push(evaluate(policy.as_mut(), env, episodes, seed_base));
    }
    let reward_ranking = rank_by_reward(&policies)
        .into_iter()
        .map(|m| m.policy)
        .collect();
    let composite_ranking = composite_rank(&policies, &weights);
    BenchmarkReport {
        source_id: env.config().source_id.clone(),
        speciality: env.config().speciality.clone(),
        destination_ids: env.destination_ids(),
        episodes,
        seed_base,
        weights,
        policies,
        reward_ranking,
        composite_ranking,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::demo_network;
    use crate::env::EnvConfig;
    use crate::graph::RoutingGraph;
    use crate::model::NoModel;

    fn demo_env() -> ReferralEnv {
        let graph = RoutingGraph::from_snapshot(&demo_network()).unwrap();
        ReferralEnv::new(&graph, EnvConfig::new("C_LOCAL_A", "maternal")).unwrap()
    }

    fn metrics(policy: &str, reward: f64, travel: f64, hhi: f64, overloads: f64) -> PolicyMetrics {
        PolicyMetrics {
            policy: policy.to_string(),
            episodes: 1,
            avg_reward_per_episode: reward,
            reward_std_dev: 0.0,
            avg_overloads_per_episode: overloads,
            avg_travel: travel,
            avg_wait: 10.0,
            overload_rate: overloads / 80.0,
            fallback_decisions: 0,
            failed_decisions: 0,
            fallback_rate: 0.0,
            failure_rate: 0.0,
            destinations: DestinationCounts::new(),
            entropy_norm: 1.0 - hhi,
            hhi,
        }
    }

    #[test]
    fn least_loaded_skips_full_destinations() {
        let snapshot = EnvSnapshot {
            capacities: vec![0, 1],
            waits: vec![0.0, 100.0],
            travel_times: vec![1.0, 100.0],
        };
        assert_eq!(least_loaded_action(&snapshot, 30.0), 1);
        let full = EnvSnapshot {
            capacities: vec![0, 0],
            waits: vec![50.0, 0.0],
            travel_times: vec![10.0, 10.0],
        };
        assert_eq!(least_loaded_action(&full, 30.0), 1);
    }

    #[test]
    fn heuristic_episode_counts_every_decision() {
        let mut env = demo_env();
        let mut policy = PolicyKind::Heuristic.create_policy(0, &NoModel);
        let result = evaluate(policy.as_mut(), &mut env, 3, 11);
        assert_eq!(result.episodes, 3);
        let decisions: usize = result.destinations.values().sum();
        assert_eq!(decisions, 240);
        assert!(result.avg_reward_per_episode < 0.0);
        assert!(result.overload_rate >= 0.0 && result.overload_rate <= 1.0);
        assert!(result.reward_std_dev.abs() < 1e-9);
    }

    #[test]
    fn random_policy_is_reproducible() {
        let mut env = demo_env();
        let mut first = PolicyKind::Random.create_policy(5, &NoModel);
        let mut second = PolicyKind::Random.create_policy(99, &NoModel);
        let a = evaluate(first.as_mut(), &mut env, 4, 100);
        let b = evaluate(second.as_mut(), &mut env, 4, 100);
        assert_eq!(a, b);
    }

    #[test]
    fn learned_without_model_falls_back() {
        let mut env = demo_env();
        let mut policy = PolicyKind::Learned.create_policy(0, &NoModel);
        let result = evaluate(policy.as_mut(), &mut env, 1, 0);
        assert_eq!(result.fallback_decisions, 80);
        assert!((result.fallback_rate - 1.0).abs() < 1e-12);
        assert_eq!(result.failed_decisions, 0);
        let mut heuristic = PolicyKind::Heuristic.create_policy(0, &NoModel);
        let baseline = evaluate(heuristic.as_mut(), &mut env, 1, 0);
        assert_eq!(result.destinations, baseline.destinations);
    }

    /// Sends everyone to the first destination, flags every tenth choice as
    /// a fallback, and answers out of range on choice `bad_at`.
    struct Scripted {
        choices: usize,
        bad_at: usize,
    }

    impl ReferralPolicy for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn choose(&mut self, _env: &ReferralEnv) -> PolicyDecision {
            self.choices += 1;
            if self.choices == self.bad_at {
                PolicyDecision::new(99, None)
            } else if self.choices % 10 == 0 {
                PolicyDecision::fallback(0, "scripted".to_string())
            } else {
                PolicyDecision::new(0, None)
            }
        }
    }

    #[test]
    fn rejected_step_is_counted_and_run_continues() {
        let mut env = demo_env();
        let mut policy = Scripted {
            choices: 0,
            bad_at: 150,
        };
        let result = evaluate(&mut policy, &mut env, 3, 0);
        assert_eq!(result.episodes, 3);
        // episode two stops at its 70th choice; one and three run all 80
        let placed: usize = result.destinations.values().sum();
        assert_eq!(placed, 229);
        assert_eq!(result.failed_decisions, 1);
        assert_eq!(result.fallback_decisions, 22);
        assert!((result.failure_rate - 1.0 / 230.0).abs() < 1e-12);
        assert!((result.fallback_rate - 22.0 / 230.0).abs() < 1e-12);
        assert!(result.avg_travel > 0.0);
    }

    #[test]
    fn greedy_travel_sticks_to_nearest_with_beds() {
        let mut env = demo_env();
        let mut policy = PolicyKind::GreedyTravel.create_policy(0, &NoModel);
        let first = policy.choose(&env);
        assert_eq!(first.action, 0);
        for _ in 0..4 {
            let decision = policy.choose(&env);
            env.step(decision.action).unwrap();
        }
        // district is full until the first recovery
        assert_eq!(policy.choose(&env).action, 1);
    }

    #[test]
    fn reward_ranking_breaks_ties_on_overloads_then_hhi() {
        let ranked = rank_by_reward(&[
            metrics("a", -10.0, 20.0, 0.5, 2.0),
            metrics("b", -5.0, 20.0, 0.5, 4.0),
            metrics("c", -10.0, 20.0, 0.4, 2.0),
            metrics("d", -10.0, 20.0, 0.4, 1.0),
        ]);
        let order: Vec<&str> = ranked.iter().map(|m| m.policy.as_str()).collect();
        assert_eq!(order, ["b", "d", "c", "a"]);
    }

    #[test]
    fn composite_prefers_dominant_policy() {
        let ranked = composite_rank(
            &[
                metrics("worse", -20.0, 40.0, 0.9, 5.0),
                metrics("better", -10.0, 20.0, 0.3, 1.0),
            ],
            &CompositeWeights::default(),
        );
        assert_eq!(ranked[0].policy, "better");
        assert!(ranked[0].composite.abs() < 1e-12);
        assert_eq!(ranked[0].normalized, NormalizedMetrics::default());
        assert!((ranked[1].normalized.reward - 1.0).abs() < 1e-12);
    }

    #[test]
    fn composite_all_equal_is_zero() {
        let ranked = composite_rank(
            &[metrics("a", -1.0, 1.0, 0.5, 0.0), metrics("b", -1.0, 1.0, 0.5, 0.0)],
            &CompositeWeights::default(),
        );
        assert!(ranked.iter().all(|s| s.composite.abs() < f64::EPSILON));
        assert_eq!(ranked[0].policy, "a");
    }

    #[test]
    fn benchmark_runs_all_policies() {
        let mut env = demo_env();
        let report = benchmark(
            &PolicyKind::ALL,
            &mut env,
            2,
            42,
            &NoModel,
            CompositeWeights::default(),
        );
        assert_eq!(report.policies.len(), 4);
        assert_eq!(report.reward_ranking.len(), 4);
        assert_eq!(report.composite_ranking.len(), 4);
        assert_eq!(report.destination_ids, vec!["H_DISTRICT_1", "H_REGIONAL_1"]);
    }

    #[test]
    fn parses_policy_kinds() {
        assert_eq!("greedy_travel".parse(), Ok(PolicyKind::GreedyTravel));
        assert_eq!("RL".parse(), Ok(PolicyKind::Learned));
        assert!("ppo".parse::<PolicyKind>().is_err());
    }
}
