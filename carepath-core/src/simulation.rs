//! Batch referral simulation over a private, mutable copy of the network.
//!
//! Each step dispatches one patient, applies the referral load to the chosen
//! facility, then runs periodic recovery and random shocks. Failed steps are
//! tallied and never abort the run.
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::facility::{Facility, NetworkSnapshot, SnapshotError};
use crate::graph::RoutingGraph;
use crate::metrics::{DestinationCounts, concentration_hhi, normalized_entropy, record};
use crate::model::ModelHandle;
use crate::numbers::{count_to_f64, ratio};
use crate::recommender::{Recommender, RoutingPolicy, reachable_candidates};
use crate::scoring::{Candidate, Severity, overload_score};

/// Invalid configuration values. Always raised before the first step.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
    #[error("{field} must be a finite, non-negative number (got {value})")]
    Negative { field: &'static str, value: f64 },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
}

pub(crate) fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

pub(crate) fn non_empty(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Empty { field })
    } else {
        Ok(())
    }
}

/// Failure to start a simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("invalid simulation config: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid network snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// What to do when the dispatcher finds no destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    #[default]
    None,
    /// Relax the capacity filter and take the least loaded reachable facility.
    ForceLeastLoaded,
}

impl FallbackPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ForceLeastLoaded => "force_least_loaded",
        }
    }
}

impl fmt::Display for FallbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FallbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Ok(Self::None),
            "force_least_loaded" => Ok(Self::ForceLeastLoaded),
            other => Err(format!("unknown fallback policy '{other}'")),
        }
    }
}

/// Periodic random disruption of one facility.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShockConfig {
    /// Shock every N patients; 0 disables shocks.
    #[serde(default)]
    pub shock_every: u32,
    #[serde(default)]
    pub shock_wait_add: f64,
    #[serde(default)]
    pub shock_capacity_drop: u32,
    #[serde(default = "SimulationConfig::default_random_seed")]
    pub random_seed: u64,
}

impl Default for ShockConfig {
    fn default() -> Self {
        Self {
            shock_every: 0,
            shock_wait_add: 0.0,
            shock_capacity_drop: 0,
            random_seed: SimulationConfig::default_random_seed(),
        }
    }
}

impl ShockConfig {
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.shock_every > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "SimulationConfig::default_patients")]
    pub patients: usize,
    pub source_id: String,
    pub speciality: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub policy: RoutingPolicy,
    #[serde(default = "SimulationConfig::default_wait_increment")]
    pub wait_increment: f64,
    /// Recover every N patients; 0 disables recovery.
    #[serde(default = "SimulationConfig::default_recovery_interval")]
    pub recovery_interval: u32,
    #[serde(default = "SimulationConfig::default_recovery_amount")]
    pub recovery_amount: u32,
    #[serde(default)]
    pub fallback_policy: FallbackPolicy,
    #[serde(default = "SimulationConfig::default_overload_penalty")]
    pub overload_penalty: f64,
    #[serde(flatten)]
    pub shock: ShockConfig,
}

impl SimulationConfig {
    const fn default_patients() -> usize {
        80
    }

    const fn default_wait_increment() -> f64 {
        3.0
    }

    const fn default_recovery_interval() -> u32 {
        5
    }

    const fn default_recovery_amount() -> u32 {
        2
    }

    const fn default_overload_penalty() -> f64 {
        30.0
    }

    const fn default_random_seed() -> u64 {
        42
    }

    #[must_use]
    pub fn new(source_id: &str, speciality: &str) -> Self {
        Self {
            patients: Self::default_patients(),
            source_id: source_id.to_string(),
            speciality: speciality.to_string(),
            severity: Severity::default(),
            policy: RoutingPolicy::default(),
            wait_increment: Self::default_wait_increment(),
            recovery_interval: Self::default_recovery_interval(),
            recovery_amount: Self::default_recovery_amount(),
            fallback_policy: FallbackPolicy::default(),
            overload_penalty: Self::default_overload_penalty(),
            shock: ShockConfig::default(),
        }
    }

    /// Validate the configuration before any step runs.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.patients == 0 {
            return Err(ConfigError::NotPositive { field: "patients" });
        }
        non_empty("source_id", &self.source_id)?;
        non_empty("speciality", &self.speciality)?;
        non_negative("wait_increment", self.wait_increment)?;
        non_negative("overload_penalty", self.overload_penalty)?;
        non_negative("shock_wait_add", self.shock.shock_wait_add)?;
        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::new("C_LOCAL_A", "maternal")
    }
}

/// Network state as seen before the first referral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preflight {
    pub facilities_total: usize,
    pub source_exists: bool,
    /// Facilities serving the speciality with a free bed, source included.
    pub eligible_destinations: usize,
}

impl Preflight {
    #[must_use]
    pub fn inspect(graph: &RoutingGraph, source_id: &str, speciality: &str) -> Self {
        Self {
            facilities_total: graph.len(),
            source_exists: graph.contains(source_id),
            eligible_destinations: graph.candidate_destinations(speciality).len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub patients_total: usize,
    pub patients_success: usize,
    pub patients_failed: usize,
    pub fallbacks_used: usize,
    /// Referrals sent to a facility with no free bed.
    pub overloads: usize,
    pub failure_rate: f64,
    pub avg_travel_minutes: f64,
    pub avg_wait_minutes: f64,
    pub avg_score: f64,
    pub destination_counts: DestinationCounts,
    pub fallback_destination_counts: DestinationCounts,
    pub failure_reasons: BTreeMap<String, usize>,
    pub concentration_hhi: f64,
    pub balance_entropy: f64,
    pub shock_config: ShockConfig,
    pub fallback_policy: FallbackPolicy,
    pub preflight: Preflight,
    /// Hex xxHash64 of the snapshot the run started from.
    pub snapshot_fingerprint: String,
}

/// One referral applied to the network.
#[derive(Debug, Clone, PartialEq)]
struct Placement {
    destination_id: String,
    travel_minutes: f64,
    wait_minutes: f64,
    score: f64,
    overloaded: bool,
    fallback: bool,
}

#[derive(Debug, Default)]
struct Tally {
    failures: usize,
    fallbacks: usize,
    overloads: usize,
    travel: f64,
    wait: f64,
    score: f64,
    destinations: DestinationCounts,
    fallback_destinations: DestinationCounts,
    failure_reasons: BTreeMap<String, usize>,
}

impl Tally {
    fn placed(&mut self, placement: &Placement) {
        record(&mut self.destinations, &placement.destination_id);
        if placement.fallback {
            self.fallbacks += 1;
            record(&mut self.fallback_destinations, &placement.destination_id);
        }
        if placement.overloaded {
            self.overloads += 1;
        }
        self.travel += placement.travel_minutes;
        self.wait += placement.wait_minutes;
        self.score += placement.score;
    }

    fn failed(&mut self, reason: String) {
        self.failures += 1;
        *self.failure_reasons.entry(reason).or_insert(0) += 1;
    }
}

/// Stateful simulator owning a recommender and its private graph copy.
#[derive(Debug)]
pub struct Simulator {
    recommender: Recommender,
    config: SimulationConfig,
    rng: ChaCha20Rng,
    preflight: Preflight,
    fingerprint: u64,
}

impl Simulator {
    /// Build a simulator from a caller-supplied snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the config or the snapshot is invalid.
    pub fn new(
        snapshot: &NetworkSnapshot,
        model: ModelHandle,
        config: SimulationConfig,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let graph = RoutingGraph::from_snapshot(snapshot)?;
        let preflight = Preflight::inspect(&graph, &config.source_id, &config.speciality);
        Ok(Self {
            recommender: Recommender::new(graph, model),
            rng: ChaCha20Rng::seed_from_u64(config.shock.random_seed),
            config,
            preflight,
            fingerprint: snapshot.fingerprint(),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    #[must_use]
    pub const fn preflight(&self) -> &Preflight {
        &self.preflight
    }

    /// Facility states after the steps run so far.
    #[must_use]
    pub fn facilities(&self) -> &[Facility] {
        self.recommender.graph().facilities()
    }

    /// Current network state, for callers that persist deltas.
    #[must_use]
    pub fn snapshot(&self) -> NetworkSnapshot {
        self.recommender.graph().to_snapshot()
    }

    /// Run every configured patient and report the outcome.
    pub fn run(&mut self) -> SimulationReport {
        log::info!(
            "simulating {} patients from {} ({}, severity {}, policy {})",
            self.config.patients,
            self.config.source_id,
            self.config.speciality,
            self.config.severity,
            self.config.policy
        );
        let mut tally = Tally::default();
        for step in 1..=self.config.patients {
            match self.dispatch(step) {
                Ok(placement) => {
                    self.apply_referral(&placement.destination_id);
                    tally.placed(&placement);
                }
                Err(reason) => {
                    log::debug!("patient {step} not placed: {reason}");
                    tally.failed(reason);
                }
            }
            self.tick(step);
        }
        self.report(tally)
    }

    fn dispatch(&self, step: usize) -> Result<Placement, String> {
        let config = &self.config;
        match self.recommender.select(
            &config.source_id,
            &config.speciality,
            config.severity,
            config.policy,
        ) {
            Ok(selection) => {
                let candidate = selection.candidate;
                Ok(Placement {
                    score: candidate.score(),
                    overloaded: candidate.capacity_available == 0,
                    destination_id: candidate.facility_id,
                    travel_minutes: candidate.travel_minutes,
                    wait_minutes: candidate.wait_minutes,
                    fallback: false,
                })
            }
            Err(err) => {
                if config.fallback_policy == FallbackPolicy::ForceLeastLoaded
                    && let Some(placement) = self.least_loaded()
                {
                    log::debug!(
                        "patient {step} forced to {} after: {err}",
                        placement.destination_id
                    );
                    return Ok(placement);
                }
                Err(err.to_string())
            }
        }
    }

    /// Relaxed search: speciality match and reachability only.
    fn least_loaded(&self) -> Option<Placement> {
        let graph = self.recommender.graph();
        let ids: Vec<String> = graph
            .speciality_destinations(&self.config.speciality)
            .into_iter()
            .filter(|id| *id != self.config.source_id)
            .collect();
        let candidates =
            reachable_candidates(graph, &self.config.source_id, &ids, self.config.severity);
        least_loaded_index(&candidates, self.config.overload_penalty).map(|idx| {
            let candidate = &candidates[idx];
            Placement {
                destination_id: candidate.facility_id.clone(),
                travel_minutes: candidate.travel_minutes,
                wait_minutes: candidate.wait_minutes,
                score: fallback_score(candidate, self.config.overload_penalty),
                overloaded: candidate.capacity_available == 0,
                fallback: true,
            }
        })
    }

    fn apply_referral(&mut self, destination_id: &str) {
        let graph = self.recommender.graph_mut();
        graph.consume_capacity(destination_id);
        graph.add_wait(destination_id, self.config.wait_increment);
    }

    fn tick(&mut self, step: usize) {
        let interval = self.config.recovery_interval as usize;
        if interval > 0 && step % interval == 0 {
            self.recommender
                .graph_mut()
                .recover_all(self.config.recovery_amount);
        }
        let every = self.config.shock.shock_every as usize;
        if every > 0 && step % every == 0 {
            self.shock(step);
        }
    }

    fn shock(&mut self, step: usize) {
        let targets: Vec<String> = self
            .recommender
            .graph()
            .speciality_destinations(&self.config.speciality)
            .into_iter()
            .filter(|id| *id != self.config.source_id)
            .collect();
        if targets.is_empty() {
            return;
        }
        let target = &targets[self.rng.gen_range(0..targets.len())];
        log::debug!("shock at patient {step} hits {target}");
        self.recommender.graph_mut().apply_shock(
            target,
            self.config.shock.shock_capacity_drop,
            self.config.shock.shock_wait_add,
        );
    }

    fn report(&self, tally: Tally) -> SimulationReport {
        let total = self.config.patients;
        let success = total - tally.failures;
        let report = SimulationReport {
            patients_total: total,
            patients_success: success,
            patients_failed: tally.failures,
            fallbacks_used: tally.fallbacks,
            overloads: tally.overloads,
            failure_rate: ratio(count_to_f64(tally.failures), total),
            avg_travel_minutes: ratio(tally.travel, success),
            avg_wait_minutes: ratio(tally.wait, success),
            avg_score: ratio(tally.score, success),
            concentration_hhi: concentration_hhi(&tally.destinations),
            balance_entropy: normalized_entropy(&tally.destinations),
            destination_counts: tally.destinations,
            fallback_destination_counts: tally.fallback_destinations,
            failure_reasons: tally.failure_reasons,
            shock_config: self.config.shock,
            fallback_policy: self.config.fallback_policy,
            preflight: self.preflight.clone(),
            snapshot_fingerprint: format!("{:016x}", self.fingerprint),
        };
        log::info!(
            "simulation finished: {}/{} placed, {} fallbacks, {} overloads",
            report.patients_success,
            report.patients_total,
            report.fallbacks_used,
            report.overloads
        );
        report
    }
}

/// Relaxed fallback cost: unweighted cost per bed plus the overload penalty.
#[must_use]
pub fn fallback_score(candidate: &Candidate, overload_penalty: f64) -> f64 {
    overload_score(
        candidate.travel_minutes,
        candidate.wait_minutes,
        candidate.capacity_available,
        overload_penalty,
    )
}

/// Index of the cheapest candidate under [`fallback_score`]; first wins ties.
#[must_use]
pub fn least_loaded_index(candidates: &[Candidate], overload_penalty: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, candidate) in candidates.iter().enumerate() {
        let value = fallback_score(candidate, overload_penalty);
        if best.is_none_or(|(_, current)| value < current) {
            best = Some((idx, value));
        }
    }
    best.map(|(idx, _)| idx)
}

/// Build a simulator over `snapshot` and run it to completion.
///
/// # Errors
///
/// Returns an error if the config or the snapshot is invalid.
pub fn simulate_batch(
    snapshot: &NetworkSnapshot,
    model: ModelHandle,
    config: SimulationConfig,
) -> Result<SimulationReport, SimulationError> {
    let mut simulator = Simulator::new(snapshot, model, config)?;
    Ok(simulator.run())
}
