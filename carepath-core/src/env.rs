//! Fixed-length episodic environment over one source and speciality.
//!
//! The destination list is frozen at construction: every reachable,
//! non-source facility serving the speciality, whatever its capacity.
//! Episodes replay the simulator's load and recovery dynamics without
//! shocks, so any policy can be trained or compared against them.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::RoutingGraph;
use crate::model::encode_features;
use crate::numbers::{count_to_f64, ratio};
use crate::simulation::{ConfigError, non_empty, non_negative};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnvError {
    #[error("no reachable destination serving {speciality} from {source_id}")]
    NoReachableDestination { source_id: String, speciality: String },
    #[error("invalid action {action} for {destinations} destinations")]
    InvalidAction { action: usize, destinations: usize },
    #[error("episode finished; reset before stepping again")]
    EpisodeFinished,
    #[error("invalid environment config: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    pub source_id: String,
    pub speciality: String,
    #[serde(default = "EnvConfig::default_patients_per_episode")]
    pub patients_per_episode: usize,
    #[serde(default = "EnvConfig::default_wait_increment")]
    pub wait_increment: f64,
    #[serde(default = "EnvConfig::default_recovery_interval")]
    pub recovery_interval: u32,
    #[serde(default = "EnvConfig::default_recovery_amount")]
    pub recovery_amount: u32,
    #[serde(default = "EnvConfig::default_overload_penalty")]
    pub overload_penalty: f64,
    #[serde(default = "EnvConfig::default_reward_scale")]
    pub reward_scale: f64,
    #[serde(default = "EnvConfig::default_weight")]
    pub travel_weight: f64,
    #[serde(default = "EnvConfig::default_weight")]
    pub wait_weight: f64,
    /// Penalty per unit share of the episode already sent to a destination.
    #[serde(default)]
    pub fairness_penalty: f64,
}

impl EnvConfig {
    const fn default_patients_per_episode() -> usize {
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

    const fn default_reward_scale() -> f64 {
        100.0
    }

    const fn default_weight() -> f64 {
        1.0
    }

    #[must_use]
    pub fn new(source_id: &str, speciality: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            speciality: speciality.to_string(),
            patients_per_episode: Self::default_patients_per_episode(),
            wait_increment: Self::default_wait_increment(),
            recovery_interval: Self::default_recovery_interval(),
            recovery_amount: Self::default_recovery_amount(),
            overload_penalty: Self::default_overload_penalty(),
            reward_scale: Self::default_reward_scale(),
            travel_weight: Self::default_weight(),
            wait_weight: Self::default_weight(),
            fairness_penalty: 0.0,
        }
    }

    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_empty("source_id", &self.source_id)?;
        non_empty("speciality", &self.speciality)?;
        if self.patients_per_episode == 0 {
            return Err(ConfigError::NotPositive {
                field: "patients_per_episode",
            });
        }
        if !(self.reward_scale.is_finite() && self.reward_scale > 0.0) {
            return Err(ConfigError::NotPositive {
                field: "reward_scale",
            });
        }
        non_negative("wait_increment", self.wait_increment)?;
        non_negative("overload_penalty", self.overload_penalty)?;
        non_negative("travel_weight", self.travel_weight)?;
        non_negative("wait_weight", self.wait_weight)?;
        non_negative("fairness_penalty", self.fairness_penalty)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Destination {
    id: String,
    travel_minutes: f64,
    capacity_max: u32,
    initial_capacity: u32,
    initial_wait: f64,
}

/// Mutable per-destination state, aligned with [`ReferralEnv::destination_ids`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvSnapshot {
    pub capacities: Vec<u32>,
    pub waits: Vec<f64>,
    pub travel_times: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub observation: Vec<f32>,
    pub reward: f64,
    pub terminated: bool,
    pub destination_id: String,
    pub travel_minutes: f64,
    /// Wait at the destination before this referral was added.
    pub wait_minutes: f64,
    pub overload: bool,
}

#[derive(Debug, Clone)]
pub struct ReferralEnv {
    config: EnvConfig,
    destinations: Vec<Destination>,
    capacities: Vec<u32>,
    waits: Vec<f64>,
    sent: Vec<usize>,
    step: usize,
}

impl ReferralEnv {
    /// Freeze the destination list from `graph` and start a fresh episode.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::Config`] for an invalid config and
    /// [`EnvError::NoReachableDestination`] when nothing can be reached.
    pub fn new(graph: &RoutingGraph, config: EnvConfig) -> Result<Self, EnvError> {
        config.validate()?;
        let destinations = freeze_destinations(graph, &config)?;
        log::debug!(
            "environment {} -> {} over {} destinations",
            config.source_id,
            config.speciality,
            destinations.len()
        );
        let mut env = Self {
            config,
            destinations,
            capacities: Vec::new(),
            waits: Vec::new(),
            sent: Vec::new(),
            step: 0,
        };
        env.reset();
        Ok(env)
    }

    /// Refreeze destinations from a newly loaded graph and reset.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::NoReachableDestination`] when the new graph offers
    /// no destination; the current state is kept in that case.
    pub fn reload(&mut self, graph: &RoutingGraph) -> Result<(), EnvError> {
        self.destinations = freeze_destinations(graph, &self.config)?;
        self.reset();
        Ok(())
    }

    /// Restore capacities and waits to the construction snapshot.
    pub fn reset(&mut self) -> Vec<f32> {
        self.step = 0;
        self.capacities = self.destinations.iter().map(|d| d.initial_capacity).collect();
        self.waits = self.destinations.iter().map(|d| d.initial_wait).collect();
        self.sent = vec![0; self.destinations.len()];
        self.observation()
    }

    #[must_use]
    pub const fn config(&self) -> &EnvConfig {
        &self.config
    }

    #[must_use]
    pub fn action_count(&self) -> usize {
        self.destinations.len()
    }

    #[must_use]
    pub const fn current_step(&self) -> usize {
        self.step
    }

    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        self.step >= self.config.patients_per_episode
    }

    #[must_use]
    pub fn destination_ids(&self) -> Vec<String> {
        self.destinations.iter().map(|d| d.id.clone()).collect()
    }

    #[must_use]
    pub fn snapshot(&self) -> EnvSnapshot {
        EnvSnapshot {
            capacities: self.capacities.clone(),
            waits: self.waits.clone(),
            travel_times: self.destinations.iter().map(|d| d.travel_minutes).collect(),
        }
    }

    /// `[cap.., wait.., travel.., step / patients]`, length `3n + 1`.
    /// Capacities are scaled by the largest initial capacity, so a
    /// destination recovered past that mark encodes above 1.
    #[must_use]
    pub fn observation(&self) -> Vec<f32> {
        let max_initial = self
            .destinations
            .iter()
            .map(|d| d.initial_capacity)
            .max()
            .unwrap_or(0)
            .max(1);
        let scale = f64::from(max_initial);
        let capacities: Vec<f64> = self
            .capacities
            .iter()
            .map(|&cap| f64::from(cap) / scale)
            .collect();
        let travels: Vec<f64> = self.destinations.iter().map(|d| d.travel_minutes).collect();
        let progress = ratio(count_to_f64(self.step), self.config.patients_per_episode);
        encode_features(&capacities, &self.waits, &travels, progress)
    }

    /// Send the next patient to destination `action`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::EpisodeFinished`] after the last patient and
    /// [`EnvError::InvalidAction`] for an out-of-range index.
    pub fn step(&mut self, action: usize) -> Result<StepOutcome, EnvError> {
        if self.is_terminated() {
            return Err(EnvError::EpisodeFinished);
        }
        let destinations = self.destinations.len();
        if action >= destinations {
            return Err(EnvError::InvalidAction {
                action,
                destinations,
            });
        }

        let config = &self.config;
        let travel = self.destinations[action].travel_minutes;
        let wait = self.waits[action];
        let overload = self.capacities[action] == 0;
        let share = ratio(count_to_f64(self.sent[action]), self.step);

        let mut reward =
            -(config.travel_weight * travel + config.wait_weight * wait) / config.reward_scale;
        if overload {
            reward -= config.overload_penalty / config.reward_scale;
        } else {
            self.capacities[action] -= 1;
        }
        reward -= config.fairness_penalty * share;
        self.waits[action] += config.wait_increment;
        self.sent[action] += 1;

        self.step += 1;
        self.recover();

        Ok(StepOutcome {
            observation: self.observation(),
            reward,
            terminated: self.is_terminated(),
            destination_id: self.destinations[action].id.clone(),
            travel_minutes: travel,
            wait_minutes: wait,
            overload,
        })
    }

    fn recover(&mut self) {
        let interval = self.config.recovery_interval as usize;
        let amount = self.config.recovery_amount;
        if interval == 0 || amount == 0 || self.step % interval != 0 {
            return;
        }
        for (idx, destination) in self.destinations.iter().enumerate() {
            self.capacities[idx] = self.capacities[idx]
                .saturating_add(amount)
                .min(destination.capacity_max);
            self.waits[idx] = (self.waits[idx] - 2.0 * f64::from(amount)).max(0.0);
        }
    }
}

fn freeze_destinations(
    graph: &RoutingGraph,
    config: &EnvConfig,
) -> Result<Vec<Destination>, EnvError> {
    let destinations: Vec<Destination> = graph
        .speciality_destinations(&config.speciality)
        .into_iter()
        .filter(|id| *id != config.source_id)
        .filter_map(|id| {
            let (_, travel) = graph.shortest_path(&config.source_id, &id).ok()?;
            let facility = graph.facility(&id)?;
            Some(Destination {
                travel_minutes: travel,
                capacity_max: facility.capacity_max,
                initial_capacity: facility.capacity_available,
                initial_wait: facility.estimated_wait_minutes,
                id,
            })
        })
        .collect();
    if destinations.is_empty() {
        return Err(EnvError::NoReachableDestination {
            source_id: config.source_id.clone(),
            speciality: config.speciality.clone(),
        });
    }
    Ok(destinations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::demo_network;

    fn demo_env(config: EnvConfig) -> ReferralEnv {
        let graph = RoutingGraph::from_snapshot(&demo_network()).unwrap();
        ReferralEnv::new(&graph, config).unwrap()
    }

    #[test]
    fn freezes_reachable_non_source_destinations() {
        let env = demo_env(EnvConfig::new("C_LOCAL_A", "maternal"));
        assert_eq!(env.destination_ids(), vec!["H_DISTRICT_1", "H_REGIONAL_1"]);
        let snapshot = env.snapshot();
        assert_eq!(snapshot.capacities, vec![4, 6]);
        assert_eq!(snapshot.travel_times, vec![20.0, 55.0]);
        assert_eq!(env.observation().len(), 7);
    }

    #[test]
    fn observation_scales_capacity_by_initial_maximum() {
        let mut snapshot = demo_network();
        for facility in &mut snapshot.facilities {
            match facility.id.as_str() {
                "H_DISTRICT_1" => {
                    facility.capacity_available = 2;
                    facility.capacity_max = 10;
                }
                "H_REGIONAL_1" => {
                    facility.capacity_available = 3;
                    facility.capacity_max = 3;
                }
                _ => {}
            }
        }
        let graph = RoutingGraph::from_snapshot(&snapshot).unwrap();
        let mut config = EnvConfig::new("C_LOCAL_A", "maternal");
        config.recovery_interval = 1;
        let mut env = ReferralEnv::new(&graph, config).unwrap();
        let observation = env.step(1).unwrap().observation;
        assert_eq!(env.snapshot().capacities, vec![4, 3]);
        assert!((observation[0] - 4.0 / 3.0).abs() < 1e-6);
        assert!((observation[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn reward_matches_cost_model() {
        let mut env = demo_env(EnvConfig::new("C_LOCAL_A", "maternal"));
        let outcome = env.step(0).unwrap();
        assert!((outcome.reward + 0.65).abs() < 1e-12);
        assert!(!outcome.overload);
        assert_eq!(outcome.destination_id, "H_DISTRICT_1");
        let snapshot = env.snapshot();
        assert_eq!(snapshot.capacities[0], 3);
        assert!((snapshot.waits[0] - 48.0).abs() < 1e-12);
    }

    #[test]
    fn overload_adds_penalty_and_keeps_capacity_at_zero() {
        let mut config = EnvConfig::new("C_LOCAL_A", "maternal");
        config.recovery_interval = 0;
        config.wait_increment = 0.0;
        let mut env = demo_env(config);
        for _ in 0..4 {
            env.step(0).unwrap();
        }
        let outcome = env.step(0).unwrap();
        assert!(outcome.overload);
        assert!((outcome.reward + (20.0 + 45.0 + 30.0) / 100.0).abs() < 1e-12);
        assert_eq!(env.snapshot().capacities[0], 0);
    }

    #[test]
    fn terminates_and_refuses_further_steps() {
        let mut config = EnvConfig::new("C_LOCAL_A", "maternal");
        config.patients_per_episode = 3;
        let mut env = demo_env(config);
        assert!(!env.step(1).unwrap().terminated);
        assert!(!env.step(1).unwrap().terminated);
        let last = env.step(1).unwrap();
        assert!(last.terminated);
        assert!((last.observation[6] - 1.0).abs() < f32::EPSILON);
        assert_eq!(env.step(0), Err(EnvError::EpisodeFinished));
    }

    #[test]
    fn rejects_out_of_range_actions() {
        let mut env = demo_env(EnvConfig::new("C_LOCAL_A", "maternal"));
        assert_eq!(
            env.step(2),
            Err(EnvError::InvalidAction {
                action: 2,
                destinations: 2
            })
        );
    }

    #[test]
    fn reset_restores_construction_state() {
        let mut env = demo_env(EnvConfig::new("C_LOCAL_A", "maternal"));
        let initial = env.snapshot();
        let first_obs = env.observation();
        for action in [0, 1, 1, 0, 1, 1, 1] {
            env.step(action).unwrap();
        }
        assert_ne!(env.snapshot(), initial);
        assert_eq!(env.reset(), first_obs);
        assert_eq!(env.snapshot(), initial);
        assert_eq!(env.current_step(), 0);
    }

    #[test]
    fn recovery_never_exceeds_capacity_max() {
        let mut config = EnvConfig::new("C_LOCAL_A", "maternal");
        config.recovery_interval = 1;
        config.recovery_amount = 5;
        let mut env = demo_env(config);
        for _ in 0..20 {
            env.step(1).unwrap();
            let snapshot = env.snapshot();
            assert!(snapshot.capacities[0] <= 4);
            assert!(snapshot.capacities[1] <= 6);
        }
    }

    #[test]
    fn fairness_penalty_discourages_repeats() {
        let mut config = EnvConfig::new("C_LOCAL_A", "maternal");
        config.fairness_penalty = 1.0;
        config.wait_increment = 0.0;
        config.recovery_interval = 0;
        let mut env = demo_env(config);
        let first = env.step(0).unwrap().reward;
        let second = env.step(0).unwrap().reward;
        assert!((first - second - 1.0).abs() < 1e-12);
    }

    #[test]
    fn construction_errors() {
        let graph = RoutingGraph::from_snapshot(&demo_network()).unwrap();
        assert!(matches!(
            ReferralEnv::new(&graph, EnvConfig::new("H_REGIONAL_1", "pediatric")),
            Err(EnvError::NoReachableDestination { .. })
        ));
        let mut config = EnvConfig::new("C_LOCAL_A", "maternal");
        config.reward_scale = 0.0;
        assert!(matches!(
            ReferralEnv::new(&graph, config),
            Err(EnvError::Config(ConfigError::NotPositive { field: "reward_scale" }))
        ));
    }
}
