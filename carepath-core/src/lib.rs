//! CarePath Routing Core
//!
//! Referral routing for a network of care facilities: a travel-weighted
//! facility graph, a severity-aware candidate scorer, a policy dispatcher with
//! heuristic and learned policies, a capacity/wait simulator, an episodic
//! environment for trainable policies, and an evaluation harness.
//! This crate holds no persistence or transport; callers supply snapshots.

pub mod demo;
pub mod env;
pub mod evaluation;
pub mod facility;
pub mod graph;
pub mod metrics;
pub mod model;
pub mod numbers;
pub mod recommender;
pub mod scenario;
pub mod scoring;
pub mod simulation;

use std::convert::Infallible;
use thiserror::Error;

// Re-export commonly used types
pub use demo::{BundledNetwork, complex_network, demo_network};
pub use env::{EnvConfig, EnvError, EnvSnapshot, ReferralEnv, StepOutcome};
pub use evaluation::{
    BenchmarkReport, CompositeScore, CompositeWeights, PolicyDecision, PolicyKind, PolicyMetrics,
    ReferralPolicy, benchmark, composite_rank, evaluate, rank_by_reward,
};
pub use facility::{Facility, FacilityLevel, NetworkSnapshot, ReferralLink, SnapshotError};
pub use graph::{GraphError, LoadError, RoutingGraph};
pub use metrics::{DestinationCounts, concentration_hhi, normalized_entropy};
pub use model::{
    LearnedModel, LinearModel, LinearModelLoader, ModelError, ModelHandle, ModelLoader, NoModel,
};
pub use recommender::{
    PathStep, PolicyUsed, RecommendError, RecommendationRequest, RecommendationResult,
    Recommender, RoutingPolicy,
};
pub use scenario::{Scenario, ScenarioOutcome, ScenarioRank, ScenarioWeights};
pub use scoring::{Candidate, FacilityPath, ScoreBreakdown, Severity};
pub use simulation::{
    ConfigError, FallbackPolicy, Preflight, ShockConfig, SimulationConfig, SimulationError,
    SimulationReport, Simulator,
};

/// Trait for abstracting where facility and link records come from.
/// Storage-backed implementations live outside this crate.
pub trait NetworkSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read the current facility and link records.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be read.
    fn load_snapshot(&self) -> Result<NetworkSnapshot, Self::Error>;
}

/// In-memory network source returning a fixed snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticNetwork {
    snapshot: NetworkSnapshot,
}

impl StaticNetwork {
    #[must_use]
    pub const fn new(snapshot: NetworkSnapshot) -> Self {
        Self { snapshot }
    }

    /// Replace the records returned by subsequent loads.
    pub fn replace(&mut self, snapshot: NetworkSnapshot) {
        self.snapshot = snapshot;
    }
}

impl From<BundledNetwork> for StaticNetwork {
    fn from(network: BundledNetwork) -> Self {
        Self::new(network.snapshot())
    }
}

impl NetworkSource for StaticNetwork {
    type Error = Infallible;

    fn load_snapshot(&self) -> Result<NetworkSnapshot, Self::Error> {
        Ok(self.snapshot.clone())
    }
}

/// Failures of an [`Engine`] operation.
#[derive(Debug, Error)]
pub enum EngineError<E: std::error::Error + 'static> {
    #[error(transparent)]
    Load(#[from] LoadError<E>),
    #[error(transparent)]
    Recommend(#[from] RecommendError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error(transparent)]
    Env(#[from] EnvError),
}

/// Entry point tying a network source to a model loader. Every operation
/// starts from a fresh read of the source.
pub struct Engine<S, M>
where
    S: NetworkSource,
    M: ModelLoader,
{
    source: S,
    models: M,
}

impl<S, M> Engine<S, M>
where
    S: NetworkSource,
    M: ModelLoader,
{
    pub const fn new(source: S, models: M) -> Self {
        Self { source, models }
    }

    pub const fn source(&self) -> &S {
        &self.source
    }

    pub const fn models(&self) -> &M {
        &self.models
    }

    /// Build a recommender over the latest snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read or is invalid.
    pub fn recommender(&self) -> Result<Recommender, LoadError<S::Error>> {
        let graph = RoutingGraph::load(&self.source)?;
        Ok(Recommender::new(graph, self.models.load()))
    }

    /// Recommend against a freshly loaded network.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails or no destination qualifies.
    pub fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> Result<RecommendationResult, EngineError<S::Error>> {
        Ok(self.recommender()?.recommend(request)?)
    }

    /// Run a batch simulation on a private copy of the latest snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails or the config is invalid.
    pub fn simulate(
        &self,
        config: SimulationConfig,
    ) -> Result<SimulationReport, EngineError<S::Error>> {
        let snapshot = self.source.load_snapshot().map_err(LoadError::Source)?;
        Ok(simulation::simulate_batch(
            &snapshot,
            self.models.load(),
            config,
        )?)
    }

    /// Build an episodic environment over the latest snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails or no destination is reachable.
    pub fn environment(&self, config: EnvConfig) -> Result<ReferralEnv, EngineError<S::Error>> {
        let graph = RoutingGraph::load(&self.source)?;
        Ok(ReferralEnv::new(&graph, config)?)
    }

    /// Evaluate and rank `kinds` on a fresh environment.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails or no destination is reachable.
    pub fn benchmark(
        &self,
        kinds: &[PolicyKind],
        config: EnvConfig,
        episodes: usize,
        seed_base: u64,
        weights: CompositeWeights,
    ) -> Result<BenchmarkReport, EngineError<S::Error>> {
        let mut env = self.environment(config)?;
        Ok(benchmark(
            kinds,
            &mut env,
            episodes,
            seed_base,
            &self.models,
            weights,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Counts reads so tests can check every operation reloads.
    #[derive(Default)]
    struct CountingSource {
        reads: Cell<usize>,
    }

    #[derive(Debug, Error)]
    #[error("source offline")]
    struct Offline;

    struct OfflineSource;

    impl NetworkSource for CountingSource {
        type Error = Infallible;

        fn load_snapshot(&self) -> Result<NetworkSnapshot, Self::Error> {
            self.reads.set(self.reads.get() + 1);
            Ok(demo_network())
        }
    }

    impl NetworkSource for OfflineSource {
        type Error = Offline;

        fn load_snapshot(&self) -> Result<NetworkSnapshot, Self::Error> {
            Err(Offline)
        }
    }

    #[test]
    fn engine_reloads_before_each_operation() {
        let engine = Engine::new(CountingSource::default(), NoModel);
        let request = RecommendationRequest::new("P001", "C_LOCAL_A", "maternal", Severity::Medium);
        let first = engine.recommend(&request).unwrap();
        let second = engine.recommend(&request).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.destination_id, "H_REGIONAL_1");
        engine.simulate(SimulationConfig::default()).unwrap();
        assert_eq!(engine.source().reads.get(), 3);
    }

    #[test]
    fn simulation_does_not_write_back() {
        let source = StaticNetwork::from(BundledNetwork::Demo);
        let engine = Engine::new(source, NoModel);
        let before = engine.source().load_snapshot().unwrap();
        engine.simulate(SimulationConfig::default()).unwrap();
        let after = engine.source().load_snapshot().unwrap();
        assert_eq!(before.fingerprint(), after.fingerprint());
    }

    #[test]
    fn source_failures_surface_as_load_errors() {
        let engine = Engine::new(OfflineSource, NoModel);
        let request = RecommendationRequest::new("P", "C_LOCAL_A", "maternal", Severity::Low);
        let err = engine.recommend(&request).unwrap_err();
        assert!(matches!(err, EngineError::Load(LoadError::Source(Offline))));
        assert!(err.to_string().contains("source offline"));
    }

    #[test]
    fn invalid_snapshot_is_rejected_on_reload() {
        let mut snapshot = demo_network();
        snapshot.links.push(ReferralLink::new("C_LOCAL_A", "GHOST", 5.0));
        let mut recommender =
            Recommender::new(RoutingGraph::from_snapshot(&demo_network()).unwrap(), NoModel.load());
        let result = recommender.reload(&StaticNetwork::new(snapshot));
        assert!(matches!(result, Err(LoadError::Snapshot(_))));
        assert_eq!(recommender.graph().len(), 4);
    }

    #[test]
    fn benchmark_through_engine() {
        let engine = Engine::new(StaticNetwork::from(BundledNetwork::Complex), NoModel);
        let report = engine
            .benchmark(
                &[PolicyKind::Heuristic, PolicyKind::Random],
                EnvConfig::new("C_LOCAL_A", "maternal"),
                2,
                7,
                CompositeWeights::default(),
            )
            .unwrap();
        assert_eq!(report.policies.len(), 2);
        assert!(!report.destination_ids.contains(&"C_LOCAL_A".to_string()));
    }
}
