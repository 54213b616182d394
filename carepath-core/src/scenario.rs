//! Named simulation scenarios over the bundled networks, and their ranking.
use serde::{Deserialize, Serialize};

use crate::demo::BundledNetwork;
use crate::model::ModelLoader;
use crate::numbers::{count_to_f64, ratio};
use crate::scoring::Severity;
use crate::simulation::{
    FallbackPolicy, ShockConfig, SimulationConfig, SimulationError, SimulationReport,
    simulate_batch,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub network: BundledNetwork,
    pub config: SimulationConfig,
}

impl Scenario {
    fn build(name: &str, network: BundledNetwork, source_id: &str, speciality: &str) -> Self {
        let mut config = SimulationConfig::new(source_id, speciality);
        config.severity = Severity::Medium;
        config.fallback_policy = FallbackPolicy::ForceLeastLoaded;
        Self {
            name: name.to_string(),
            network,
            config,
        }
    }

    fn with_shock(mut self, every: u32, wait_add: f64, capacity_drop: u32) -> Self {
        self.config.shock = ShockConfig {
            shock_every: every,
            shock_wait_add: wait_add,
            shock_capacity_drop: capacity_drop,
            ..self.config.shock
        };
        self
    }

    /// Same scenario with a different patient count.
    #[must_use]
    pub fn with_patients(mut self, patients: usize) -> Self {
        self.config.patients = patients;
        self
    }
}

/// The stock scenario set: stable and shocked runs on both bundled networks.
#[must_use]
pub fn catalog() -> Vec<Scenario> {
    vec![
        Scenario::build("demo_maternal_stable", BundledNetwork::Demo, "C_LOCAL_A", "maternal"),
        Scenario::build("demo_maternal_shock", BundledNetwork::Demo, "C_LOCAL_A", "maternal")
            .with_shock(10, 10.0, 1),
        Scenario::build(
            "complex_maternal_stable",
            BundledNetwork::Complex,
            "C_LOCAL_A",
            "maternal",
        ),
        Scenario::build(
            "complex_pediatric_shock",
            BundledNetwork::Complex,
            "C_LOCAL_B",
            "pediatric",
        )
        .with_shock(8, 12.0, 1),
    ]
}

/// Look up a catalog scenario by name.
#[must_use]
pub fn find(name: &str) -> Option<Scenario> {
    catalog().into_iter().find(|s| s.name == name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub scenario: String,
    pub network: BundledNetwork,
    pub config: SimulationConfig,
    pub metrics: SimulationReport,
}

/// Run each scenario on a fresh copy of its network.
///
/// # Errors
///
/// Returns the first scenario whose config or network is invalid.
pub fn run_scenarios(
    scenarios: &[Scenario],
    loader: &dyn ModelLoader,
) -> Result<Vec<ScenarioOutcome>, SimulationError> {
    scenarios
        .iter()
        .map(|scenario| {
            log::info!("running scenario {}", scenario.name);
            let metrics = simulate_batch(
                &scenario.network.snapshot(),
                loader.load(),
                scenario.config.clone(),
            )?;
            Ok(ScenarioOutcome {
                scenario: scenario.name.clone(),
                network: scenario.network,
                config: scenario.config.clone(),
                metrics,
            })
        })
        .collect()
}

/// Weights for ranking scenario outcomes; rates and concentration are
/// expressed in percent before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenarioWeights {
    #[serde(default = "ScenarioWeights::default_score")]
    pub score: f64,
    #[serde(default = "ScenarioWeights::default_fallback")]
    pub fallback: f64,
    #[serde(default = "ScenarioWeights::default_failure")]
    pub failure: f64,
    #[serde(default)]
    pub hhi: f64,
    #[serde(default)]
    pub entropy_gap: f64,
}

impl ScenarioWeights {
    const fn default_score() -> f64 {
        1.0
    }

    const fn default_fallback() -> f64 {
        2.0
    }

    const fn default_failure() -> f64 {
        5.0
    }
}

impl Default for ScenarioWeights {
    fn default() -> Self {
        Self {
            score: Self::default_score(),
            fallback: Self::default_fallback(),
            failure: Self::default_failure(),
            hhi: 0.0,
            entropy_gap: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRank {
    pub rank: usize,
    pub scenario: String,
    pub avg_score: f64,
    pub avg_wait: f64,
    pub avg_travel: f64,
    pub fallbacks: usize,
    pub failures: usize,
    pub hhi: f64,
    pub entropy: f64,
    pub composite: f64,
}

#[must_use]
pub fn scenario_composite(report: &SimulationReport, weights: &ScenarioWeights) -> f64 {
    let fallback_rate = ratio(count_to_f64(report.fallbacks_used), report.patients_total);
    let failure_rate = ratio(count_to_f64(report.patients_failed), report.patients_total);
    weights.score * report.avg_score
        + weights.fallback * 100.0 * fallback_rate
        + weights.failure * 100.0 * failure_rate
        + weights.hhi * 100.0 * report.concentration_hhi
        + weights.entropy_gap * 100.0 * (1.0 - report.balance_entropy)
}

/// Rank outcomes by ascending composite; rank 1 is the recommended setup.
#[must_use]
pub fn rank_scenarios(
    outcomes: &[ScenarioOutcome],
    weights: &ScenarioWeights,
) -> Vec<ScenarioRank> {
    let mut rows: Vec<ScenarioRank> = outcomes
        .iter()
        .map(|outcome| {
            let m = &outcome.metrics;
            ScenarioRank {
                rank: 0,
                scenario: outcome.scenario.clone(),
                avg_score: m.avg_score,
                avg_wait: m.avg_wait_minutes,
                avg_travel: m.avg_travel_minutes,
                fallbacks: m.fallbacks_used,
                failures: m.patients_failed,
                hhi: m.concentration_hhi,
                entropy: m.balance_entropy,
                composite: scenario_composite(m, weights),
            }
        })
        .collect();
    rows.sort_by(|a, b| a.composite.total_cmp(&b.composite));
    for (idx, row) in rows.iter_mut().enumerate() {
        row.rank = idx + 1;
    }
    rows
}
