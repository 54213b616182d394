//! Policy dispatcher: turns a referral request into a destination choice.
//!
//! The [`Recommender`] owns its graph copy and its model handle. Selection
//! never mutates facility state; applying the load of a referral is the
//! simulator's job.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::NetworkSource;
use crate::facility::FacilityLevel;
use crate::graph::{GraphError, LoadError, RoutingGraph};
use crate::model::{ModelError, ModelHandle, ModelLoader, candidate_features};
use crate::scoring::{Candidate, ScoreBreakdown, Severity, best_index};

/// Policy requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPolicy {
    #[default]
    Heuristic,
    Learned,
    Auto,
}

impl RoutingPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::Learned => "learned",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for RoutingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heuristic" => Ok(Self::Heuristic),
            "learned" | "rl" => Ok(Self::Learned),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown routing policy '{other}'")),
        }
    }
}

/// Policy that actually produced the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyUsed {
    Heuristic,
    Learned,
}

/// Domain failures surfaced by a recommendation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecommendError {
    #[error("referral network is empty")]
    EmptyNetwork,
    #[error("no available destination for speciality {speciality}{}", scope_suffix(.other_than_source))]
    NoAvailableDestination {
        speciality: String,
        other_than_source: bool,
    },
    #[error("no reachable destination found from {source_id}")]
    NoReachableDestination { source_id: String },
    #[error(transparent)]
    Graph(#[from] GraphError),
}

const fn scope_suffix(other_than_source: &bool) -> &'static str {
    if *other_than_source {
        " other than the current facility"
    } else {
        ""
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub patient_id: String,
    pub source_id: String,
    pub speciality: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub policy: RoutingPolicy,
}

impl RecommendationRequest {
    #[must_use]
    pub fn new(patient_id: &str, source_id: &str, speciality: &str, severity: Severity) -> Self {
        Self {
            patient_id: patient_id.to_string(),
            source_id: source_id.to_string(),
            speciality: speciality.to_string(),
            severity,
            policy: RoutingPolicy::Heuristic,
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: RoutingPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    pub id: String,
    pub name: String,
    pub level: FacilityLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub patient_id: String,
    pub destination_id: String,
    pub destination_name: String,
    pub path: Vec<PathStep>,
    pub travel_minutes: f64,
    pub wait_minutes: f64,
    pub score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub policy_used: PolicyUsed,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub explanation: String,
}

/// A chosen candidate together with how it was chosen.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub candidate: Candidate,
    pub policy_used: PolicyUsed,
    pub fallback_reason: Option<String>,
}

/// Score every reachable, non-source facility that serves `speciality` and
/// has a free bed. Candidates keep facility iteration order.
///
/// # Errors
///
/// Returns the first applicable of `EmptyNetwork`, `NoAvailableDestination`,
/// or `NoReachableDestination`.
pub fn scored_candidates(
    graph: &RoutingGraph,
    source_id: &str,
    speciality: &str,
    severity: Severity,
) -> Result<Vec<Candidate>, RecommendError> {
    if graph.is_empty() {
        return Err(RecommendError::EmptyNetwork);
    }
    let mut ids = graph.candidate_destinations(speciality);
    if ids.is_empty() {
        return Err(RecommendError::NoAvailableDestination {
            speciality: speciality.to_string(),
            other_than_source: false,
        });
    }
    ids.retain(|id| id != source_id);
    if ids.is_empty() {
        return Err(RecommendError::NoAvailableDestination {
            speciality: speciality.to_string(),
            other_than_source: true,
        });
    }

    let candidates = reachable_candidates(graph, source_id, &ids, severity);
    if candidates.is_empty() {
        return Err(RecommendError::NoReachableDestination {
            source_id: source_id.to_string(),
        });
    }
    Ok(candidates)
}

/// Build candidates for `ids`, silently dropping unreachable ones.
pub(crate) fn reachable_candidates(
    graph: &RoutingGraph,
    source_id: &str,
    ids: &[String],
    severity: Severity,
) -> Vec<Candidate> {
    ids.iter()
        .filter_map(|id| {
            let (path, travel) = graph.shortest_path(source_id, id).ok()?;
            let facility = graph.facility(id)?;
            Some(Candidate {
                facility_id: id.clone(),
                path,
                travel_minutes: travel,
                wait_minutes: facility.estimated_wait_minutes,
                capacity_available: facility.capacity_available,
                severity,
            })
        })
        .collect()
}

/// Referral dispatcher owning a graph copy and an optional learned model.
#[derive(Debug)]
pub struct Recommender {
    graph: RoutingGraph,
    model: ModelHandle,
}

impl Recommender {
    #[must_use]
    pub const fn new(graph: RoutingGraph, model: ModelHandle) -> Self {
        Self { graph, model }
    }

    /// Build a recommender with the model supplied by `loader`.
    #[must_use]
    pub fn with_loader(graph: RoutingGraph, loader: &dyn ModelLoader) -> Self {
        Self::new(graph, loader.load())
    }

    /// Rebuild the owned graph from the latest snapshot of `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read or is invalid.
    pub fn reload<S: NetworkSource>(&mut self, source: &S) -> Result<(), LoadError<S::Error>> {
        self.graph.reload(source)
    }

    #[must_use]
    pub const fn graph(&self) -> &RoutingGraph {
        &self.graph
    }

    pub const fn graph_mut(&mut self) -> &mut RoutingGraph {
        &mut self.graph
    }

    #[must_use]
    pub const fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn set_model(&mut self, model: ModelHandle) {
        self.model = model;
    }

    /// Recommend a destination against the current graph.
    ///
    /// # Errors
    ///
    /// Returns a [`RecommendError`] when no candidate can be scored. Learned
    /// policy failures never surface; they fall back to the heuristic.
    pub fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> Result<RecommendationResult, RecommendError> {
        let selection = self.select(
            &request.source_id,
            &request.speciality,
            request.severity,
            request.policy,
        )?;
        Ok(self.build_result(request, selection))
    }

    /// Choose a candidate without building the full response.
    ///
    /// # Errors
    ///
    /// Same as [`Recommender::recommend`].
    pub fn select(
        &self,
        source_id: &str,
        speciality: &str,
        severity: Severity,
        policy: RoutingPolicy,
    ) -> Result<Selection, RecommendError> {
        let candidates = scored_candidates(&self.graph, source_id, speciality, severity)?;

        let (index, policy_used, fallback_reason) = match policy {
            RoutingPolicy::Heuristic => (
                heuristic_index(&candidates, source_id)?,
                PolicyUsed::Heuristic,
                None,
            ),
            RoutingPolicy::Learned | RoutingPolicy::Auto => match self.learned_index(&candidates) {
                Ok(index) => (index, PolicyUsed::Learned, None),
                Err(err) => {
                    let reason = if policy == RoutingPolicy::Auto {
                        format!("Auto policy fallback to heuristic: {err}")
                    } else {
                        format!("Learned policy unavailable, fallback to heuristic: {err}")
                    };
                    log::debug!("{reason}");
                    (
                        heuristic_index(&candidates, source_id)?,
                        PolicyUsed::Heuristic,
                        Some(reason),
                    )
                }
            },
        };

        let candidate = candidates.into_iter().nth(index).ok_or_else(|| {
            RecommendError::NoReachableDestination {
                source_id: source_id.to_string(),
            }
        })?;
        Ok(Selection {
            candidate,
            policy_used,
            fallback_reason,
        })
    }

    fn learned_index(&self, candidates: &[Candidate]) -> Result<usize, ModelError> {
        let features = candidate_features(candidates);
        self.model.choose(&features, candidates.len())
    }

    fn build_result(
        &self,
        request: &RecommendationRequest,
        selection: Selection,
    ) -> RecommendationResult {
        let Selection {
            candidate,
            policy_used,
            fallback_reason,
        } = selection;

        let path: Vec<PathStep> = candidate
            .path
            .iter()
            .filter_map(|id| {
                self.graph.facility(id).map(|f| PathStep {
                    id: f.id.clone(),
                    name: f.name.clone(),
                    level: f.level,
                })
            })
            .collect();
        let destination_name = self
            .graph
            .facility(&candidate.facility_id)
            .map_or_else(|| candidate.facility_id.clone(), |f| f.name.clone());
        let breakdown = candidate.breakdown();
        let explanation = format!(
            "Destination {destination_name} selected because it serves {speciality}, has capacity {capacity}, \
             and gives the best tradeoff between travel ({travel:.0} min) and wait ({wait:.0} min) \
             under severity '{severity}' (weight {weight:.1}).",
            speciality = request.speciality,
            capacity = candidate.capacity_available,
            travel = candidate.travel_minutes,
            wait = candidate.wait_minutes,
            severity = request.severity,
            weight = request.severity.weight(),
        );

        RecommendationResult {
            patient_id: request.patient_id.clone(),
            destination_id: candidate.facility_id.clone(),
            destination_name,
            path,
            travel_minutes: candidate.travel_minutes,
            wait_minutes: candidate.wait_minutes,
            score: breakdown.final_score,
            score_breakdown: breakdown,
            policy_used,
            fallback_reason,
            explanation,
        }
    }
}

fn heuristic_index(candidates: &[Candidate], source_id: &str) -> Result<usize, RecommendError> {
    best_index(candidates).ok_or_else(|| RecommendError::NoReachableDestination {
        source_id: source_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::demo_network;
    use crate::facility::{Facility, NetworkSnapshot, ReferralLink};
    use crate::model::{LearnedModel, NoModel};

    struct FixedModel(usize);

    impl LearnedModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        fn predict(&self, _features: &[f32]) -> Result<usize, ModelError> {
            Ok(self.0)
        }
    }

    fn demo_recommender(model: ModelHandle) -> Recommender {
        Recommender::new(RoutingGraph::from_snapshot(&demo_network()).unwrap(), model)
    }

    fn maternal_request() -> RecommendationRequest {
        RecommendationRequest::new("P001", "C_LOCAL_A", "maternal", Severity::Medium)
    }

    #[test]
    fn heuristic_prefers_regional_hospital_in_demo() {
        let recommender = demo_recommender(NoModel.load());
        let result = recommender.recommend(&maternal_request()).unwrap();
        assert_eq!(result.destination_id, "H_REGIONAL_1");
        assert_eq!(result.destination_name, "Hopital Regional 1");
        assert_eq!(result.policy_used, PolicyUsed::Heuristic);
        assert!(result.fallback_reason.is_none());
        // routed through the district hospital: 20 + 35 minutes
        assert!((result.travel_minutes - 55.0).abs() < 1e-9);
        assert!((result.score - 1.3 * (55.0 + 35.0) / 6.0).abs() < 1e-9);
        let ids: Vec<&str> = result.path.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["C_LOCAL_A", "H_DISTRICT_1", "H_REGIONAL_1"]);
        assert_eq!(result.path[2].level, FacilityLevel::Tertiary);
    }

    #[test]
    fn district_score_matches_hand_computation() {
        let graph = RoutingGraph::from_snapshot(&demo_network()).unwrap();
        let candidates =
            scored_candidates(&graph, "C_LOCAL_A", "maternal", Severity::Medium).unwrap();
        let district = candidates
            .iter()
            .find(|c| c.facility_id == "H_DISTRICT_1")
            .unwrap();
        assert!((district.score() - 21.125).abs() < 1e-9);
        assert!(candidates.iter().all(|c| c.facility_id != "C_LOCAL_A"));
        for candidate in &candidates {
            assert_eq!(candidate.path.first().map(String::as_str), Some("C_LOCAL_A"));
            assert_eq!(candidate.path.last(), Some(&candidate.facility_id));
        }
    }

    #[test]
    fn learned_policy_uses_model_action() {
        let recommender = demo_recommender(ModelHandle::loaded(FixedModel(0)));
        let request = maternal_request().with_policy(RoutingPolicy::Learned);
        let result = recommender.recommend(&request).unwrap();
        assert_eq!(result.policy_used, PolicyUsed::Learned);
        assert_eq!(result.destination_id, "H_DISTRICT_1");
        assert!(result.fallback_reason.is_none());
    }

    #[test]
    fn learned_policy_falls_back_when_model_missing() {
        let recommender = demo_recommender(NoModel.load());
        let request = maternal_request().with_policy(RoutingPolicy::Learned);
        let result = recommender.recommend(&request).unwrap();
        assert_eq!(result.policy_used, PolicyUsed::Heuristic);
        assert_eq!(result.destination_id, "H_REGIONAL_1");
        let reason = result.fallback_reason.unwrap();
        assert!(reason.to_lowercase().contains("fallback"));
    }

    #[test]
    fn auto_policy_falls_back_on_invalid_action() {
        let recommender = demo_recommender(ModelHandle::loaded(FixedModel(9)));
        let request = maternal_request().with_policy(RoutingPolicy::Auto);
        let result = recommender.recommend(&request).unwrap();
        assert_eq!(result.policy_used, PolicyUsed::Heuristic);
        let reason = result.fallback_reason.unwrap();
        assert!(reason.starts_with("Auto policy fallback to heuristic"));
        assert!(reason.contains("invalid action index 9"));
    }

    #[test]
    fn surfaces_domain_errors() {
        let recommender = demo_recommender(NoModel.load());
        let mut request = maternal_request();
        request.speciality = "oncology".to_string();
        assert_eq!(
            recommender.recommend(&request),
            Err(RecommendError::NoAvailableDestination {
                speciality: "oncology".to_string(),
                other_than_source: false,
            })
        );

        let request = RecommendationRequest::new("P2", "H_REGIONAL_1", "pediatric", Severity::Low);
        assert_eq!(
            recommender.recommend(&request),
            Err(RecommendError::NoReachableDestination {
                source_id: "H_REGIONAL_1".to_string()
            })
        );

        let empty = Recommender::new(RoutingGraph::default(), NoModel.load());
        assert_eq!(
            empty.recommend(&maternal_request()),
            Err(RecommendError::EmptyNetwork)
        );
    }

    #[test]
    fn source_alone_is_not_a_destination() {
        let snapshot = NetworkSnapshot::new(
            vec![
                Facility::new("A", "A", FacilityLevel::Primary, &["maternal"], 2, 5.0),
                Facility::new("B", "B", FacilityLevel::Primary, &["general"], 2, 5.0),
            ],
            vec![ReferralLink::new("A", "B", 5.0)],
        );
        let recommender =
            Recommender::new(RoutingGraph::from_snapshot(&snapshot).unwrap(), NoModel.load());
        let request = RecommendationRequest::new("P", "A", "maternal", Severity::High);
        let err = recommender.recommend(&request).unwrap_err();
        assert!(matches!(
            err,
            RecommendError::NoAvailableDestination {
                other_than_source: true,
                ..
            }
        ));
        assert!(err.to_string().ends_with("other than the current facility"));
    }

    #[test]
    fn heuristic_is_deterministic() {
        let recommender = demo_recommender(NoModel.load());
        for severity in Severity::ALL {
            let request = RecommendationRequest::new("P", "C_LOCAL_B", "pediatric", severity);
            let first = recommender.recommend(&request).unwrap();
            let second = recommender.recommend(&request).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("rl".parse::<RoutingPolicy>(), Ok(RoutingPolicy::Learned));
        assert_eq!("AUTO".parse::<RoutingPolicy>(), Ok(RoutingPolicy::Auto));
        assert!("ppo".parse::<RoutingPolicy>().is_err());
    }
}
