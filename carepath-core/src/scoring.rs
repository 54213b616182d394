//! Severity weights and the candidate cost model.
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Facility ids along a route, source first. Most referral paths are short.
pub type FacilityPath = SmallVec<[String; 4]>;

/// Clinical urgency of a referral. Ordered low < medium < high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    /// Multiplier applied to the raw travel+wait cost.
    #[must_use]
    pub const fn weight(self) -> f64 {
        match self {
            Self::Low => 1.0,
            Self::Medium => 1.3,
            Self::High => 1.7,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown severity '{0}' (expected low, medium, or high)")]
pub struct ParseSeverityError(pub String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(ParseSeverityError(s.to_string())),
        }
    }
}

/// Divisor used for a given available capacity; zero counts as one so that
/// full facilities stay comparable.
#[must_use]
pub fn capacity_factor(capacity: u32) -> f64 {
    f64::from(capacity.max(1))
}

/// `weight(severity) * (travel + wait) / max(capacity, 1)`. Lower is better.
#[must_use]
pub fn score(travel_minutes: f64, wait_minutes: f64, capacity: u32, severity: Severity) -> f64 {
    severity.weight() * (travel_minutes + wait_minutes) / capacity_factor(capacity)
}

/// Score used by the relaxed least-loaded fallback: unweighted cost per bed,
/// plus `overload_penalty` when the facility is full.
#[must_use]
pub fn overload_score(
    travel_minutes: f64,
    wait_minutes: f64,
    capacity: u32,
    overload_penalty: f64,
) -> f64 {
    let base = (travel_minutes + wait_minutes) / capacity_factor(capacity);
    if capacity == 0 {
        base + overload_penalty
    } else {
        base
    }
}

/// Itemised view of a candidate's score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub travel_minutes: f64,
    pub wait_minutes: f64,
    pub capacity_available: u32,
    pub capacity_factor: f64,
    pub severity: Severity,
    pub severity_weight: f64,
    pub raw_cost: f64,
    pub final_score: f64,
}

/// A reachable facility that matches the requested speciality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub facility_id: String,
    pub path: FacilityPath,
    pub travel_minutes: f64,
    pub wait_minutes: f64,
    pub capacity_available: u32,
    pub severity: Severity,
}

impl Candidate {
    #[must_use]
    pub fn score(&self) -> f64 {
        score(
            self.travel_minutes,
            self.wait_minutes,
            self.capacity_available,
            self.severity,
        )
    }

    #[must_use]
    pub fn raw_cost(&self) -> f64 {
        self.travel_minutes + self.wait_minutes
    }

    #[must_use]
    pub fn breakdown(&self) -> ScoreBreakdown {
        ScoreBreakdown {
            travel_minutes: self.travel_minutes,
            wait_minutes: self.wait_minutes,
            capacity_available: self.capacity_available,
            capacity_factor: capacity_factor(self.capacity_available),
            severity: self.severity,
            severity_weight: self.severity.weight(),
            raw_cost: self.raw_cost(),
            final_score: self.score(),
        }
    }
}

/// Index of the lowest-scoring candidate; the first one wins exact ties.
#[must_use]
pub fn best_index(candidates: &[Candidate]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, candidate) in candidates.iter().enumerate() {
        let value = candidate.score();
        if best.is_none_or(|(_, current)| value < current) {
            best = Some((idx, value));
        }
    }
    best.map(|(idx, _)| idx)
}
