//! Learned-policy model handles and the feature encoding they consume.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::numbers::scaled_feature;
use crate::scoring::Candidate;

/// Failures raised by model lookup or inference.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("learned model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("learned model produced invalid action index {index} for {candidates} candidates")]
    InvalidAction { index: usize, candidates: usize },
    #[error("feature vector of length {0} is not 3n+1")]
    FeatureShape(usize),
}

/// A trained policy: maps a feature vector to a destination index.
pub trait LearnedModel {
    /// Name used in logs and reports.
    fn name(&self) -> &str;

    /// Pick an action for the given features. Must be deterministic.
    ///
    /// # Errors
    ///
    /// Returns an error if the features cannot be interpreted.
    fn predict(&self, features: &[f32]) -> Result<usize, ModelError>;
}

/// Outcome of trying to load a model artifact.
pub enum ModelHandle {
    Loaded(Box<dyn LearnedModel>),
    Unavailable(String),
}

impl ModelHandle {
    #[must_use]
    pub fn loaded(model: impl LearnedModel + 'static) -> Self {
        Self::Loaded(Box::new(model))
    }

    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    /// Run inference and check the index against `candidates`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ModelUnavailable`] when no model is loaded and
    /// [`ModelError::InvalidAction`] when the index is out of range.
    pub fn choose(&self, features: &[f32], candidates: usize) -> Result<usize, ModelError> {
        match self {
            Self::Unavailable(reason) => Err(ModelError::ModelUnavailable(reason.clone())),
            Self::Loaded(model) => {
                let index = model.predict(features)?;
                if index >= candidates {
                    return Err(ModelError::InvalidAction { index, candidates });
                }
                Ok(index)
            }
        }
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded(model) => f.debug_tuple("Loaded").field(&model.name()).finish(),
            Self::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}

/// Source of a model handle. Loaders report unavailability instead of failing.
pub trait ModelLoader {
    fn load(&self) -> ModelHandle;
}

/// Loader that never provides a model.
#[derive(Debug, Clone, Default)]
pub struct NoModel;

impl ModelLoader for NoModel {
    fn load(&self) -> ModelHandle {
        ModelHandle::Unavailable("no model configured".to_string())
    }
}

/// Linear scorer over the per-destination feature families.
///
/// Each destination gets `capacity_weight * cap + wait_weight * wait +
/// travel_weight * travel + progress_weight * progress`; the highest wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    #[serde(default = "LinearModel::default_name")]
    pub name: String,
    #[serde(default = "LinearModel::default_capacity_weight")]
    pub capacity_weight: f32,
    #[serde(default = "LinearModel::default_wait_weight")]
    pub wait_weight: f32,
    #[serde(default = "LinearModel::default_travel_weight")]
    pub travel_weight: f32,
    #[serde(default)]
    pub progress_weight: f32,
}

impl LinearModel {
    fn default_name() -> String {
        "linear".to_string()
    }

    const fn default_capacity_weight() -> f32 {
        1.0
    }

    const fn default_wait_weight() -> f32 {
        -1.0
    }

    const fn default_travel_weight() -> f32 {
        -1.0
    }
}

impl Default for LinearModel {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            capacity_weight: Self::default_capacity_weight(),
            wait_weight: Self::default_wait_weight(),
            travel_weight: Self::default_travel_weight(),
            progress_weight: 0.0,
        }
    }
}

impl LearnedModel for LinearModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, features: &[f32]) -> Result<usize, ModelError> {
        let len = features.len();
        if len < 4 || (len - 1) % 3 != 0 {
            return Err(ModelError::FeatureShape(len));
        }
        let n = (len - 1) / 3;
        let progress = features[len - 1];
        let mut best = (0, f32::NEG_INFINITY);
        for idx in 0..n {
            let value = self.capacity_weight * features[idx]
                + self.wait_weight * features[n + idx]
                + self.travel_weight * features[2 * n + idx]
                + self.progress_weight * progress;
            if value > best.1 {
                best = (idx, value);
            }
        }
        Ok(best.0)
    }
}

/// Reads a [`LinearModel`] from a JSON file.
#[derive(Debug, Clone)]
pub struct LinearModelLoader {
    path: PathBuf,
}

impl LinearModelLoader {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ModelLoader for LinearModelLoader {
    fn load(&self) -> ModelHandle {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("model {} not readable: {err}", self.path.display());
                return ModelHandle::Unavailable(format!(
                    "model not found: {} ({err})",
                    self.path.display()
                ));
            }
        };
        match serde_json::from_str::<LinearModel>(&raw) {
            Ok(model) => {
                log::info!("loaded model '{}' from {}", model.name, self.path.display());
                ModelHandle::loaded(model)
            }
            Err(err) => {
                log::warn!("model {} failed to parse: {err}", self.path.display());
                ModelHandle::Unavailable(format!(
                    "model {} failed to load: {err}",
                    self.path.display()
                ))
            }
        }
    }
}

/// Normalized features for a fixed candidate ordering:
/// `[cap.., wait.., travel.., 0.0]` with each family scaled by its maximum
/// (floored at 1). Capacities count a full facility as one bed.
#[must_use]
pub fn candidate_features(candidates: &[Candidate]) -> Vec<f32> {
    let capacities: Vec<f64> = candidates
        .iter()
        .map(|c| f64::from(c.capacity_available.max(1)))
        .collect();
    let max_capacity = max_or_one(&capacities);
    let capacities: Vec<f64> = capacities.iter().map(|cap| cap / max_capacity).collect();
    let waits: Vec<f64> = candidates.iter().map(|c| c.wait_minutes).collect();
    let travels: Vec<f64> = candidates.iter().map(|c| c.travel_minutes).collect();
    encode_features(&capacities, &waits, &travels, 0.0)
}

/// Shared encoder for the dispatcher and the environment observation.
///
/// `capacities` arrive already scaled by the caller; waits and travels are
/// scaled by their own maximum.
#[must_use]
pub fn encode_features(
    capacities: &[f64],
    waits: &[f64],
    travels: &[f64],
    progress: f64,
) -> Vec<f32> {
    let max_wait = max_or_one(waits);
    let max_travel = max_or_one(travels);

    let mut features = Vec::with_capacity(capacities.len() * 3 + 1);
    features.extend(capacities.iter().map(|&v| scaled_feature(v, 1.0)));
    features.extend(waits.iter().map(|&v| scaled_feature(v, max_wait)));
    features.extend(travels.iter().map(|&v| scaled_feature(v, max_travel)));
    features.push(scaled_feature(progress, 1.0));
    features
}

fn max_or_one(values: &[f64]) -> f64 {
    values.iter().copied().fold(1.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{FacilityPath, Severity};

    struct FixedModel(usize);

    impl LearnedModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        fn predict(&self, _features: &[f32]) -> Result<usize, ModelError> {
            Ok(self.0)
        }
    }

    fn candidate(id: &str, travel: f64, wait: f64, capacity: u32) -> Candidate {
        Candidate {
            facility_id: id.to_string(),
            path: FacilityPath::from_vec(vec!["S".to_string(), id.to_string()]),
            travel_minutes: travel,
            wait_minutes: wait,
            capacity_available: capacity,
            severity: Severity::Medium,
        }
    }

    #[test]
    fn features_are_normalized_with_trailing_progress() {
        let features = candidate_features(&[
            candidate("A", 20.0, 45.0, 4),
            candidate("B", 55.0, 35.0, 0),
        ]);
        assert_eq!(features.len(), 7);
        assert!((features[0] - 1.0).abs() < 1e-6);
        assert!((features[1] - 0.25).abs() < 1e-6);
        assert!((features[2] - 1.0).abs() < 1e-6);
        assert!((features[3] - 35.0 / 45.0).abs() < 1e-6);
        assert!((features[5] - 1.0).abs() < 1e-6);
        assert!(features[6].abs() < f32::EPSILON);
    }

    #[test]
    fn small_maxima_floor_at_one() {
        let features = encode_features(&[0.5], &[0.0], &[0.25], 0.5);
        assert_eq!(features, vec![0.5, 0.0, 0.25, 0.5]);
    }

    #[test]
    fn handle_rejects_out_of_range_actions() {
        let handle = ModelHandle::loaded(FixedModel(5));
        assert_eq!(
            handle.choose(&[0.0; 7], 2),
            Err(ModelError::InvalidAction {
                index: 5,
                candidates: 2
            })
        );
        let missing = NoModel.load();
        assert!(!missing.is_loaded());
        assert!(matches!(
            missing.choose(&[0.0; 4], 1),
            Err(ModelError::ModelUnavailable(_))
        ));
    }

    #[test]
    fn linear_model_prefers_free_fast_destinations() {
        let model = LinearModel::default();
        let features = encode_features(&[1.0, 0.25], &[10.0, 10.0], &[30.0, 30.0], 0.0);
        assert_eq!(model.predict(&features), Ok(0));
        assert_eq!(model.predict(&[0.0; 5]), Err(ModelError::FeatureShape(5)));
    }

    #[test]
    fn loader_reports_missing_file() {
        let loader = LinearModelLoader::new("definitely/not/here/model.json");
        match loader.load() {
            ModelHandle::Unavailable(reason) => assert!(reason.contains("not found")),
            ModelHandle::Loaded(_) => panic!("missing file should not load"),
        }
    }

    #[test]
    fn loader_reads_json_model() {
        let path = std::env::temp_dir().join("carepath-linear-model-test.json");
        std::fs::write(&path, r#"{"name":"tuned","travel_weight":-2.0}"#).unwrap();
        let handle = LinearModelLoader::new(&path).load();
        assert!(handle.is_loaded());
        assert_eq!(format!("{handle:?}"), "Loaded(\"tuned\")");
    }
}
