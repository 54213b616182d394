use std::fmt;
use std::path::{Path, PathBuf};

use carepath_core::{
    BundledNetwork, LinearModelLoader, ModelHandle, ModelLoader, NetworkSnapshot, NetworkSource,
    NoModel,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkFileError {
    #[error("failed to read network file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse network file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },    #[error("bundled network {network} is malformed: {source}")]
    Bundled {
        network: BundledNetwork,
        #[source]
        source: serde_json::Error,
    },
}

/// Network source backed by a JSON snapshot on disk. Re-read on every load.
#[derive(Debug, Clone)]
pub struct JsonFileNetwork {
    path: PathBuf,
}

impl JsonFileNetwork {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NetworkSource for JsonFileNetwork {
    type Error = NetworkFileError;

    fn load_snapshot(&self) -> Result<NetworkSnapshot, Self::Error> {
        let path = self.path.display().to_string();
        let raw = std::fs::read_to_string(&self.path).map_err(|source| NetworkFileError::Read {
            path: path.clone(),
            source,
        })?;
        NetworkSnapshot::from_json(&raw).map_err(|source| NetworkFileError::Parse { path, source })
    }
}

/// Either a bundled network name or a path to a JSON snapshot.
#[derive(Debug, Clone)]
pub enum NetworkChoice {
    Bundled(BundledNetwork),
    File(JsonFileNetwork),
}

impl NetworkChoice {
    pub fn parse(arg: &str) -> Self {
        arg.parse::<BundledNetwork>()
            .map_or_else(|_| Self::File(JsonFileNetwork::new(arg)), Self::Bundled)
    }
}

impl NetworkSource for NetworkChoice {
    type Error = NetworkFileError;

    fn load_snapshot(&self) -> Result<NetworkSnapshot, Self::Error> {
        match self {
            Self::Bundled(network) => network
                .load()
                .map_err(|source| NetworkFileError::Bundled {
                    network: *network,
                    source,
                }),
            Self::File(source) => source.load_snapshot(),
        }
    }
}

impl fmt::Display for NetworkChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bundled(network) => write!(f, "{network}"),
            Self::File(source) => write!(f, "{}", source.path().display()),
        }
    }
}

/// Model loader selected on the command line.
#[derive(Debug, Clone)]
pub enum ModelChoice {
    Disabled(NoModel),
    Linear(LinearModelLoader),
}

impl ModelChoice {
    pub fn from_path(path: Option<&Path>) -> Self {
        path.map_or(Self::Disabled(NoModel), |p| {
            Self::Linear(LinearModelLoader::new(p))
        })
    }
}

impl ModelLoader for ModelChoice {
    fn load(&self) -> ModelHandle {
        match self {
            Self::Disabled(loader) => loader.load(),
            Self::Linear(loader) => loader.load(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bundled_names_and_paths() {
        assert!(matches!(
            NetworkChoice::parse("demo"),
            NetworkChoice::Bundled(BundledNetwork::Demo)
        ));
        match NetworkChoice::parse("networks/kenya.json") {
            NetworkChoice::File(source) => {
                assert_eq!(source.path(), Path::new("networks/kenya.json"));
            }
            NetworkChoice::Bundled(_) => panic!("path should not parse as bundled"),
        }
    }

    #[test]
    fn json_file_round_trips_bundled_network() {
        let path = std::env::temp_dir().join("carepath-bench-network.json");
        let snapshot = BundledNetwork::Complex.snapshot();
        std::fs::write(&path, serde_json::to_string(&snapshot).unwrap()).unwrap();
        let loaded = NetworkChoice::parse(path.to_str().unwrap())
            .load_snapshot()
            .unwrap();
        assert_eq!(loaded.fingerprint(), snapshot.fingerprint());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = JsonFileNetwork::new("no/such/network.json")
            .load_snapshot()
            .unwrap_err();
        assert!(err.to_string().contains("no/such/network.json"));
    }

    #[test]
    fn model_choice_defaults_to_unavailable() {
        assert!(!ModelChoice::from_path(None).load().is_loaded());
        let missing = ModelChoice::from_path(Some(Path::new("missing-model.json")));
        assert!(!missing.load().is_loaded());
    }
}
