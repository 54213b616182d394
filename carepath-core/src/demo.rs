//! Bundled reference networks used by scenarios, tests, and the bench CLI.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::facility::NetworkSnapshot;

const DEMO_NETWORK_DATA: &str = include_str!("../data/demo_network.json");
const COMPLEX_NETWORK_DATA: &str = include_str!("../data/complex_network.json");

/// Named network shipped with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundledNetwork {
    /// Four facilities: two local centres, one district and one regional hospital.
    Demo,
    /// Nine facilities across three levels with cross-links between regionals.
    Complex,
}

impl BundledNetwork {
    pub const ALL: [Self; 2] = [Self::Demo, Self::Complex];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Demo => "demo",
            Self::Complex => "complex",
        }
    }

    const fn data(self) -> &'static str {
        match self {
            Self::Demo => DEMO_NETWORK_DATA,
            Self::Complex => COMPLEX_NETWORK_DATA,
        }
    }

    /// Parse the embedded records.
    ///
    /// # Errors
    ///
    /// Returns the parse error if the embedded JSON is malformed.
    pub fn load(self) -> Result<NetworkSnapshot, serde_json::Error> {
        parse_bundled(self, self.data())
    }

    /// Embedded records, or an empty network (logged) if they fail to parse.
    #[must_use]
    pub fn snapshot(self) -> NetworkSnapshot {
        self.load().unwrap_or_default()
    }
}

fn parse_bundled(
    network: BundledNetwork,
    data: &str,
) -> Result<NetworkSnapshot, serde_json::Error> {
    NetworkSnapshot::from_json(data).inspect_err(|err| {
        log::error!("bundled network '{network}' is malformed: {err}");
    })
}

impl fmt::Display for BundledNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BundledNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "demo" => Ok(Self::Demo),
            "complex" => Ok(Self::Complex),
            other => Err(format!("unknown bundled network '{other}'")),
        }
    }
}

#[must_use]
pub fn demo_network() -> NetworkSnapshot {
    BundledNetwork::Demo.snapshot()
}

#[must_use]
pub fn complex_network() -> NetworkSnapshot {
    BundledNetwork::Complex.snapshot()
}
