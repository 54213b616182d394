//! Facility and referral-link records plus the network snapshot they form.
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::hash::Hasher;
use thiserror::Error;
use twox_hash::XxHash64;

/// Care level of a facility. Ordered primary < secondary < tertiary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacilityLevel {
    Primary,
    Secondary,
    Tertiary,
}

impl FacilityLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Tertiary => "tertiary",
        }
    }
}

impl fmt::Display for FacilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A care centre with capacity, wait time, level, and served specialities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub id: String,
    pub name: String,
    pub level: FacilityLevel,
    pub specialities: Vec<String>,
    pub capacity_max: u32,
    pub capacity_available: u32,
    pub estimated_wait_minutes: f64,
}

impl Facility {
    /// Build a facility whose maximum capacity equals its current availability.
    #[must_use]
    pub fn new(
        id: &str,
        name: &str,
        level: FacilityLevel,
        specialities: &[&str],
        capacity: u32,
        wait_minutes: f64,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            level,
            specialities: specialities.iter().map(|s| (*s).to_string()).collect(),
            capacity_max: capacity,
            capacity_available: capacity,
            estimated_wait_minutes: wait_minutes,
        }
    }

    #[must_use]
    pub fn with_capacity_max(mut self, capacity_max: u32) -> Self {
        self.capacity_max = capacity_max;
        self
    }

    #[must_use]
    pub fn serves(&self, speciality: &str) -> bool {
        self.specialities.iter().any(|s| s == speciality)
    }

    #[must_use]
    pub const fn has_capacity(&self) -> bool {
        self.capacity_available > 0
    }

    /// Take one bed if any is free. Returns whether a bed was taken.
    pub fn consume_capacity(&mut self) -> bool {
        if self.capacity_available > 0 {
            self.capacity_available -= 1;
            true
        } else {
            false
        }
    }

    pub fn add_wait(&mut self, minutes: f64) {
        self.estimated_wait_minutes = (self.estimated_wait_minutes + minutes).max(0.0);
    }

    /// Periodic recovery: restore `amount` beds (capped at `capacity_max`) and
    /// shorten the queue by `2 * amount` minutes (floored at zero).
    pub fn recover(&mut self, amount: u32) {
        self.capacity_available = self
            .capacity_available
            .saturating_add(amount)
            .min(self.capacity_max);
        self.estimated_wait_minutes =
            (self.estimated_wait_minutes - 2.0 * f64::from(amount)).max(0.0);
    }

    /// Adverse shock: drop capacity (floor zero) and lengthen the queue.
    pub fn apply_shock(&mut self, capacity_drop: u32, wait_add: f64) {
        self.capacity_available = self.capacity_available.saturating_sub(capacity_drop);
        self.add_wait(wait_add.max(0.0));
    }
}

/// Directed travel-time edge between two facilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralLink {
    pub source_id: String,
    pub dest_id: String,
    pub travel_minutes: f64,
}

impl ReferralLink {
    #[must_use]
    pub fn new(source_id: &str, dest_id: &str, travel_minutes: f64) -> Self {
        Self {
            source_id: source_id.to_string(),
            dest_id: dest_id.to_string(),
            travel_minutes,
        }
    }
}

/// Errors raised when a network snapshot violates record invariants.
#[derive(Debug, Error, PartialEq)]
pub enum SnapshotError {
    #[error("duplicate facility id {0}")]
    DuplicateFacility(String),
    #[error("facility {0} has no specialities")]
    NoSpecialities(String),
    #[error("facility {id} has capacity_available {available} above capacity_max {max}")]
    CapacityOutOfBounds { id: String, available: u32, max: u32 },
    #[error("facility {id} has invalid wait {wait}")]
    InvalidWait { id: String, wait: f64 },
    #[error("link {source_id} -> {dest_id} references unknown facility {missing}")]
    UnknownEndpoint {
        source_id: String,
        dest_id: String,
        missing: String,
    },
    #[error("link {source_id} -> {dest_id} has non-positive travel time {travel}")]
    NonPositiveTravel {
        source_id: String,
        dest_id: String,
        travel: f64,
    },
    #[error("link on {0} is a self-loop")]
    SelfLoop(String),
}

/// Facilities and links read from the external repository at one instant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    #[serde(default)]
    pub facilities: Vec<Facility>,
    #[serde(default)]
    pub links: Vec<ReferralLink>,
}

impl NetworkSnapshot {
    #[must_use]
    pub const fn new(facilities: Vec<Facility>, links: Vec<ReferralLink>) -> Self {
        Self { facilities, links }
    }

    /// Parse a snapshot from its JSON representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }

    #[must_use]
    pub fn facility(&self, id: &str) -> Option<&Facility> {
        self.facilities.iter().find(|f| f.id == id)
    }

    /// Check every facility and link invariant.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let mut ids = HashSet::with_capacity(self.facilities.len());
        for facility in &self.facilities {
            if !ids.insert(facility.id.as_str()) {
                return Err(SnapshotError::DuplicateFacility(facility.id.clone()));
            }
            if facility.specialities.iter().all(|s| s.trim().is_empty()) {
                return Err(SnapshotError::NoSpecialities(facility.id.clone()));
            }
            if facility.capacity_available > facility.capacity_max {
                return Err(SnapshotError::CapacityOutOfBounds {
                    id: facility.id.clone(),
                    available: facility.capacity_available,
                    max: facility.capacity_max,
                });
            }
            let wait = facility.estimated_wait_minutes;
            if !wait.is_finite() || wait < 0.0 {
                return Err(SnapshotError::InvalidWait {
                    id: facility.id.clone(),
                    wait,
                });
            }
        }

        for link in &self.links {
            for endpoint in [&link.source_id, &link.dest_id] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(SnapshotError::UnknownEndpoint {
                        source_id: link.source_id.clone(),
                        dest_id: link.dest_id.clone(),
                        missing: endpoint.clone(),
                    });
                }
            }
            if link.source_id == link.dest_id {
                return Err(SnapshotError::SelfLoop(link.source_id.clone()));
            }
            if !(link.travel_minutes.is_finite() && link.travel_minutes > 0.0) {
                return Err(SnapshotError::NonPositiveTravel {
                    source_id: link.source_id.clone(),
                    dest_id: link.dest_id.clone(),
                    travel: link.travel_minutes,
                });
            }
        }
        Ok(())
    }

    /// Stable xxHash64 of the canonical JSON form, used to tag reports.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(&bytes);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facility(id: &str, capacity: u32) -> Facility {
        Facility::new(id, id, FacilityLevel::Secondary, &["maternal"], capacity, 30.0)
    }

    #[test]
    fn levels_are_ordered() {
        assert!(FacilityLevel::Primary < FacilityLevel::Secondary);
        assert!(FacilityLevel::Secondary < FacilityLevel::Tertiary);
    }

    #[test]
    fn recovery_is_capped_at_maximum() {
        let mut f = facility("A", 4);
        f.capacity_available = 1;
        f.estimated_wait_minutes = 3.0;
        f.recover(5);
        assert_eq!(f.capacity_available, 4);
        assert!(f.estimated_wait_minutes.abs() < f64::EPSILON);
    }

    #[test]
    fn shock_floors_capacity_at_zero() {
        let mut f = facility("A", 1);
        f.apply_shock(3, 12.0);
        assert_eq!(f.capacity_available, 0);
        assert!((f.estimated_wait_minutes - 42.0).abs() < f64::EPSILON);
        assert!(!f.consume_capacity());
    }

    #[test]
    fn validate_rejects_bad_links() {
        let snapshot = NetworkSnapshot::new(
            vec![facility("A", 1), facility("B", 1)],
            vec![ReferralLink::new("A", "C", 5.0)],
        );
        assert!(matches!(
            snapshot.validate(),
            Err(SnapshotError::UnknownEndpoint { missing, .. }) if missing == "C"
        ));

        let snapshot = NetworkSnapshot::new(
            vec![facility("A", 1), facility("B", 1)],
            vec![ReferralLink::new("A", "B", 0.0)],
        );
        assert!(matches!(
            snapshot.validate(),
            Err(SnapshotError::NonPositiveTravel { .. })
        ));

        let snapshot = NetworkSnapshot::new(
            vec![facility("A", 1)],
            vec![ReferralLink::new("A", "A", 4.0)],
        );
        assert_eq!(
            snapshot.validate(),
            Err(SnapshotError::SelfLoop("A".to_string()))
        );
    }

    #[test]
    fn validate_rejects_capacity_above_max() {
        let bad = facility("A", 4).with_capacity_max(2);
        let snapshot = NetworkSnapshot::new(vec![bad], Vec::new());
        assert!(matches!(
            snapshot.validate(),
            Err(SnapshotError::CapacityOutOfBounds { available: 4, max: 2, .. })
        ));
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = NetworkSnapshot::new(vec![facility("A", 1)], Vec::new());
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.facilities[0].capacity_available = 0;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
