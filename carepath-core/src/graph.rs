//! Directed, travel-weighted routing graph over facilities.
//!
//! The graph is rebuilt from a [`NetworkSnapshot`] at the start of every
//! top-level operation. After construction its topology is frozen; only the
//! capacity and wait of individual facilities change.
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use thiserror::Error;

use crate::NetworkSource;
use crate::facility::{Facility, NetworkSnapshot, ReferralLink, SnapshotError};
use crate::scoring::FacilityPath;

/// Graph-level query failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("unknown facility {0}")]
    UnknownNode(String),
    #[error("no path from {source_id} to {target_id}")]
    NoPath { source_id: String, target_id: String },
}

/// Failure to (re)build the graph from an external source.
#[derive(Debug, Error)]
pub enum LoadError<E: std::error::Error + 'static> {
    #[error("failed to read network snapshot: {0}")]
    Source(#[source] E),
    #[error("invalid network snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    to: usize,
    travel_minutes: f64,
}

/// In-memory routing graph with strongly-typed facility nodes.
#[derive(Debug, Clone, Default)]
pub struct RoutingGraph {
    facilities: Vec<Facility>,
    index: HashMap<String, usize>,
    adjacency: Vec<Vec<Edge>>,
    links: Vec<ReferralLink>,
}

impl RoutingGraph {
    /// Build a graph from a validated snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot violates a record invariant.
    pub fn from_snapshot(snapshot: &NetworkSnapshot) -> Result<Self, SnapshotError> {
        snapshot.validate()?;
        let facilities = snapshot.facilities.clone();
        let index: HashMap<String, usize> = facilities
            .iter()
            .enumerate()
            .map(|(idx, f)| (f.id.clone(), idx))
            .collect();
        let mut adjacency = vec![Vec::new(); facilities.len()];
        for link in &snapshot.links {
            // validate() guarantees both endpoints are indexed
            if let (Some(&from), Some(&to)) = (index.get(&link.source_id), index.get(&link.dest_id))
            {
                adjacency[from].push(Edge {
                    to,
                    travel_minutes: link.travel_minutes,
                });
            }
        }
        Ok(Self {
            facilities,
            index,
            adjacency,
            links: snapshot.links.clone(),
        })
    }

    /// Read the latest snapshot from `source` and build a graph from it.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or the snapshot is invalid.
    pub fn load<S: NetworkSource>(source: &S) -> Result<Self, LoadError<S::Error>> {
        let snapshot = source.load_snapshot().map_err(LoadError::Source)?;
        Ok(Self::from_snapshot(&snapshot)?)
    }

    /// Replace this graph with a fresh build from `source`.
    ///
    /// On failure the current graph is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or the snapshot is invalid.
    pub fn reload<S: NetworkSource>(&mut self, source: &S) -> Result<(), LoadError<S::Error>> {
        *self = Self::load(source)?;
        Ok(())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Facilities in snapshot order.
    #[must_use]
    pub fn facilities(&self) -> &[Facility] {
        &self.facilities
    }

    #[must_use]
    pub fn facility(&self, id: &str) -> Option<&Facility> {
        self.index.get(id).map(|&idx| &self.facilities[idx])
    }

    pub fn facility_mut(&mut self, id: &str) -> Option<&mut Facility> {
        self.index.get(id).map(|&idx| &mut self.facilities[idx])
    }

    /// Ids serving `speciality` with at least one free bed. The source is not
    /// excluded; callers filter it out themselves.
    #[must_use]
    pub fn candidate_destinations(&self, speciality: &str) -> Vec<String> {
        self.facilities
            .iter()
            .filter(|f| f.serves(speciality) && f.has_capacity())
            .map(|f| f.id.clone())
            .collect()
    }

    /// Ids serving `speciality`, regardless of capacity.
    #[must_use]
    pub fn speciality_destinations(&self, speciality: &str) -> Vec<String> {
        self.facilities
            .iter()
            .filter(|f| f.serves(speciality))
            .map(|f| f.id.clone())
            .collect()
    }

    /// Minimum-travel route from `source` to `target` (Dijkstra).
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] if an endpoint is absent and
    /// [`GraphError::NoPath`] if `target` is unreachable.
    pub fn shortest_path(
        &self,
        source: &str,
        target: &str,
    ) -> Result<(FacilityPath, f64), GraphError> {
        let &from = self
            .index
            .get(source)
            .ok_or_else(|| GraphError::UnknownNode(source.to_string()))?;
        let &to = self
            .index
            .get(target)
            .ok_or_else(|| GraphError::UnknownNode(target.to_string()))?;

        let mut dist = vec![f64::INFINITY; self.facilities.len()];
        let mut prev: Vec<Option<usize>> = vec![None; self.facilities.len()];
        let mut heap = BinaryHeap::new();
        dist[from] = 0.0;
        heap.push(DijkstraState {
            cost: 0.0,
            node: from,
        });

        while let Some(DijkstraState { cost, node }) = heap.pop() {
            if node == to {
                break;
            }
            if cost > dist[node] {
                continue;
            }
            for edge in &self.adjacency[node] {
                let next = cost + edge.travel_minutes;
                if next < dist[edge.to] {
                    dist[edge.to] = next;
                    prev[edge.to] = Some(node);
                    heap.push(DijkstraState {
                        cost: next,
                        node: edge.to,
                    });
                }
            }
        }

        if !dist[to].is_finite() {
            return Err(GraphError::NoPath {
                source_id: source.to_string(),
                target_id: target.to_string(),
            });
        }

        let mut reversed = vec![to];
        let mut cursor = to;
        while let Some(parent) = prev[cursor] {
            reversed.push(parent);
            cursor = parent;
        }
        let path: FacilityPath = reversed
            .into_iter()
            .rev()
            .map(|idx| self.facilities[idx].id.clone())
            .collect();
        Ok((path, dist[to]))
    }

    /// Take one bed at `id` if free. Returns whether a bed was taken.
    pub fn consume_capacity(&mut self, id: &str) -> bool {
        self.facility_mut(id).is_some_and(Facility::consume_capacity)
    }

    pub fn add_wait(&mut self, id: &str, minutes: f64) {
        if let Some(facility) = self.facility_mut(id) {
            facility.add_wait(minutes);
        }
    }

    /// Apply periodic recovery to every facility.
    pub fn recover_all(&mut self, amount: u32) {
        for facility in &mut self.facilities {
            facility.recover(amount);
        }
    }

    pub fn apply_shock(&mut self, id: &str, capacity_drop: u32, wait_add: f64) {
        if let Some(facility) = self.facility_mut(id) {
            facility.apply_shock(capacity_drop, wait_add);
        }
    }

    /// Current facility state plus the frozen links, for callers that choose
    /// to persist simulation deltas.
    #[must_use]
    pub fn to_snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot::new(self.facilities.clone(), self.links.clone())
    }
}

#[derive(Debug, Clone, Copy)]
struct DijkstraState {
    cost: f64,
    node: usize,
}

impl PartialEq for DijkstraState {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DijkstraState {}

impl PartialOrd for DijkstraState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DijkstraState {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::demo_network;
    use crate::facility::FacilityLevel;

    fn demo_graph() -> RoutingGraph {
        RoutingGraph::from_snapshot(&demo_network()).unwrap()
    }

    #[test]
    fn candidates_filter_speciality_and_capacity() {
        let mut graph = demo_graph();
        let maternal = graph.candidate_destinations("maternal");
        assert_eq!(maternal, vec!["C_LOCAL_A", "H_DISTRICT_1", "H_REGIONAL_1"]);

        graph.facility_mut("H_DISTRICT_1").unwrap().capacity_available = 0;
        let maternal = graph.candidate_destinations("maternal");
        assert!(!maternal.contains(&"H_DISTRICT_1".to_string()));
        assert!(
            graph
                .speciality_destinations("maternal")
                .contains(&"H_DISTRICT_1".to_string())
        );
    }

    #[test]
    fn shortest_path_prefers_direct_link_when_cheaper() {
        let graph = demo_graph();
        let (path, travel) = graph.shortest_path("C_LOCAL_A", "H_REGIONAL_1").unwrap();
        assert_eq!(path.as_slice(), ["C_LOCAL_A", "H_DISTRICT_1", "H_REGIONAL_1"]);
        assert!((travel - 55.0).abs() < 1e-9);

        let (path, travel) = graph.shortest_path("C_LOCAL_A", "H_DISTRICT_1").unwrap();
        assert_eq!(path.as_slice(), ["C_LOCAL_A", "H_DISTRICT_1"]);
        assert!((travel - 20.0).abs() < 1e-9);
    }

    #[test]
    fn shortest_path_reports_missing_routes() {
        let graph = demo_graph();
        assert_eq!(
            graph.shortest_path("H_REGIONAL_1", "C_LOCAL_A"),
            Err(GraphError::NoPath {
                source_id: "H_REGIONAL_1".to_string(),
                target_id: "C_LOCAL_A".to_string(),
            })
        );
        assert_eq!(
            graph.shortest_path("NOWHERE", "C_LOCAL_A"),
            Err(GraphError::UnknownNode("NOWHERE".to_string()))
        );
        assert_eq!(
            graph.shortest_path("C_LOCAL_A", "NOWHERE"),
            Err(GraphError::UnknownNode("NOWHERE".to_string()))
        );
    }

    #[test]
    fn path_to_self_is_trivial() {
        let graph = demo_graph();
        let (path, travel) = graph.shortest_path("C_LOCAL_B", "C_LOCAL_B").unwrap();
        assert_eq!(path.as_slice(), ["C_LOCAL_B"]);
        assert!(travel.abs() < f64::EPSILON);
    }

    #[test]
    fn mutation_respects_capacity_bounds() {
        let mut graph = RoutingGraph::from_snapshot(&NetworkSnapshot::new(
            vec![Facility::new("A", "A", FacilityLevel::Primary, &["general"], 1, 10.0)],
            Vec::new(),
        ))
        .unwrap();
        assert!(graph.consume_capacity("A"));
        assert!(!graph.consume_capacity("A"));
        assert!(!graph.consume_capacity("missing"));
        graph.recover_all(3);
        assert_eq!(graph.facility("A").unwrap().capacity_available, 1);
        graph.apply_shock("A", 5, 4.0);
        let facility = graph.facility("A").unwrap();
        assert_eq!(facility.capacity_available, 0);
        assert!((facility.estimated_wait_minutes - 8.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_invalid_snapshot() {
        let snapshot = NetworkSnapshot::new(
            Vec::new(),
            vec![ReferralLink::new("A", "B", 3.0)],
        );
        assert!(RoutingGraph::from_snapshot(&snapshot).is_err());
    }
}
