use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};
use serde::Serialize;

use crate::bridging::Bridge;
use crate::highway::{Highway, NodeKey};

/// Symmetric adjacency over highways.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityMatrix {
    size: usize,
    cells: Vec<bool>,
}

impl ConnectivityMatrix {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![false; size * size],
        }
    }

    /// Highways sharing at least one node are connected, as are the two ends
    /// of every bridge.
    pub fn from_highways(highways: &[Highway], bridges: &[Bridge]) -> Self {
        let mut matrix = Self::new(highways.len());

        let mut owners: BTreeMap<NodeKey, BTreeSet<usize>> = BTreeMap::new();
        for (i, highway) in highways.iter().enumerate() {
            for key in highway.keys() {
                owners.entry(key).or_default().insert(i);
            }
        }
        for members in owners.values().filter(|m| m.len() > 1) {
            let members: Vec<usize> = members.iter().copied().collect();
            for (n, &i) in members.iter().enumerate() {
                for &j in &members[n + 1..] {
                    matrix.connect(i, j);
                }
            }
        }

        for bridge in bridges {
            matrix.connect(bridge.from_highway, bridge.to_highway);
        }

        matrix
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn connect(&mut self, i: usize, j: usize) {
        if i == j {
            return;
        }
        self.cells[i * self.size + j] = true;
        self.cells[j * self.size + i] = true;
    }

    pub fn is_connected(&self, i: usize, j: usize) -> bool {
        i != j && self.cells[i * self.size + j]
    }

    pub fn neighbours(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.size).filter(move |&j| self.is_connected(i, j))
    }

    pub fn degree(&self, i: usize) -> usize {
        self.neighbours(i).count()
    }
}

/// A closed tour over highway indices, stored in canonical form: the smallest
/// index first, and the second element smaller than the last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cycle(Vec<usize>);

impl Cycle {
    pub fn new(mut order: Vec<usize>) -> Self {
        if let Some(start) = order
            .iter()
            .enumerate()
            .min_by_key(|(_, h)| **h)
            .map(|(i, _)| i)
        {
            order.rotate_left(start);
        }
        if order.len() > 2 && order[1] > order[order.len() - 1] {
            order[1..].reverse();
        }
        Self(order)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, highway: usize) -> bool {
        self.0.contains(&highway)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// Consecutive pairs, including the wrap-around pair.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let n = self.0.len();
        (0..n).map(move |i| (self.0[i], self.0[(i + 1) % n]))
    }

    /// Whether every consecutive pair is connected in `matrix`.
    pub fn is_valid_in(&self, matrix: &ConnectivityMatrix) -> bool {
        self.len() >= 3 && self.pairs().all(|(a, b)| matrix.is_connected(a, b))
    }
}

/// Depth-first search for the longest simple cycle.
///
/// Every cycle is enumerated from its smallest member with neighbours in
/// ascending order, so the lexicographically smallest canonical cycle of the
/// greatest length wins ties. `budget` caps the number of DFS expansions.
pub fn longest_cycle(matrix: &ConnectivityMatrix, budget: usize) -> Cycle {
    let mut search = CycleSearch {
        matrix,
        budget,
        expansions: 0,
        best: Vec::new(),
        path: Vec::new(),
        on_path: vec![false; matrix.len()],
    };

    for start in 0..matrix.len() {
        // Cycles through `start` only use larger indices, so no later start
        // can beat a complete tour.
        if search.best.len() == matrix.len() || search.exhausted() {
            break;
        }
        search.path.push(start);
        search.on_path[start] = true;
        search.extend(start);
        search.on_path[start] = false;
        search.path.clear();
    }

    if search.exhausted() {
        warn!(
            "Cycle search stopped after {} expansions; result may not be the longest cycle",
            search.expansions
        );
    }
    debug!(
        "Longest cycle has {} of {} highways ({} expansions)",
        search.best.len(),
        matrix.len(),
        search.expansions
    );

    Cycle::new(search.best)
}

struct CycleSearch<'a> {
    matrix: &'a ConnectivityMatrix,
    budget: usize,
    expansions: usize,
    best: Vec<usize>,
    path: Vec<usize>,
    on_path: Vec<bool>,
}

impl CycleSearch<'_> {
    fn exhausted(&self) -> bool {
        self.expansions >= self.budget
    }

    fn extend(&mut self, start: usize) {
        if self.best.len() == self.matrix.len() || self.exhausted() {
            return;
        }
        self.expansions += 1;

        let last = self.path[self.path.len() - 1];
        let neighbours: Vec<usize> = self.matrix.neighbours(last).collect();
        for next in neighbours {
            if next == start {
                if self.path.len() >= 3 {
                    self.consider();
                }
            } else if next > start && !self.on_path[next] {
                self.path.push(next);
                self.on_path[next] = true;
                self.extend(start);
                self.on_path[next] = false;
                self.path.pop();
            }
        }
    }

    fn consider(&mut self) {
        let candidate = Cycle::new(self.path.clone()).0;
        let better = candidate.len() > self.best.len()
            || (candidate.len() == self.best.len() && candidate < self.best);
        if better {
            self.best = candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(size: usize, edges: &[(usize, usize)]) -> ConnectivityMatrix {
        let mut m = ConnectivityMatrix::new(size);
        for &(a, b) in edges {
            m.connect(a, b);
        }
        m
    }

    #[test]
    fn canonical_form() {
        assert_eq!(Cycle::new(vec![2, 0, 3, 1]).as_slice(), &[0, 2, 1, 3]);
        assert_eq!(Cycle::new(vec![1, 2, 0]).as_slice(), &[0, 1, 2]);
    }

    #[test]
    fn ring_is_found_completely() {
        let m = matrix(4, &[(0, 1), (1, 2), (2, 3), (3, 0)]);
        let cycle = longest_cycle(&m, usize::MAX);
        assert_eq!(cycle.as_slice(), &[0, 1, 2, 3]);
        assert!(cycle.is_valid_in(&m));
    }

    #[test]
    fn pendant_highway_is_left_out() {
        let m = matrix(5, &[(0, 1), (1, 2), (2, 3), (3, 0), (2, 4)]);
        let cycle = longest_cycle(&m, usize::MAX);
        assert_eq!(cycle.as_slice(), &[0, 1, 2, 3]);
    }

    #[test]
    fn ties_resolve_to_smallest_canonical_cycle() {
        // Two triangles sharing vertex 2: {0,1,2} and {2,3,4}
        let m = matrix(5, &[(0, 1), (1, 2), (2, 0), (2, 3), (3, 4), (4, 2)]);
        assert_eq!(longest_cycle(&m, usize::MAX).as_slice(), &[0, 1, 2]);
    }

    #[test]
    fn no_cycle_in_a_path() {
        let m = matrix(3, &[(0, 1), (1, 2)]);
        assert!(longest_cycle(&m, usize::MAX).is_empty());
    }

    #[test]
    fn complete_graph_gives_hamiltonian_cycle() {
        let mut m = ConnectivityMatrix::new(6);
        for i in 0..6 {
            for j in i + 1..6 {
                m.connect(i, j);
            }
        }
        assert_eq!(longest_cycle(&m, usize::MAX).as_slice(), &[0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn self_connection_is_ignored() {
        let mut m = ConnectivityMatrix::new(2);
        m.connect(1, 1);
        assert!(!m.is_connected(1, 1));
        assert_eq!(m.degree(1), 0);
    }

    #[test]
    fn exhausted_budget_returns_best_found_so_far() {
        let m = matrix(4, &[(0, 1), (1, 2), (2, 3), (3, 0)]);
        // One expansion never gets past the first neighbour
        assert!(longest_cycle(&m, 1).is_empty());
        assert_eq!(longest_cycle(&m, 4).as_slice(), &[0, 1, 2, 3]);
    }
}
