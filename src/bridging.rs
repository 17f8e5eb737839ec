use std::collections::BTreeMap;

use log::{debug, info};
use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::config::BuilderConfig;
use crate::connectivity::{ConnectivityMatrix, Cycle, longest_cycle};
use crate::highway::{Highway, Point};
use crate::metric::DistanceMetric;

/// A synthetic edge drawn between two highways that share no node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bridge {
    pub from_highway: usize,
    pub to_highway: usize,
    /// Node on `from_highway`
    pub from: Point,
    /// Node on `to_highway`
    pub to: Point,
    pub distance: f64,
}

impl Bridge {
    pub fn joins(&self, a: usize, b: usize) -> bool {
        (self.from_highway, self.to_highway) == (a, b)
            || (self.from_highway, self.to_highway) == (b, a)
    }

    /// The bridge end lying on `highway`.
    pub fn end_on(&self, highway: usize) -> Option<Point> {
        if self.from_highway == highway {
            Some(self.from)
        } else if self.to_highway == highway {
            Some(self.to)
        } else {
            None
        }
    }
}

/// Closest pair of nodes between two highways, `(on a, on b, distance)`.
pub fn closest_node_pair(
    a: &Highway,
    b: &Highway,
    metric: &dyn DistanceMetric,
) -> Option<(Point, Point, f64)> {
    let mut best: Option<(Point, Point, f64)> = None;
    for pa in a.points() {
        for pb in b.points() {
            let d = metric.distance(pa.coord, pb.coord);
            if best.is_none_or(|(_, _, bd)| d < bd) {
                best = Some((*pa, *pb, d));
            }
        }
    }
    best
}

struct Candidate {
    bridge: Bridge,
    cycle: Cycle,
}

/// Insert forced connections until the longest cycle covers every highway.
///
/// New bridges are appended to `bridges`. Returns the longest cycle after the
/// last insertion, which is shorter than `highways.len()` when no further
/// connection could be made.
pub fn force_connections(
    highways: &[Highway],
    bridges: &mut Vec<Bridge>,
    config: &BuilderConfig,
    metric: &dyn DistanceMetric,
) -> Cycle {
    let n = highways.len();
    // Geometry does not change while bridging, so gaps are measured once
    let mut gaps: BTreeMap<(usize, usize), Option<(Point, Point, f64)>> = BTreeMap::new();
    let mut inserted = 0;

    loop {
        let matrix = ConnectivityMatrix::from_highways(highways, bridges);
        let cycle = longest_cycle(&matrix, config.cycle_search_budget);
        if cycle.len() == n {
            info!(
                "Cycle covers all {} highways after {} forced connection(s)",
                n, inserted
            );
            return cycle;
        }
        if inserted >= config.max_forced_connections {
            info!(
                "Reached the limit of {} forced connection(s) with {} of {} highways on the cycle",
                config.max_forced_connections,
                cycle.len(),
                n
            );
            return cycle;
        }

        let mut candidates = Vec::new();
        for h in (0..n).filter(|&h| !cycle.contains(h)) {
            for x in (0..n).filter(|&x| x != h && !matrix.is_connected(h, x)) {
                let gap = *gaps
                    .entry((h.min(x), h.max(x)))
                    .or_insert_with(|| {
                        closest_node_pair(&highways[h.min(x)], &highways[h.max(x)], metric)
                    });
                let Some((a, b, distance)) = gap else {
                    continue;
                };
                if config.max_bridge_distance.is_some_and(|max| distance > max) {
                    continue;
                }
                let (from, to) = if h < x { (a, b) } else { (b, a) };
                let bridge = Bridge {
                    from_highway: h,
                    to_highway: x,
                    from,
                    to,
                    distance,
                };

                let mut trial = matrix.clone();
                trial.connect(h, x);
                candidates.push(Candidate {
                    bridge,
                    cycle: longest_cycle(&trial, config.cycle_search_budget),
                });
            }
        }

        let lengthening = candidates
            .iter()
            .filter(|c| c.cycle.len() > cycle.len())
            .min_by_key(|c| {
                (
                    std::cmp::Reverse(c.cycle.len()),
                    OrderedFloat(c.bridge.distance),
                    c.bridge.from_highway,
                    c.bridge.to_highway,
                )
            });
        // Nothing lengthens the cycle yet: give a dangling highway another
        // connection so a later insertion can
        let chosen = lengthening.or_else(|| {
            candidates
                .iter()
                .filter(|c| matrix.degree(c.bridge.from_highway) < 2)
                .min_by_key(|c| {
                    (
                        OrderedFloat(c.bridge.distance),
                        c.bridge.from_highway,
                        c.bridge.to_highway,
                    )
                })
        });

        let Some(chosen) = chosen else {
            info!(
                "No further forced connection possible; {} of {} highways on the cycle",
                cycle.len(),
                n
            );
            return cycle;
        };

        debug!(
            "Forced connection {} -> {} over {:.2} {} (cycle {} -> {})",
            highways[chosen.bridge.from_highway].name(),
            highways[chosen.bridge.to_highway].name(),
            chosen.bridge.distance,
            metric.name(),
            cycle.len(),
            chosen.cycle.len()
        );
        bridges.push(chosen.bridge);
        inserted += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highway::Segment;
    use crate::metric::PlanarMetric;

    fn highway(name: &str, coords: &[(f64, f64)]) -> Highway {
        let points = coords.iter().map(|&(x, y)| Point::new(x, y)).collect();
        Highway::named(name, vec![Segment::new(None, points).unwrap()]).unwrap()
    }

    fn planar_config(max_bridge: Option<f64>) -> BuilderConfig {
        BuilderConfig {
            metric: crate::metric::MetricKind::Planar,
            max_bridge_distance: max_bridge,
            ..BuilderConfig::default()
        }
    }

    #[test]
    fn closest_pair_is_found() {
        let a = highway("A", &[(0.0, 0.0), (1.0, 0.0)]);
        let b = highway("B", &[(1.2, 0.1), (3.0, 3.0)]);
        let (pa, pb, d) = closest_node_pair(&a, &b, &PlanarMetric).unwrap();
        assert_eq!(pa.coord.x, 1.0);
        assert_eq!(pb.coord.x, 1.2);
        assert!((d - (0.04f64 + 0.01).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn single_gap_is_closed_by_one_bridge() {
        // Square with the D/A corner open by 0.05
        let highways = vec![
            highway("A", &[(0.0, 1.0), (1.0, 1.0)]),
            highway("B", &[(1.0, 1.0), (1.0, 0.0)]),
            highway("C", &[(1.0, 0.0), (0.0, 0.0)]),
            highway("D", &[(0.0, 0.0), (0.0, 0.95)]),
        ];
        let mut bridges = Vec::new();
        let cycle = force_connections(
            &highways,
            &mut bridges,
            &planar_config(Some(0.5)),
            &PlanarMetric,
        );

        assert_eq!(cycle.as_slice(), &[0, 1, 2, 3]);
        assert_eq!(bridges.len(), 1);
        assert!(bridges[0].joins(0, 3));
        assert!((bridges[0].distance - 0.05).abs() < 1e-9);
    }

    #[test]
    fn distant_highway_is_not_bridged() {
        let highways = vec![
            highway("A", &[(0.0, 1.0), (1.0, 1.0)]),
            highway("B", &[(1.0, 1.0), (1.0, 0.0)]),
            highway("C", &[(1.0, 0.0), (0.0, 0.0)]),
            highway("D", &[(0.0, 0.0), (0.0, 1.0)]),
            highway("E", &[(5.0, 5.0), (6.0, 5.0)]),
        ];
        let mut bridges = Vec::new();
        let cycle = force_connections(
            &highways,
            &mut bridges,
            &planar_config(Some(0.5)),
            &PlanarMetric,
        );

        assert_eq!(cycle.as_slice(), &[0, 1, 2, 3]);
        assert!(bridges.is_empty());
    }

    #[test]
    fn dangling_highway_gets_two_bridges_without_limit() {
        let highways = vec![
            highway("A", &[(0.0, 1.0), (1.0, 1.0)]),
            highway("B", &[(1.0, 1.0), (1.0, 0.0)]),
            highway("C", &[(1.0, 0.0), (0.0, 0.0)]),
            highway("D", &[(0.0, 0.0), (0.0, 1.0)]),
            highway("E", &[(1.2, 1.1), (1.2, -0.1)]),
        ];
        let mut bridges = Vec::new();
        let cycle = force_connections(&highways, &mut bridges, &planar_config(None), &PlanarMetric);

        assert_eq!(cycle.len(), 5);
        assert_eq!(bridges.len(), 2);
        assert!(bridges.iter().all(|b| b.from_highway == 4));
    }

    #[test]
    fn forced_connections_stop_at_the_limit() {
        let highways = vec![
            highway("A", &[(0.0, 1.0), (1.0, 1.0)]),
            highway("B", &[(1.0, 1.0), (1.0, 0.0)]),
            highway("C", &[(1.0, 0.0), (0.0, 0.0)]),
            highway("D", &[(0.0, 0.0), (0.0, 1.0)]),
            highway("E", &[(1.2, 1.1), (1.2, -0.1)]),
        ];
        let config = BuilderConfig {
            max_forced_connections: 1,
            ..planar_config(None)
        };
        let mut bridges = Vec::new();
        let cycle = force_connections(&highways, &mut bridges, &config, &PlanarMetric);

        // E needs two bridges to join the ring
        assert_eq!(bridges.len(), 1);
        assert_eq!(bridges[0].from_highway, 4);
        assert_eq!(cycle.as_slice(), &[0, 1, 2, 3]);
    }
}
