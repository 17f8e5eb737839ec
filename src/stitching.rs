use std::collections::{BTreeMap, BTreeSet};

use log::{debug, trace};
use ordered_float::OrderedFloat;
use petgraph::algo::astar;
use petgraph::prelude::{EdgeRef, UnGraphMap};
use petgraph::unionfind::UnionFind;
use serde::Serialize;

use crate::boundary::{SyntheticEdge, SyntheticKind};
use crate::highway::{Highway, NodeKey, Point};
use crate::metric::DistanceMetric;

/// One highway's continuous path between its two cycle neighbours.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StitchedPath {
    pub highway: usize,
    pub points: Vec<Point>,
    /// Stitch edges the path actually runs along
    pub stitches: Vec<SyntheticEdge>,
}

/// A highway whose pieces could not be joined between its connection points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StitchFailure {
    pub highway: String,
    /// Segment holding the connection to the predecessor
    pub entry_segment: Option<usize>,
    /// Segment holding the connection to the successor
    pub exit_segment: Option<usize>,
    pub reason: String,
}

/// Join the segments of `highway` so that `entry` and `exit` are connected,
/// and return the route between them.
///
/// Segments are merged greedily: each step connects the two closest segment
/// endpoints from different components. That is locally closest, not the
/// globally shortest set of joins.
pub fn stitch_highway(
    highway: &Highway,
    index: usize,
    entry: &Point,
    exit: &Point,
    max_attempts: usize,
    metric: &dyn DistanceMetric,
) -> Result<StitchedPath, StitchFailure> {
    let failure = |entry_segment, exit_segment, reason: String| StitchFailure {
        highway: highway.name().to_string(),
        entry_segment,
        exit_segment,
        reason,
    };

    let segments = &highway.segments;
    let entry_segment = segments.iter().position(|s| s.contains_key(&entry.key()));
    let exit_segment = segments.iter().position(|s| s.contains_key(&exit.key()));
    let (Some(entry_segment), Some(exit_segment)) = (entry_segment, exit_segment) else {
        return Err(failure(
            entry_segment,
            exit_segment,
            "connection point is not a node of the highway".to_string(),
        ));
    };

    // Segments touching at a node form one component
    let mut components = UnionFind::new(segments.len());
    let mut first_owner: BTreeMap<NodeKey, usize> = BTreeMap::new();
    for (s, segment) in segments.iter().enumerate() {
        for key in segment.keys() {
            match first_owner.get(&key) {
                Some(&owner) => {
                    components.union(owner, s);
                }
                None => {
                    first_owner.insert(key, s);
                }
            }
        }
    }

    let mut stitches: Vec<(Point, Point)> = Vec::new();
    let mut attempts = 0;
    while !components.equiv(entry_segment, exit_segment) {
        if attempts >= max_attempts {
            return Err(failure(
                Some(entry_segment),
                Some(exit_segment),
                format!("still disconnected after {} merge attempts", attempts),
            ));
        }
        attempts += 1;

        let Some((a, b, pa, pb, distance)) = closest_unjoined_segments(highway, &components, metric)
        else {
            return Err(failure(
                Some(entry_segment),
                Some(exit_segment),
                "no segments left to merge".to_string(),
            ));
        };
        trace!(
            "Stitching {} segments {} and {} over {:.2} {}",
            highway.name(),
            a,
            b,
            distance,
            metric.name()
        );
        components.union(a, b);
        stitches.push((pa, pb));
    }

    // Route along the merged segments
    let mut nodes: BTreeMap<NodeKey, usize> = BTreeMap::new();
    let mut points: Vec<Point> = Vec::new();
    let mut node_of = |p: &Point| {
        *nodes.entry(p.key()).or_insert_with(|| {
            points.push(*p);
            points.len() - 1
        })
    };

    let mut graph: UnGraphMap<usize, f64> = UnGraphMap::new();
    for segment in segments {
        let ids: Vec<usize> = segment.points().map(&mut node_of).collect();
        for &id in &ids {
            graph.add_node(id);
        }
        for (w, pair) in ids.windows(2).enumerate() {
            if pair[0] != pair[1] {
                let d = metric.distance(segment.point(w).coord, segment.point(w + 1).coord);
                graph.add_edge(pair[0], pair[1], d);
            }
        }
    }
    let mut stitch_pairs = BTreeSet::new();
    for (pa, pb) in &stitches {
        let (a, b) = (node_of(pa), node_of(pb));
        if a != b {
            graph.add_edge(a, b, metric.distance(pa.coord, pb.coord));
            stitch_pairs.insert((a.min(b), a.max(b)));
        }
    }

    let (start, goal) = (node_of(entry), node_of(exit));
    let Some((length, route)) = astar(&graph, start, |n| n == goal, |e| *e.weight(), |_| 0.0)
    else {
        return Err(failure(
            Some(entry_segment),
            Some(exit_segment),
            "no route between connection points".to_string(),
        ));
    };

    let used_stitches = route
        .windows(2)
        .filter(|w| stitch_pairs.contains(&(w[0].min(w[1]), w[0].max(w[1]))))
        .map(|w| SyntheticEdge {
            from: points[w[0]].coord,
            to: points[w[1]].coord,
            kind: SyntheticKind::Stitch,
        })
        .collect::<Vec<_>>();

    debug!(
        "{}: {} node path of {:.1} {} with {} stitch(es)",
        highway.name(),
        route.len(),
        length,
        metric.name(),
        used_stitches.len()
    );

    Ok(StitchedPath {
        highway: index,
        points: route.into_iter().map(|id| points[id]).collect(),
        stitches: used_stitches,
    })
}

fn closest_unjoined_segments(
    highway: &Highway,
    components: &UnionFind<usize>,
    metric: &dyn DistanceMetric,
) -> Option<(usize, usize, Point, Point, f64)> {
    let segments = &highway.segments;
    let mut best: Option<(usize, usize, Point, Point, f64)> = None;

    for a in 0..segments.len() {
        for b in a + 1..segments.len() {
            if components.equiv(a, b) {
                continue;
            }
            for pa in segments[a].endpoints() {
                for pb in segments[b].endpoints() {
                    let d = metric.distance(pa.coord, pb.coord);
                    if best.is_none_or(|(_, _, _, _, bd)| OrderedFloat(d) < OrderedFloat(bd)) {
                        best = Some((a, b, pa, pb, d));
                    }
                }
            }
        }
    }

    best
}
