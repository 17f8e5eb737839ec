use std::collections::BTreeMap;

use geo::{BoundingRect, Closest, ClosestPoint, Coord, Line};
use log::{debug, info, trace, warn};
use ordered_float::OrderedFloat;
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree, RTreeObject};
use serde::Serialize;

use crate::highway::{Highway, NodeKey, Point};
use crate::metric::DistanceMetric;

/// What a junction pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JunctionReport {
    /// Nodes moved onto a near-coincident node of an earlier segment
    pub snapped: usize,
    /// Segment endpoints inserted into the interior of another segment's edge
    pub inserted: usize,
}

impl JunctionReport {
    pub fn is_empty(&self) -> bool {
        self.snapped == 0 && self.inserted == 0
    }
}

type IndexedNode = GeomWithData<[f64; 2], Point>;

// Edge between path positions `position` and `position + 1` of a segment
struct IndexedEdge {
    line: Line<f64>,
    highway: usize,
    segment: usize,
    position: usize,
}

impl RTreeObject for IndexedEdge {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        let bbox = self.line.bounding_rect();
        AABB::from_corners([bbox.min().x, bbox.min().y], [bbox.max().x, bbox.max().y])
    }
}

fn search_box(at: Coord<f64>, tolerance: f64, metric: &dyn DistanceMetric) -> AABB<[f64; 2]> {
    let (dx, dy) = metric.search_extent(at, tolerance);
    AABB::from_corners([at.x - dx, at.y - dy], [at.x + dx, at.y + dy])
}

/// Passes after which junction insertion gives up on reaching a fixed point.
const MAX_ROUNDS: usize = 16;

/// Make near-coincident nodes of different segments actual shared nodes.
///
/// Runs over every pair of segments, across highways and between segments of
/// the same highway, never within one segment. Snapping and edge splitting
/// repeat until neither changes anything, so running it twice changes nothing
/// the second time.
pub fn insert_junctions(
    highways: &mut [Highway],
    tolerance: f64,
    metric: &dyn DistanceMetric,
) -> JunctionReport {
    let mut report = JunctionReport::default();

    for round in 1..=MAX_ROUNDS {
        let step = JunctionReport {
            snapped: snap_nearby_nodes(highways, tolerance, metric),
            inserted: split_edges_at_endpoints(highways, tolerance, metric),
        };
        if step.is_empty() {
            break;
        }
        trace!("Junction round {}: {:?}", round, step);
        report.snapped += step.snapped;
        report.inserted += step.inserted;
        if round == MAX_ROUNDS {
            warn!(
                "Junction insertion still changing after {} rounds, stopping",
                MAX_ROUNDS
            );
        }
    }

    info!(
        "Junction insertion: {} node(s) snapped, {} node(s) inserted (tolerance {} {})",
        report.snapped,
        report.inserted,
        tolerance,
        metric.name()
    );
    report
}

/// Snap each node onto the nearest node of an earlier segment within tolerance.
fn snap_nearby_nodes(
    highways: &mut [Highway],
    tolerance: f64,
    metric: &dyn DistanceMetric,
) -> usize {
    // Holds the final nodes of every segment processed so far
    let mut tree: RTree<IndexedNode> = RTree::new();
    let mut snapped = 0;

    for h in 0..highways.len() {
        for s in 0..highways[h].segments.len() {
            let segment = &highways[h].segments[s];
            let mut snaps: Vec<(usize, Point)> = Vec::new();

            for (position, point) in segment.points().enumerate() {
                let Some(anchor) = nearest_anchor(&tree, point.coord, tolerance, metric) else {
                    continue;
                };
                if anchor.key() == point.key() {
                    continue;
                }

                // Two neighbouring nodes snapping onto one anchor would
                // collapse an edge
                let previous = snaps
                    .last()
                    .filter(|(p, _)| p + 1 == position)
                    .map(|(_, a)| a.key())
                    .or_else(|| position.checked_sub(1).map(|p| segment.point(p).key()));
                let next = (position + 1 < segment.len()).then(|| segment.point(position + 1).key());
                if previous == Some(anchor.key()) || next == Some(anchor.key()) {
                    trace!(
                        "Not snapping {:?} of {} segment {}: would duplicate a neighbour",
                        point.coord,
                        highways[h].name(),
                        s
                    );
                    continue;
                }

                snaps.push((position, anchor));
            }

            let segment = &mut highways[h].segments[s];
            for (position, anchor) in snaps {
                debug!(
                    "Snapping {:?} -> {:?} ({} segment {})",
                    segment.point(position).coord,
                    anchor.coord,
                    h,
                    s
                );
                segment.snap(position, anchor);
                snapped += 1;
            }

            for point in segment.points() {
                tree.insert(GeomWithData::new([point.coord.x, point.coord.y], *point));
            }
        }
    }

    snapped
}

fn nearest_anchor(
    tree: &RTree<IndexedNode>,
    at: Coord<f64>,
    tolerance: f64,
    metric: &dyn DistanceMetric,
) -> Option<Point> {
    tree.locate_in_envelope_intersecting(&search_box(at, tolerance, metric))
        .map(|node| (metric.distance(at, node.data.coord), node.data))
        .filter(|(distance, _)| *distance <= tolerance)
        .min_by_key(|(distance, anchor)| (OrderedFloat(*distance), anchor.key()))
        .map(|(_, anchor)| anchor)
}

/// Insert segment endpoints that touch another segment's edge between nodes.
fn split_edges_at_endpoints(
    highways: &mut [Highway],
    tolerance: f64,
    metric: &dyn DistanceMetric,
) -> usize {
    let mut edges = Vec::new();
    for (h, highway) in highways.iter().enumerate() {
        for (s, segment) in highway.segments.iter().enumerate() {
            for position in 0..segment.len() - 1 {
                let (a, b) = (segment.point(position), segment.point(position + 1));
                if a.key() != b.key() {
                    edges.push(IndexedEdge {
                        line: Line::new(a.coord, b.coord),
                        highway: h,
                        segment: s,
                        position,
                    });
                }
            }
        }
    }
    let tree = RTree::bulk_load(edges);

    // (highway, segment) -> [(position, distance along edge, endpoint)]
    let mut splits: BTreeMap<(usize, usize), Vec<(usize, OrderedFloat<f64>, Point)>> =
        BTreeMap::new();

    for (h, highway) in highways.iter().enumerate() {
        for (s, segment) in highway.segments.iter().enumerate() {
            for endpoint in segment.endpoints() {
                let key = endpoint.key();
                for (edge, along) in
                    edges_within(&tree, highways, (h, s), &endpoint, &key, tolerance, metric)
                {
                    let pending = splits.entry((edge.highway, edge.segment)).or_default();
                    if pending.iter().any(|(_, _, p)| p.key() == key) {
                        continue;
                    }
                    debug!(
                        "Endpoint {:?} of {} segment {} lies on {} segment {} edge {}",
                        endpoint.coord,
                        highway.name(),
                        s,
                        highways[edge.highway].name(),
                        edge.segment,
                        edge.position
                    );
                    pending.push((edge.position, OrderedFloat(along), endpoint));
                }
            }
        }
    }

    let mut inserted = 0;
    for ((h, s), mut pending) in splits {
        // Back to front so earlier positions stay valid; on a shared edge the
        // farthest point goes in first and closer ones are placed before it
        pending.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
        let segment = &mut highways[h].segments[s];
        for (position, _, point) in pending {
            segment.insert(position + 1, point);
            inserted += 1;
        }
    }

    inserted
}

/// The nearest edge within tolerance of every other segment, with the distance
/// from that edge's start to the projected endpoint.
fn edges_within<'t>(
    tree: &'t RTree<IndexedEdge>,
    highways: &[Highway],
    own: (usize, usize),
    endpoint: &Point,
    key: &NodeKey,
    tolerance: f64,
    metric: &dyn DistanceMetric,
) -> Vec<(&'t IndexedEdge, f64)> {
    let mut nearest: BTreeMap<(usize, usize), (&'t IndexedEdge, OrderedFloat<f64>, f64)> =
        BTreeMap::new();

    for edge in tree.locate_in_envelope_intersecting(&search_box(endpoint.coord, tolerance, metric)) {
        let owner = (edge.highway, edge.segment);
        if owner == own || highways[edge.highway].segments[edge.segment].contains_key(key) {
            continue;
        }
        let projected = match edge.line.closest_point(&geo::Point::from(endpoint.coord)) {
            Closest::SinglePoint(p) | Closest::Intersection(p) => p.0,
            Closest::Indeterminate => continue,
        };
        // Landing on a node is the snapping pass's business
        if projected == edge.line.start || projected == edge.line.end {
            continue;
        }
        let distance = OrderedFloat(metric.distance(endpoint.coord, projected));
        if distance.0 > tolerance {
            continue;
        }
        let closer = nearest.get(&owner).is_none_or(|(best, best_distance, _)| {
            (distance, edge.position) < (*best_distance, best.position)
        });
        if closer {
            nearest.insert(
                owner,
                (edge, distance, metric.distance(edge.line.start, projected)),
            );
        }
    }

    nearest
        .into_values()
        .map(|(edge, _, along)| (edge, along))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highway::Segment;
    use crate::metric::{HaversineMetric, PlanarMetric};

    fn highway(name: &str, segments: &[&[(f64, f64)]]) -> Highway {
        let segments = segments
            .iter()
            .map(|coords| {
                Segment::new(None, coords.iter().map(|&(x, y)| Point::new(x, y)).collect())
                    .unwrap()
            })
            .collect();
        Highway::named(name, segments).unwrap()
    }

    fn coords(h: &Highway) -> Vec<Vec<(f64, f64)>> {
        h.segments
            .iter()
            .map(|s| s.points().map(|p| (p.coord.x, p.coord.y)).collect())
            .collect()
    }

    #[test]
    fn near_miss_nodes_are_snapped_to_the_earlier_segment() {
        let mut highways = vec![
            highway("A", &[&[(0.0, 0.0), (1.0, 0.0)]]),
            highway("B", &[&[(1.0005, 0.0003), (1.0, 1.0)]]),
        ];
        let report = insert_junctions(&mut highways, 0.001, &PlanarMetric);

        assert_eq!(report.snapped, 1);
        assert_eq!(highways[1].segments[0].first().coord, Coord { x: 1.0, y: 0.0 });
        assert_eq!(coords(&highways[0]), vec![vec![(0.0, 0.0), (1.0, 0.0)]]);
    }

    #[test]
    fn endpoint_on_edge_becomes_a_node() {
        // B ends on the middle of A without a shared node
        let mut highways = vec![
            highway("A", &[&[(0.0, 0.0), (2.0, 0.0)]]),
            highway("B", &[&[(1.0, 0.0), (1.0, 1.0)]]),
        ];
        let report = insert_junctions(&mut highways, 0.001, &PlanarMetric);

        assert_eq!(report, JunctionReport { snapped: 0, inserted: 1 });
        assert_eq!(
            coords(&highways[0]),
            vec![vec![(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]]
        );
    }

    #[test]
    fn several_endpoints_on_one_edge_keep_order() {
        let mut highways = vec![
            highway("A", &[&[(0.0, 0.0), (3.0, 0.0)]]),
            highway("B", &[&[(2.0, 0.0005), (2.0, 1.0)]]),
            highway("C", &[&[(1.0, -0.0005), (1.0, -1.0)]]),
        ];
        insert_junctions(&mut highways, 0.001, &PlanarMetric);

        let xs: Vec<f64> = highways[0].segments[0].points().map(|p| p.coord.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn segments_of_one_highway_are_joined() {
        let mut highways = vec![highway(
            "A",
            &[&[(0.0, 0.0), (1.0, 0.0)], &[(1.0002, 0.0), (2.0, 0.0)]],
        )];
        let report = insert_junctions(&mut highways, 0.001, &PlanarMetric);
        assert_eq!(report.snapped, 1);
        assert_eq!(highways[0].segments[1].first().coord, Coord { x: 1.0, y: 0.0 });
    }

    #[test]
    fn no_junctions_within_a_single_segment() {
        // Hairpin: nodes 1 and 3 are close but belong to the same segment
        let mut highways = vec![highway(
            "A",
            &[&[(0.0, 0.0), (1.0, 0.0), (1.0, 0.5), (1.0003, 0.0), (2.0, 0.0)]],
        )];
        let before = coords(&highways[0]);
        let report = insert_junctions(&mut highways, 0.001, &PlanarMetric);
        assert!(report.is_empty());
        assert_eq!(coords(&highways[0]), before);
    }

    #[test]
    fn second_run_changes_nothing() {
        let mut highways = vec![
            highway("A", &[&[(144.96, -37.81), (144.97, -37.81)]]),
            highway("B", &[&[(144.970004, -37.810003), (144.97, -37.80)]]),
            highway("C", &[&[(144.965, -37.810005), (144.965, -37.82)]]),
        ];
        let metric = HaversineMetric;
        let first = insert_junctions(&mut highways, 1.0, &metric);
        assert_eq!(first, JunctionReport { snapped: 1, inserted: 1 });

        let snapshot: Vec<_> = highways.iter().map(coords).collect();
        let second = insert_junctions(&mut highways, 1.0, &metric);
        assert!(second.is_empty());
        assert_eq!(highways.iter().map(coords).collect::<Vec<_>>(), snapshot);
    }

    #[test]
    fn endpoint_next_to_a_crossing_joins_both_streets() {
        // A and B cross without a node; C starts just off the crossing
        let mut highways = vec![
            highway("A", &[&[(0.0, 0.0), (2.0, 0.0)]]),
            highway("B", &[&[(1.0, -1.0), (1.0, 1.0)]]),
            highway("C", &[&[(1.0005, 0.0005), (3.0, 3.0)]]),
        ];
        let first = insert_junctions(&mut highways, 0.001, &PlanarMetric);
        assert_eq!(first, JunctionReport { snapped: 0, inserted: 2 });
        assert_eq!(highways[0].segments[0].len(), 3);
        assert_eq!(highways[1].segments[0].len(), 3);

        let snapshot: Vec<_> = highways.iter().map(coords).collect();
        let second = insert_junctions(&mut highways, 0.001, &PlanarMetric);
        assert!(second.is_empty());
        assert_eq!(highways.iter().map(coords).collect::<Vec<_>>(), snapshot);
    }
}
