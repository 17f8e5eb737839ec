use std::collections::BTreeSet;

use geo::{Coord, LineString};
use log::{debug, warn};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::bridging::Bridge;
use crate::connectivity::Cycle;
use crate::highway::{Highway, Point, shared_nodes};
use crate::junction::JunctionReport;
use crate::metric::DistanceMetric;
use crate::stitching::{StitchFailure, stitch_highway};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyntheticKind {
    /// Forced connection between two highways
    Bridge,
    /// Join between two segments of one highway
    Stitch,
    /// Stretch of a highway that could not be stitched
    Gap,
}

/// An edge of the boundary that is not part of the OSM geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SyntheticEdge {
    pub from: Coord<f64>,
    pub to: Coord<f64>,
    pub kind: SyntheticKind,
}

/// Closed, ordered perimeter of the enclosed region.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoundaryPath {
    pub points: Vec<Point>,
    pub synthetic_edges: Vec<SyntheticEdge>,
}

impl BoundaryPath {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => self.points.len() > 1 && first.key() == last.key(),
            _ => false,
        }
    }

    pub fn distinct_points(&self) -> usize {
        self.points
            .iter()
            .map(Point::key)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Closed and spanning at least three distinct points.
    pub fn encloses_area(&self) -> bool {
        self.is_closed() && self.distinct_points() >= 3
    }

    pub fn count(&self, kind: SyntheticKind) -> usize {
        self.synthetic_edges.iter().filter(|e| e.kind == kind).count()
    }

    pub fn line_string(&self) -> LineString<f64> {
        self.points.iter().map(|p| p.coord).collect()
    }

    /// GeoJSON FeatureCollection with the boundary as a single LineString.
    pub fn to_geojson(&self, complete: bool, highways: &[String]) -> Value {
        let coordinates: Vec<Vec<f64>> = self.points.iter().map(|p| vec![p.lon(), p.lat()]).collect();

        json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {
                    "complete": complete,
                    "highways": highways,
                    "bridges": self.count(SyntheticKind::Bridge),
                    "stitches": self.count(SyntheticKind::Stitch),
                    "gaps": self.count(SyntheticKind::Gap),
                },
                "geometry": {
                    "type": "LineString",
                    "coordinates": coordinates
                }
            }]
        })
    }
}

/// Successful connection of every requested highway.
#[derive(Debug, Clone, Serialize)]
pub struct BoundaryResult {
    pub cycle: Cycle,
    /// Highway names in cycle order
    pub highways: Vec<String>,
    pub boundary: BoundaryPath,
    pub bridges: Vec<Bridge>,
    pub junctions: JunctionReport,
    pub diagnostics: Option<Value>,
}

/// Best-effort state returned with a degraded outcome.
#[derive(Debug, Clone, Serialize)]
pub struct PartialBoundary {
    pub cycle: Cycle,
    /// Highway names in cycle order
    pub highways: Vec<String>,
    /// Perimeter over the partial cycle, when it has at least three highways
    pub boundary: Option<BoundaryPath>,
    pub bridges: Vec<Bridge>,
    pub junctions: JunctionReport,
    /// Highways of the cycle that could not be stitched
    pub stitch_failures: Vec<StitchFailure>,
    pub diagnostics: Option<Value>,
}

/// Where two consecutive cycle highways meet.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Connection {
    /// Point on the earlier highway
    leave: Point,
    /// Point on the later highway; equal to `leave` unless bridged
    enter: Point,
    bridged: bool,
}

fn connection(
    a: usize,
    b: usize,
    highways: &[Highway],
    bridges: &[Bridge],
    centre: Coord<f64>,
    metric: &dyn DistanceMetric,
) -> Option<Connection> {
    let mut candidates: Vec<Connection> = shared_nodes(&highways[a], &highways[b])
        .into_iter()
        .map(|p| Connection {
            leave: p,
            enter: p,
            bridged: false,
        })
        .collect();
    for bridge in bridges.iter().filter(|br| br.joins(a, b)) {
        if let (Some(leave), Some(enter)) = (bridge.end_on(a), bridge.end_on(b)) {
            candidates.push(Connection {
                leave,
                enter,
                bridged: true,
            });
        }
    }

    // Parallel carriageways and repeated crossings give several candidates;
    // the one facing the enclosed region is closest to its centre
    candidates
        .into_iter()
        .enumerate()
        .min_by_key(|(i, c)| (OrderedFloat(metric.distance(c.leave.coord, centre)), *i))
        .map(|(_, c)| c)
}

fn centre_of(cycle: &Cycle, highways: &[Highway]) -> Coord<f64> {
    let (mut x, mut y, mut n) = (0.0, 0.0, 0usize);
    for p in cycle.iter().flat_map(|h| highways[h].points()) {
        x += p.coord.x;
        y += p.coord.y;
        n += 1;
    }
    if n == 0 {
        return Coord { x: 0.0, y: 0.0 };
    }
    Coord {
        x: x / n as f64,
        y: y / n as f64,
    }
}

fn push_point(path: &mut BoundaryPath, point: Point) {
    if path.points.last().map(Point::key) != Some(point.key()) {
        path.points.push(point);
    }
}

/// Concatenate the stitched paths of every cycle highway into a closed loop.
///
/// Highways that cannot be stitched contribute a gap edge between their two
/// connection points and are reported back as failures.
pub(crate) fn assemble(
    cycle: &Cycle,
    highways: &[Highway],
    bridges: &[Bridge],
    max_stitch_attempts: usize,
    metric: &dyn DistanceMetric,
) -> (BoundaryPath, Vec<StitchFailure>) {
    let order = cycle.as_slice();
    let k = order.len();
    let centre = centre_of(cycle, highways);

    let mut connections = Vec::with_capacity(k);
    for (a, b) in cycle.pairs() {
        match connection(a, b, highways, bridges, centre, metric) {
            Some(c) => connections.push(c),
            None => {
                // The cycle only contains connected pairs, so this is a bug
                // upstream rather than bad data
                warn!(
                    "No connection between {} and {}",
                    highways[a].name(),
                    highways[b].name()
                );
                return (
                    BoundaryPath::default(),
                    vec![StitchFailure {
                        highway: highways[a].name().to_string(),
                        entry_segment: None,
                        exit_segment: None,
                        reason: format!("no connection to {}", highways[b].name()),
                    }],
                );
            }
        }
    }

    let mut path = BoundaryPath::default();
    let mut failures = Vec::new();

    for (j, &h) in order.iter().enumerate() {
        let incoming = connections[(j + k - 1) % k];
        let outgoing = connections[j];
        let (entry, exit) = (incoming.enter, outgoing.leave);

        if j > 0 && incoming.bridged {
            path.synthetic_edges.push(SyntheticEdge {
                from: incoming.leave.coord,
                to: incoming.enter.coord,
                kind: SyntheticKind::Bridge,
            });
        }

        match stitch_highway(&highways[h], h, &entry, &exit, max_stitch_attempts, metric) {
            Ok(stitched) => {
                path.synthetic_edges.extend(stitched.stitches);
                for point in stitched.points {
                    push_point(&mut path, point);
                }
            }
            Err(failure) => {
                warn!("Stitching {} failed: {}", failure.highway, failure.reason);
                push_point(&mut path, entry);
                push_point(&mut path, exit);
                if entry.key() != exit.key() {
                    path.synthetic_edges.push(SyntheticEdge {
                        from: entry.coord,
                        to: exit.coord,
                        kind: SyntheticKind::Gap,
                    });
                }
                failures.push(failure);
            }
        }
    }

    // Close the loop back onto the first highway's entry point
    let closing = connections[k - 1];
    if closing.bridged {
        path.synthetic_edges.push(SyntheticEdge {
            from: closing.leave.coord,
            to: closing.enter.coord,
            kind: SyntheticKind::Bridge,
        });
        path.points.push(closing.enter);
    } else if let Some(first) = path.points.first().copied() {
        if path.points.last().map(Point::key) != Some(first.key()) {
            path.points.push(first);
        }
    }

    debug!(
        "Assembled boundary of {} points ({} bridge, {} stitch, {} gap edges)",
        path.len(),
        path.count(SyntheticKind::Bridge),
        path.count(SyntheticKind::Stitch),
        path.count(SyntheticKind::Gap)
    );
    (path, failures)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_requires_equal_ends() {
        let mut path = BoundaryPath {
            points: vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(1.0, 1.0)],
            synthetic_edges: Vec::new(),
        };
        assert!(!path.is_closed());
        path.points.push(Point::new(0.0, 0.0));
        assert!(path.is_closed());
        assert!(path.encloses_area());
    }

    #[test]
    fn closed_back_and_forth_encloses_nothing() {
        let path = BoundaryPath {
            points: vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 0.0)],
            synthetic_edges: Vec::new(),
        };
        assert!(path.is_closed());
        assert_eq!(path.distinct_points(), 2);
        assert!(!path.encloses_area());
    }

    #[test]
    fn geojson_has_one_linestring() {
        let path = BoundaryPath {
            points: vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 0.0)],
            synthetic_edges: vec![SyntheticEdge {
                from: Coord { x: 1.0, y: 0.0 },
                to: Coord { x: 0.0, y: 0.0 },
                kind: SyntheticKind::Bridge,
            }],
        };
        let geojson = path.to_geojson(true, &["A".to_string()]);
        let feature = &geojson["features"][0];
        assert_eq!(feature["geometry"]["type"], "LineString");
        assert_eq!(feature["geometry"]["coordinates"][1], json!([1.0, 0.0]));
        assert_eq!(feature["properties"]["bridges"], 1);
        assert_eq!(feature["properties"]["complete"], true);
    }
}
