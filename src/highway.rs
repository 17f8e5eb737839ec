use std::collections::BTreeSet;

use geo::{Coord, LineString};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::BoundaryError;
use crate::pattern::NamePattern;

/// Identity of a node for junction purposes: its exact coordinate.
pub type NodeKey = (OrderedFloat<f64>, OrderedFloat<f64>);

/// A (longitude, latitude) coordinate with an optional OSM node id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub coord: Coord<f64>,
    pub id: Option<u64>,
}

impl Point {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self {
            coord: Coord { x: lon, y: lat },
            id: None,
        }
    }

    pub fn with_id(lon: f64, lat: f64, id: u64) -> Self {
        Self {
            coord: Coord { x: lon, y: lat },
            id: Some(id),
        }
    }

    pub fn lon(&self) -> f64 {
        self.coord.x
    }

    pub fn lat(&self) -> f64 {
        self.coord.y
    }

    pub fn key(&self) -> NodeKey {
        // + 0.0 folds -0.0 into 0.0
        (
            OrderedFloat(self.coord.x + 0.0),
            OrderedFloat(self.coord.y + 0.0),
        )
    }
}

/// One continuous piece of a way.
///
/// Points live in an append-only arena; the path is the ordered list of arena
/// indices. Junction insertion adds points to the arena and rewrites the path,
/// so an index handed out once always refers to the same point.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    way_id: Option<u64>,
    arena: Vec<Point>,
    path: Vec<usize>,
}

impl Segment {
    pub fn new(way_id: Option<u64>, points: Vec<Point>) -> Result<Self, BoundaryError> {
        if points.len() < 2 {
            return Err(BoundaryError::invalid(format!(
                "segment {} has {} point(s), need at least 2",
                way_id.map_or_else(|| "without way id".to_string(), |id| id.to_string()),
                points.len()
            )));
        }

        let path = (0..points.len()).collect();
        Ok(Self {
            way_id,
            arena: points,
            path,
        })
    }

    pub fn way_id(&self) -> Option<u64> {
        self.way_id
    }

    /// Number of points along the path.
    pub fn len(&self) -> usize {
        self.path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    pub fn point(&self, position: usize) -> &Point {
        &self.arena[self.path[position]]
    }

    pub fn points(&self) -> impl Iterator<Item = &Point> + '_ {
        self.path.iter().map(|&i| &self.arena[i])
    }

    pub fn first(&self) -> &Point {
        self.point(0)
    }

    pub fn last(&self) -> &Point {
        self.point(self.path.len() - 1)
    }

    /// The first and last point, once if the segment is closed.
    pub fn endpoints(&self) -> Vec<Point> {
        let (first, last) = (*self.first(), *self.last());
        if first.key() == last.key() {
            vec![first]
        } else {
            vec![first, last]
        }
    }

    pub fn keys(&self) -> BTreeSet<NodeKey> {
        self.points().map(Point::key).collect()
    }

    pub fn contains_key(&self, key: &NodeKey) -> bool {
        self.points().any(|p| &p.key() == key)
    }

    pub fn line_string(&self) -> LineString<f64> {
        self.points().map(|p| p.coord).collect()
    }

    /// Redirect the path at `position` to a new arena point.
    pub(crate) fn snap(&mut self, position: usize, point: Point) {
        self.arena.push(point);
        self.path[position] = self.arena.len() - 1;
    }

    /// Insert a new arena point so it sits at `position` in the path.
    pub(crate) fn insert(&mut self, position: usize, point: Point) {
        self.arena.push(point);
        self.path.insert(position, self.arena.len() - 1);
    }
}

/// A named street and every segment matching its pattern.
#[derive(Debug, Clone)]
pub struct Highway {
    pattern: NamePattern,
    pub segments: Vec<Segment>,
}

impl Highway {
    pub fn new(pattern: NamePattern, segments: Vec<Segment>) -> Self {
        Self { pattern, segments }
    }

    /// Compile `name` as a pattern and wrap the given segments.
    pub fn named(name: &str, segments: Vec<Segment>) -> Result<Self, BoundaryError> {
        Ok(Self::new(NamePattern::new(name)?, segments))
    }

    pub fn name(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn pattern(&self) -> &NamePattern {
        &self.pattern
    }

    pub fn points(&self) -> impl Iterator<Item = &Point> + '_ {
        self.segments.iter().flat_map(Segment::points)
    }

    pub fn keys(&self) -> BTreeSet<NodeKey> {
        self.points().map(Point::key).collect()
    }

    pub fn node_count(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }
}

/// Nodes present in both highways, in key order, one point per key.
pub fn shared_nodes(a: &Highway, b: &Highway) -> Vec<Point> {
    let b_keys = b.keys();
    let mut seen = BTreeSet::new();
    let mut shared: Vec<Point> = a
        .points()
        .filter(|p| b_keys.contains(&p.key()) && seen.insert(p.key()))
        .copied()
        .collect();
    shared.sort_by_key(Point::key);
    shared
}
