use std::fmt;

use geo::{Coord, Distance, Euclidean, Haversine, Point};
use serde::{Deserialize, Serialize};

/// Metres per degree of latitude, rounded down so degree boxes derived from
/// it are never too small.
const METRES_PER_DEGREE: f64 = 111_000.0;

/// Distance formula shared by every stage of the connection.
///
/// Junction insertion, forced connections and stitching all measure with the
/// same metric so that decisions are reproducible for identical input.
pub trait DistanceMetric: fmt::Debug + Send + Sync {
    fn distance(&self, a: Coord<f64>, b: Coord<f64>) -> f64;

    /// Half-widths (in degrees of longitude and latitude) of a box around
    /// `at` containing every coordinate within `radius`.
    fn search_extent(&self, at: Coord<f64>, radius: f64) -> (f64, f64);

    fn name(&self) -> &'static str;
}

/// Great-circle distance in metres.
#[derive(Debug, Clone, Copy, Default)]
pub struct HaversineMetric;

impl DistanceMetric for HaversineMetric {
    fn distance(&self, a: Coord<f64>, b: Coord<f64>) -> f64 {
        Haversine.distance(Point::from(a), Point::from(b))
    }

    fn search_extent(&self, at: Coord<f64>, radius: f64) -> (f64, f64) {
        let dlat = radius / METRES_PER_DEGREE;
        // Shrinking meridians; clamp near the poles.
        let cos_lat = at.y.to_radians().cos().abs().max(0.01);
        (dlat / cos_lat, dlat)
    }

    fn name(&self) -> &'static str {
        "haversine"
    }
}

/// Planar distance in raw coordinate degrees.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarMetric;

impl DistanceMetric for PlanarMetric {
    fn distance(&self, a: Coord<f64>, b: Coord<f64>) -> f64 {
        Euclidean.distance(Point::from(a), Point::from(b))
    }

    fn search_extent(&self, _at: Coord<f64>, radius: f64) -> (f64, f64) {
        (radius, radius)
    }

    fn name(&self) -> &'static str {
        "planar"
    }
}

/// Metric selection as it appears in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    #[default]
    Haversine,
    Planar,
}

impl MetricKind {
    pub fn build(self) -> Box<dyn DistanceMetric> {
        match self {
            MetricKind::Haversine => Box::new(HaversineMetric),
            MetricKind::Planar => Box::new(PlanarMetric),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_search_extent_covers_radius() {
        let at = Coord {
            x: 144.96,
            y: -37.81,
        };
        let metric = HaversineMetric;
        let (dx, dy) = metric.search_extent(at, 100.0);

        let east = Coord {
            x: at.x + dx,
            y: at.y,
        };
        let north = Coord {
            x: at.x,
            y: at.y + dy,
        };
        assert!(metric.distance(at, east) >= 100.0);
        assert!(metric.distance(at, north) >= 100.0);
    }

    #[test]
    fn planar_is_euclidean_in_degrees() {
        let d = PlanarMetric.distance(Coord { x: 0.0, y: 0.0 }, Coord { x: 3.0, y: 4.0 });
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn metric_kind_from_config_name() {
        let kind: MetricKind = serde_json::from_str("\"planar\"").unwrap();
        assert_eq!(kind, MetricKind::Planar);
        assert_eq!(kind.build().name(), "planar");
    }
}
