use std::fmt;
use std::str::FromStr;

use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::highway::Point;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BBoxError {
    #[error("bounding box needs 4 values (min_lon,min_lat,max_lon,max_lat), got {0}")]
    WrongArity(usize),
    #[error("bounding box value {0:?} is not a number")]
    NotANumber(String),
    #[error("bounding box value {0} is not finite")]
    NotFinite(f64),
    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("bounding box is empty: min {min} must be below max {max}")]
    Empty { min: f64, max: f64 },
}

/// Validated longitude/latitude range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self, BBoxError> {
        for v in [min_lon, min_lat, max_lon, max_lat] {
            if !v.is_finite() {
                return Err(BBoxError::NotFinite(v));
            }
        }
        for lon in [min_lon, max_lon] {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(BBoxError::LongitudeOutOfRange(lon));
            }
        }
        for lat in [min_lat, max_lat] {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(BBoxError::LatitudeOutOfRange(lat));
            }
        }
        if min_lon >= max_lon {
            return Err(BBoxError::Empty {
                min: min_lon,
                max: max_lon,
            });
        }
        if min_lat >= max_lat {
            return Err(BBoxError::Empty {
                min: min_lat,
                max: max_lat,
            });
        }

        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    /// Build from a 2x2 range `[[min_lon, max_lon], [min_lat, max_lat]]`.
    pub fn from_ranges(ranges: [[f64; 2]; 2]) -> Result<Self, BBoxError> {
        let [[min_lon, max_lon], [min_lat, max_lat]] = ranges;
        Self::new(min_lon, min_lat, max_lon, max_lat)
    }

    /// The 2x2 range form, rows are longitude and latitude.
    pub fn ranges(&self) -> [[f64; 2]; 2] {
        [
            [self.min_lon, self.max_lon],
            [self.min_lat, self.max_lat],
        ]
    }

    pub fn min_lon(&self) -> f64 {
        self.min_lon
    }

    pub fn min_lat(&self) -> f64 {
        self.min_lat
    }

    pub fn max_lon(&self) -> f64 {
        self.max_lon
    }

    pub fn max_lat(&self) -> f64 {
        self.max_lat
    }

    pub fn rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.min_lon,
                y: self.min_lat,
            },
            Coord {
                x: self.max_lon,
                y: self.max_lat,
            },
        )
    }

    pub fn contains(&self, coord: Coord<f64>) -> bool {
        coord.x >= self.min_lon
            && coord.x <= self.max_lon
            && coord.y >= self.min_lat
            && coord.y <= self.max_lat
    }

    /// Overpass QL bbox filter, ordered south, west, north, east.
    pub fn to_overpass(&self) -> String {
        format!(
            "({},{},{},{})",
            self.min_lat, self.min_lon, self.max_lat, self.max_lon
        )
    }

    /// Split a way into the runs of consecutive nodes inside the box.
    ///
    /// A way leaving and re-entering the box yields several runs; runs with a
    /// single node are dropped.
    pub fn clip(&self, nodes: &[Point]) -> Vec<Vec<Point>> {
        let mut runs = Vec::new();
        let mut current: Vec<Point> = Vec::new();

        for node in nodes {
            if self.contains(node.coord) {
                current.push(*node);
            } else if !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            runs.push(current);
        }

        runs.retain(|run| run.len() > 1);
        runs
    }
}

impl FromStr for BoundingBox {
    type Err = BBoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() != 4 {
            return Err(BBoxError::WrongArity(parts.len()));
        }

        let mut values = [0.0; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse::<f64>()
                .map_err(|_| BBoxError::NotANumber(part.to_string()))?;
        }

        Self::new(values[0], values[1], values[2], values[3])
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}
