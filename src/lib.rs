//! Closed boundary paths from named OpenStreetMap highways.
//!
//! Given a bounding box and the names of the streets enclosing a region, the
//! [`HighwayGraphBuilder`] joins the streets' segments at their junctions,
//! finds the longest ring of mutually connected streets, bridges small gaps
//! and stitches every street into one continuous run, yielding a single
//! closed [`BoundaryPath`].

pub mod bbox;
pub mod boundary;
pub mod bridging;
pub mod builder;
pub mod config;
pub mod connectivity;
pub mod debug;
pub mod error;
pub mod highway;
pub mod junction;
pub mod metric;
pub mod overpass;
pub mod pattern;
pub mod pbf;
pub mod stitching;

pub use bbox::{BBoxError, BoundingBox};
pub use boundary::{BoundaryPath, BoundaryResult, PartialBoundary, SyntheticEdge, SyntheticKind};
pub use bridging::Bridge;
pub use builder::HighwayGraphBuilder;
pub use config::BuilderConfig;
pub use connectivity::{ConnectivityMatrix, Cycle};
pub use error::BoundaryError;
pub use highway::{Highway, NodeKey, Point, Segment};
pub use junction::JunctionReport;
pub use metric::{DistanceMetric, HaversineMetric, MetricKind, PlanarMetric};
pub use overpass::OverpassClient;
pub use pattern::{NamePattern, PatternError};
pub use pbf::PbfHighwaySource;
pub use stitching::StitchFailure;
