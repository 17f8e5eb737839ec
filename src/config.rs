use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::metric::MetricKind;

/// Tunables of the highway-cycle connection.
///
/// Distances are in the units of the selected metric: metres for
/// `haversine`, degrees for `planar`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Distinct nodes closer than this are merged into one junction
    pub junction_tolerance: f64,
    /// Distance formula used by every stage
    pub metric: MetricKind,
    /// Longest forced connection that may be inserted; `None` for no limit
    pub max_bridge_distance: Option<f64>,
    /// Upper bound on forced connections per run
    pub max_forced_connections: usize,
    /// Segment merges allowed per highway while stitching
    pub max_stitch_attempts: usize,
    /// DFS expansions allowed per longest-cycle search
    pub cycle_search_budget: usize,
    /// Attach a GeoJSON diagnostic overlay to results, partial or not
    pub diagnostics: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            junction_tolerance: 1.0,
            metric: MetricKind::Haversine,
            max_bridge_distance: Some(500.0),
            max_forced_connections: 8,
            max_stitch_attempts: 32,
            cycle_search_budget: 1_000_000,
            diagnostics: false,
        }
    }
}

impl BuilderConfig {
    /// Read a JSON configuration file; missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "junction_tolerance": 2.5, "metric": "planar", "max_bridge_distance": null }}"#
        )
        .unwrap();

        let config = BuilderConfig::from_file(file.path()).unwrap();
        assert_eq!(config.junction_tolerance, 2.5);
        assert_eq!(config.metric, MetricKind::Planar);
        assert_eq!(config.max_bridge_distance, None);
        assert_eq!(
            config.max_stitch_attempts,
            BuilderConfig::default().max_stitch_attempts
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = BuilderConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }
}
