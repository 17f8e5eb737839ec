use log::{debug, info, warn};
use serde_json::Value;

use crate::boundary::{BoundaryPath, BoundaryResult, PartialBoundary, assemble};
use crate::bridging::{Bridge, force_connections};
use crate::config::BuilderConfig;
use crate::connectivity::{ConnectivityMatrix, Cycle, longest_cycle};
use crate::debug::DebugVisualizer;
use crate::error::BoundaryError;
use crate::highway::Highway;
use crate::junction::{JunctionReport, insert_junctions};
use crate::metric::DistanceMetric;
use crate::stitching::StitchFailure;

/// Turns named highways into one closed boundary path.
///
/// The phases run in order: junction insertion, connectivity and longest
/// cycle, forced connections, per-highway stitching. Each phase is also
/// exposed on its own for inspection.
#[derive(Debug)]
pub struct HighwayGraphBuilder {
    highways: Vec<Highway>,
    config: BuilderConfig,
    metric: Box<dyn DistanceMetric>,
    bridges: Vec<Bridge>,
    junctions: JunctionReport,
}

impl HighwayGraphBuilder {
    pub fn new(highways: Vec<Highway>, config: BuilderConfig) -> Result<Self, BoundaryError> {
        if highways.is_empty() {
            return Err(BoundaryError::invalid("no highways given"));
        }
        if highways.len() < 3 {
            return Err(BoundaryError::invalid(format!(
                "a closed boundary needs at least 3 highways, got {}",
                highways.len()
            )));
        }
        if !config.junction_tolerance.is_finite() || config.junction_tolerance < 0.0 {
            return Err(BoundaryError::invalid(format!(
                "junction tolerance must be a non-negative number, got {}",
                config.junction_tolerance
            )));
        }
        if let Some(highway) = highways.iter().find(|h| h.segments.is_empty()) {
            return Err(BoundaryError::invalid_highway(
                format!("highway pattern {:?} matched no segments", highway.name()),
                highway.name(),
            ));
        }

        let metric = config.metric.build();
        Ok(Self {
            highways,
            config,
            metric,
            bridges: Vec::new(),
            junctions: JunctionReport::default(),
        })
    }

    /// Replace the distance formula chosen by the configuration.
    pub fn with_metric(mut self, metric: Box<dyn DistanceMetric>) -> Self {
        self.metric = metric;
        self
    }

    pub fn highways(&self) -> &[Highway] {
        &self.highways
    }

    pub fn bridges(&self) -> &[Bridge] {
        &self.bridges
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn insert_junctions(&mut self) -> JunctionReport {
        let report = insert_junctions(
            &mut self.highways,
            self.config.junction_tolerance,
            self.metric.as_ref(),
        );
        self.junctions.snapped += report.snapped;
        self.junctions.inserted += report.inserted;
        report
    }

    pub fn connectivity(&self) -> ConnectivityMatrix {
        ConnectivityMatrix::from_highways(&self.highways, &self.bridges)
    }

    pub fn longest_cycle(&self) -> Cycle {
        longest_cycle(&self.connectivity(), self.config.cycle_search_budget)
    }

    /// Add bridges until the cycle covers every highway or no more can be made.
    pub fn force_connections(&mut self) -> Cycle {
        force_connections(
            &self.highways,
            &mut self.bridges,
            &self.config,
            self.metric.as_ref(),
        )
    }

    pub fn diagnostics(&self, cycle: &Cycle) -> Value {
        DebugVisualizer::highways_geojson(&self.highways, cycle, &self.bridges)
    }

    fn names(&self, cycle: &Cycle) -> Vec<String> {
        cycle
            .iter()
            .map(|h| self.highways[h].name().to_string())
            .collect()
    }

    fn partial(
        &self,
        cycle: Cycle,
        boundary: Option<BoundaryPath>,
        stitch_failures: Vec<StitchFailure>,
    ) -> PartialBoundary {
        PartialBoundary {
            stitch_failures,
            highways: self.names(&cycle),
            diagnostics: self.config.diagnostics.then(|| self.diagnostics(&cycle)),
            cycle,
            boundary,
            bridges: self.bridges.clone(),
            junctions: self.junctions,
        }
    }

    /// Run every phase and produce the closed boundary.
    pub fn build(mut self) -> Result<BoundaryResult, BoundaryError> {
        info!(
            "Connecting {} highways ({} segments, {} nodes)",
            self.highways.len(),
            self.highways.iter().map(|h| h.segments.len()).sum::<usize>(),
            self.highways.iter().map(Highway::node_count).sum::<usize>()
        );

        self.insert_junctions();

        let initial = self.longest_cycle();
        debug!(
            "Initial cycle: {:?} ({} of {})",
            self.names(&initial),
            initial.len(),
            self.highways.len()
        );
        let cycle = if initial.len() == self.highways.len() {
            initial
        } else {
            self.force_connections()
        };

        if cycle.len() < self.highways.len() {
            let excluded: Vec<String> = (0..self.highways.len())
                .filter(|h| !cycle.contains(*h))
                .map(|h| self.highways[h].name().to_string())
                .collect();
            warn!(
                "Cycle incomplete: {} of {} highways, excluded {:?}",
                cycle.len(),
                self.highways.len(),
                excluded
            );

            let (boundary, failures) = if cycle.len() >= 3 {
                let (boundary, failures) = assemble(
                    &cycle,
                    &self.highways,
                    &self.bridges,
                    self.config.max_stitch_attempts,
                    self.metric.as_ref(),
                );
                (Some(boundary), failures)
            } else {
                (None, Vec::new())
            };
            return Err(BoundaryError::IncompleteCycle {
                excluded,
                partial: Box::new(self.partial(cycle, boundary, failures)),
            });
        }

        let (boundary, failures) = assemble(
            &cycle,
            &self.highways,
            &self.bridges,
            self.config.max_stitch_attempts,
            self.metric.as_ref(),
        );
        if !failures.is_empty() {
            return Err(BoundaryError::StitchingAmbiguity {
                partial: Box::new(self.partial(cycle, Some(boundary), failures.clone())),
                failures,
            });
        }
        // Streets meeting only at one junction connect without enclosing anything
        if !boundary.encloses_area() {
            let distinct_points = boundary.distinct_points();
            warn!(
                "Boundary over {:?} collapses to {} distinct point(s)",
                self.names(&cycle),
                distinct_points
            );
            return Err(BoundaryError::DegenerateBoundary {
                distinct_points,
                partial: Box::new(self.partial(cycle, Some(boundary), Vec::new())),
            });
        }

        info!(
            "Boundary closed over {} highways: {} points, {} forced connection(s)",
            cycle.len(),
            boundary.len(),
            self.bridges.len()
        );
        Ok(BoundaryResult {
            highways: self.names(&cycle),
            diagnostics: self.config.diagnostics.then(|| self.diagnostics(&cycle)),
            cycle,
            boundary,
            bridges: self.bridges,
            junctions: self.junctions,
        })
    }
}
