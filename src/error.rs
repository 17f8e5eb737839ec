use thiserror::Error;

use crate::bbox::BBoxError;
use crate::boundary::PartialBoundary;
use crate::pattern::PatternError;
use crate::stitching::StitchFailure;

/// Structured failures of the highway-cycle connection.
///
/// Degraded outcomes always travel inside the error together with the
/// best-effort result, so callers can still draw what was found.
#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("invalid input: {reason}")]
    InvalidInput {
        reason: String,
        highway: Option<String>,
    },

    #[error("cycle incomplete, highways not incorporated: {}", .excluded.join(", "))]
    IncompleteCycle {
        excluded: Vec<String>,
        partial: Box<PartialBoundary>,
    },

    #[error(
        "could not stitch {} highway(s): {}",
        .failures.len(),
        .failures.iter().map(|f| f.highway.as_str()).collect::<Vec<_>>().join(", ")
    )]
    StitchingAmbiguity {
        failures: Vec<StitchFailure>,
        partial: Box<PartialBoundary>,
    },

    #[error("boundary encloses nothing: {distinct_points} distinct point(s)")]
    DegenerateBoundary {
        distinct_points: usize,
        partial: Box<PartialBoundary>,
    },
}

impl BoundaryError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        BoundaryError::InvalidInput {
            reason: reason.into(),
            highway: None,
        }
    }

    pub(crate) fn invalid_highway(reason: impl Into<String>, highway: impl Into<String>) -> Self {
        BoundaryError::InvalidInput {
            reason: reason.into(),
            highway: Some(highway.into()),
        }
    }

    /// The best-effort result carried by degraded outcomes.
    pub fn partial(&self) -> Option<&PartialBoundary> {
        match self {
            BoundaryError::InvalidInput { .. } => None,
            BoundaryError::IncompleteCycle { partial, .. } => Some(partial),
            BoundaryError::StitchingAmbiguity { partial, .. } => Some(partial),
            BoundaryError::DegenerateBoundary { partial, .. } => Some(partial),
        }
    }
}

impl From<BBoxError> for BoundaryError {
    fn from(e: BBoxError) -> Self {
        BoundaryError::invalid(e.to_string())
    }
}

impl From<PatternError> for BoundaryError {
    fn from(e: PatternError) -> Self {
        let pattern = e.pattern().to_string();
        BoundaryError::invalid_highway(e.to_string(), pattern)
    }
}
