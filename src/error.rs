use thiserror::Error;

use crate::boundary::BoundarySet;

/// Error kinds surfaced at the public seams of the pipeline.
///
/// Missing join keys are not an error: they are counted in
/// [`JoinReport`](crate::join::JoinReport) instead.
#[derive(Debug, Error)]
pub enum Error {
    /// One or more requested country codes could not be obtained from either
    /// boundary source. `partial` holds every polygon that was resolved.
    #[error("boundary resolution incomplete, missing country codes: {}", .missing.join(", "))]
    BoundaryResolution {
        missing: Vec<String>,
        partial: Box<BoundarySet>,
    },

    /// Every candidate in a selector chain failed its open probe.
    #[error("no usable raster for {variable}{} after {} attempt(s)",
        .depth.as_deref().map(|d| format!(" ({d})")).unwrap_or_default(),
        .attempts.len())]
    SourceUnavailable {
        variable: String,
        depth: Option<String>,
        attempts: Vec<String>,
    },

    /// A depth layer could not be brought onto the reference grid.
    #[error("cannot align layer {layer} onto the reference grid: {reason}")]
    GridAlignment { layer: String, reason: String },

    /// The statistics step failed on a (possibly materialized) raster.
    #[error("zonal statistics failed for {variable}: {reason}")]
    ZonalComputation { variable: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
