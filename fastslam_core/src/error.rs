// fastslam_core/src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Every failure the estimation engine can report.
///
/// Numerical variants are recoverable inside a step: the updater drops the
/// affected observation or the scheduler discards the affected particle.
/// Input and configuration variants are returned to the caller before any
/// particle state is touched.
#[derive(Debug, Error)]
pub enum SlamError {
    // --- Numerical ---
    #[error("innovation covariance is singular (det = {determinant:e})")]
    SingularInnovation { determinant: f64 },

    #[error("landmark at ({x:.3}, {y:.3}) coincides with the particle position")]
    DegenerateGeometry { x: f64, y: f64 },

    #[error("{what} is not positive definite")]
    NotPositiveDefinite { what: &'static str },

    #[error("non-finite likelihood while {context}")]
    NonFiniteLikelihood { context: &'static str },

    #[error("particle update panicked: {0}")]
    WorkerPanic(String),

    // --- Caller input ---
    #[error("invalid control input: {reason}")]
    InvalidControl { reason: String },

    #[error("invalid observation #{index} (range = {range}, bearing = {bearing}): {reason}")]
    InvalidObservation {
        index: usize,
        range: f64,
        bearing: f64,
        reason: String,
    },

    #[error("particle index {index} out of range (particle count {len})")]
    ParticleIndexOutOfRange { index: usize, len: usize },

    // --- Setup / IO ---
    #[error("invalid filter configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to export landmarks to {path:?}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SlamError {
    /// True for errors that only invalidate a single observation or particle.
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            SlamError::SingularInnovation { .. }
                | SlamError::DegenerateGeometry { .. }
                | SlamError::NotPositiveDefinite { .. }
                | SlamError::NonFiniteLikelihood { .. }
                | SlamError::WorkerPanic(_)
        )
    }
}
