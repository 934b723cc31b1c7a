// fastslam_core/src/messages.rs

use serde::{Deserialize, Serialize};

use crate::types::{Control, Observation};

// =========================================================================
// == Filter Input ==
// =========================================================================

/// One time step worth of data: the odometry since the previous step and
/// every landmark sighting made after it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlamInput {
    pub control: Control,
    pub observations: Vec<Observation>,
}

impl SlamInput {
    pub fn new(control: Control, observations: Vec<Observation>) -> Self {
        Self {
            control,
            observations,
        }
    }
}

// =========================================================================
// == Filter Output ==
// =========================================================================

/// Summary of what a single `step` did, summed over all particles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StepReport {
    /// 1-based index of the step.
    pub step: u64,
    /// Particles whose update errored or panicked this step.
    pub failed_particles: usize,
    pub landmarks_created: usize,
    pub landmarks_updated: usize,
    /// Observations discarded after a numerical failure.
    pub observations_dropped: usize,
    pub landmarks_pruned: usize,
    /// Effective sample size after normalization, before any resampling.
    pub effective_sample_size: f64,
    /// Weights had to be reset to uniform.
    pub degenerate_weights: bool,
    pub resampled: bool,
}
