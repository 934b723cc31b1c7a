// fastslam_core/src/models/mod.rs

use std::fmt::Debug;

use crate::config::MotionNoise;
use crate::types::{Control, Pose, SlamRng};

pub mod motion;
pub mod observation;

pub use motion::OdometryMotionModel;
pub use observation::{Linearization, RangeBearingModel};

// --- MOTION MODEL TRAIT ---
/// Represents how a robot pose evolves under one odometry increment.
/// Implementations should be `Send + Sync`; every worker thread shares one instance.
pub trait MotionModel: Debug + Send + Sync {
    /// Propagates `pose` by `control`, perturbed by `noise`.
    ///
    /// # Arguments
    /// * `pose`: Pose before the move.
    /// * `control`: Commanded odometry increment.
    /// * `noise`: Standard deviations to sample from. All-zero noise must not
    ///   consume random numbers.
    /// * `rng`: The particle's private random stream.
    ///
    /// # Returns
    /// The new pose, heading wrapped into (-π, π].
    fn advance(
        &self,
        pose: &Pose,
        control: &Control,
        noise: &MotionNoise,
        rng: &mut SlamRng,
    ) -> Pose;
}
