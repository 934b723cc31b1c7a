// fastslam_core/src/slam/mod.rs

use crate::error::SlamError;
use crate::messages::{SlamInput, StepReport};
use crate::types::{Point2, Pose};

pub mod export;
pub mod fast_slam;

pub use fast_slam::FastSlam;

/// The contract for an algorithm that estimates the robot pose and a map of
/// point landmarks at the same time.
pub trait SlamSystem: Send + Sync {
    /// Folds one control + observation batch into the estimate.
    fn process(&mut self, input: &SlamInput) -> Result<StepReport, SlamError>;

    /// The current best estimate of the robot pose.
    fn estimated_pose(&self) -> Pose;

    /// The current best estimate of the landmark map.
    fn estimated_map(&self) -> Vec<Point2>;
}
