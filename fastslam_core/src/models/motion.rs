// fastslam_core/src/models/motion.rs

use rand_distr::{Distribution, Normal};

use crate::config::MotionNoise;
use crate::models::MotionModel;
use crate::types::{normalize_angle, Control, Pose, SlamRng};

/// Rotate-then-translate odometry model.
///
/// The heading change is applied first, then the robot travels `distance`
/// along the new heading. Noise is additive and Gaussian on the heading change
/// and on each translated axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct OdometryMotionModel;

fn sample(std: f64, rng: &mut SlamRng) -> f64 {
    if std <= 0.0 {
        return 0.0;
    }
    // `std` is validated positive and finite by `FilterConfig::validate`.
    match Normal::new(0.0, std) {
        Ok(dist) => dist.sample(rng),
        Err(_) => 0.0,
    }
}

impl MotionModel for OdometryMotionModel {
    fn advance(
        &self,
        pose: &Pose,
        control: &Control,
        noise: &MotionNoise,
        rng: &mut SlamRng,
    ) -> Pose {
        let theta = normalize_angle(
            pose.theta + control.delta_heading + sample(noise.rotation_std, rng),
        );
        let x = pose.x + control.distance * theta.cos() + sample(noise.translation_std, rng);
        let y = pose.y + control.distance * theta.sin() + sample(noise.translation_std, rng);

        Pose { x, y, theta }
    }
}
