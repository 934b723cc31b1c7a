// fastslam_core/src/types.rs

use nalgebra::{Vector2, Vector3};
use num_traits::{Float, FloatConst};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::SlamError;

/// The random number generator used by every stochastic part of the filter.
/// A concrete type keeps sampling deterministic for a given seed.
pub type SlamRng = ChaCha8Rng;

/// Largest angle magnitude accepted from callers. Anything above a full turn
/// almost certainly arrived in degrees instead of radians.
pub const MAX_INPUT_ANGLE: f64 = 2.0 * std::f64::consts::PI;

/// Wraps an angle into the half-open interval (-π, π].
pub fn normalize_angle<T: Float + FloatConst>(angle: T) -> T {
    let two_pi = T::PI() + T::PI();
    let wrapped = angle - two_pi * ((angle - T::PI()) / two_pi).ceil();
    // `ceil` can land exactly on -π for inputs a hair above an odd multiple of π.
    if wrapped <= -T::PI() {
        wrapped + two_pi
    } else {
        wrapped
    }
}

// --- Geometry ---

/// A point in the shared 2D map frame. This is what downstream consumers
/// (visualization, export) receive.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point2) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

impl From<Vector2<f64>> for Point2 {
    fn from(v: Vector2<f64>) -> Self {
        Self { x: v.x, y: v.y }
    }
}

/// A planar robot pose. `theta` is kept in (-π, π].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose {
    /// Creates a pose, normalizing the heading.
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self {
            x,
            y,
            theta: normalize_angle(theta),
        }
    }

    pub fn position(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }

    /// The pose as the `[x, y, θ]` column vector used by the proposal maths.
    pub fn as_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.theta)
    }

    pub fn from_vector(v: &Vector3<f64>) -> Self {
        Self::new(v.x, v.y, v.z)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.theta.is_finite()
    }
}

// --- Filter inputs ---

/// An odometry increment: rotate by `delta_heading`, then travel `distance`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Control {
    pub distance: f64,
    pub delta_heading: f64,
}

impl Control {
    pub fn new(distance: f64, delta_heading: f64) -> Self {
        Self {
            distance,
            delta_heading,
        }
    }

    /// Rejects increments that must never reach particle state.
    pub fn validate(&self) -> Result<(), SlamError> {
        if !self.distance.is_finite() {
            return Err(SlamError::InvalidControl {
                reason: format!("distance is not finite ({})", self.distance),
            });
        }
        if !self.delta_heading.is_finite() {
            return Err(SlamError::InvalidControl {
                reason: format!("delta_heading is not finite ({})", self.delta_heading),
            });
        }
        if self.delta_heading.abs() > MAX_INPUT_ANGLE {
            return Err(SlamError::InvalidControl {
                reason: format!(
                    "delta_heading {} exceeds a full turn; expected radians",
                    self.delta_heading
                ),
            });
        }
        Ok(())
    }
}

/// A range-bearing measurement of one point landmark, in the robot frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Observation {
    pub range: f64,
    pub bearing: f64,
}

impl Observation {
    pub fn new(range: f64, bearing: f64) -> Self {
        Self { range, bearing }
    }

    /// The measurement as a `[range, bearing]` vector with the bearing wrapped.
    pub fn as_vector(&self) -> Vector2<f64> {
        Vector2::new(self.range, normalize_angle(self.bearing))
    }

    /// Checks one observation of a batch. `index` is only used for the error message.
    pub fn validate(&self, index: usize) -> Result<(), SlamError> {
        let reason = if !self.range.is_finite() || !self.bearing.is_finite() {
            Some("range and bearing must be finite".to_string())
        } else if self.range <= 0.0 {
            Some(format!("range must be positive, got {}", self.range))
        } else if self.bearing.abs() > MAX_INPUT_ANGLE {
            Some(format!(
                "bearing {} exceeds a full turn; expected radians",
                self.bearing
            ))
        } else {
            None
        };

        match reason {
            Some(reason) => Err(SlamError::InvalidObservation {
                index,
                range: self.range,
                bearing: self.bearing,
                reason,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    const EPS: f64 = 1e-9;

    #[test]
    fn normalize_keeps_half_open_interval() {
        assert_abs_diff_eq!(normalize_angle(PI), PI, epsilon = EPS);
        assert_abs_diff_eq!(normalize_angle(-PI), PI, epsilon = EPS);
        assert_abs_diff_eq!(normalize_angle(3.0 * PI), PI, epsilon = EPS);
        assert_abs_diff_eq!(normalize_angle(2.0 * PI), 0.0, epsilon = EPS);
        assert_abs_diff_eq!(normalize_angle(-PI / 2.0), -PI / 2.0, epsilon = EPS);
        assert_abs_diff_eq!(normalize_angle(7.5 * PI), -0.5 * PI, epsilon = EPS);
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut rng = SlamRng::seed_from_u64(7);
        for _ in 0..1000 {
            let a: f64 = rng.gen_range(-50.0..50.0);
            let once = normalize_angle(a);
            assert!(once > -PI && once <= PI, "{a} -> {once}");
            assert_abs_diff_eq!(normalize_angle(once), once, epsilon = EPS);
        }
    }

    #[test]
    fn turns_summing_to_full_circle_return_home() {
        let mut rng = SlamRng::seed_from_u64(11);
        for _ in 0..200 {
            let start: f64 = rng.gen_range(-PI..PI);
            let n = rng.gen_range(1..20);
            let raw: Vec<f64> = (0..n).map(|_| rng.gen_range(0.01..1.0)).collect();
            let total: f64 = raw.iter().sum();
            let mut heading = start;
            for r in &raw {
                heading = normalize_angle(heading + r / total * 2.0 * PI);
            }
            let diff = normalize_angle(heading - start);
            assert_abs_diff_eq!(diff, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn pose_vector_round_trip_wraps_heading() {
        let pose = Pose::from_vector(&Vector3::new(1.0, -2.0, 3.0 * PI / 2.0));
        assert_abs_diff_eq!(pose.theta, -PI / 2.0, epsilon = EPS);
        assert_eq!(pose.as_vector().x, 1.0);
    }

    #[test]
    fn rejects_malformed_inputs() {
        assert!(Control::new(f64::NAN, 0.0).validate().is_err());
        assert!(Control::new(1.0, 90.0).validate().is_err());
        assert!(Control::new(-1.0, 0.3).validate().is_ok());

        assert!(Observation::new(0.0, 0.1).validate(0).is_err());
        assert!(Observation::new(5.0, f64::INFINITY).validate(0).is_err());
        assert!(Observation::new(5.0, 45.0).validate(3).is_err());
        assert!(Observation::new(5.0, -0.4).validate(0).is_ok());
    }
}
