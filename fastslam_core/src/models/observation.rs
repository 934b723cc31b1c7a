// fastslam_core/src/models/observation.rs

use nalgebra::{Matrix2, Matrix2x3, Vector2};
use std::f64::consts::PI;

use crate::config::SensorConfig;
use crate::error::SlamError;
use crate::types::{normalize_angle, Observation, Pose};

/// Squared distance under which a landmark is considered to sit on the robot.
const MIN_RANGE_SQUARED: f64 = 1e-12;

/// Everything the updaters need from one linearization of `h(pose, landmark)`.
#[derive(Debug, Clone, Copy)]
pub struct Linearization {
    /// Predicted measurement `ẑ = [range, bearing]`.
    pub predicted: Vector2<f64>,
    /// `∂h/∂m`, w.r.t. the landmark position.
    pub feature_jacobian: Matrix2<f64>,
    /// `∂h/∂x`, w.r.t. the pose `[x, y, θ]`.
    pub pose_jacobian: Matrix2x3<f64>,
    /// `S = H_m Σ H_mᵀ + R`.
    pub innovation_covariance: Matrix2<f64>,
}

/// Robot-frame range-bearing sensor with fixed diagonal noise `R`.
#[derive(Debug, Clone, Copy)]
pub struct RangeBearingModel {
    r: Matrix2<f64>,
}

impl RangeBearingModel {
    pub fn new(range_variance: f64, bearing_variance: f64) -> Self {
        Self {
            r: Matrix2::new(range_variance, 0.0, 0.0, bearing_variance),
        }
    }

    pub fn from_config(sensor: &SensorConfig) -> Self {
        Self::new(sensor.range_variance, sensor.bearing_variance)
    }

    /// Returns the measurement noise covariance `R`.
    pub fn get_r(&self) -> &Matrix2<f64> {
        &self.r
    }

    /// Predicts the ideal measurement `ẑ = h(pose, landmark)`.
    pub fn predict_measurement(&self, pose: &Pose, landmark: &Vector2<f64>) -> Vector2<f64> {
        let dx = landmark.x - pose.x;
        let dy = landmark.y - pose.y;
        Vector2::new(dx.hypot(dy), normalize_angle(dy.atan2(dx) - pose.theta))
    }

    /// Linearizes the model around `landmark` with covariance `sigma`.
    pub fn linearize(
        &self,
        pose: &Pose,
        landmark: &Vector2<f64>,
        sigma: &Matrix2<f64>,
    ) -> Result<Linearization, SlamError> {
        let dx = landmark.x - pose.x;
        let dy = landmark.y - pose.y;
        let d2 = dx * dx + dy * dy;
        if d2 < MIN_RANGE_SQUARED {
            return Err(SlamError::DegenerateGeometry {
                x: landmark.x,
                y: landmark.y,
            });
        }
        let d = d2.sqrt();

        let feature_jacobian = Matrix2::new(
            dx / d, dy / d, //
            -dy / d2, dx / d2,
        );
        let pose_jacobian = Matrix2x3::new(
            -dx / d, -dy / d, 0.0, //
            dy / d2, -dx / d2, -1.0,
        );
        let innovation_covariance =
            feature_jacobian * sigma * feature_jacobian.transpose() + self.r;

        Ok(Linearization {
            predicted: Vector2::new(d, normalize_angle(dy.atan2(dx) - pose.theta)),
            feature_jacobian,
            pose_jacobian,
            innovation_covariance,
        })
    }

    /// `z - ẑ` with the bearing component wrapped.
    pub fn residual(&self, z: &Vector2<f64>, predicted: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(z.x - predicted.x, normalize_angle(z.y - predicted.y))
    }

    /// Inverse observation model: where a landmark seen at `obs` from `pose` sits.
    pub fn inverse_measurement(&self, pose: &Pose, obs: &Observation) -> Vector2<f64> {
        let angle = pose.theta + obs.bearing;
        Vector2::new(
            pose.x + obs.range * angle.cos(),
            pose.y + obs.range * angle.sin(),
        )
    }

    /// Covariance of a freshly created landmark, `H_m⁻¹ R H_m⁻ᵀ`.
    /// Depends only on the sensor noise and the viewing geometry.
    pub fn initial_covariance(
        &self,
        pose: &Pose,
        landmark: &Vector2<f64>,
    ) -> Result<Matrix2<f64>, SlamError> {
        let lin = self.linearize(pose, landmark, &Matrix2::zeros())?;
        let h_inv = lin
            .feature_jacobian
            .try_inverse()
            .ok_or(SlamError::DegenerateGeometry {
                x: landmark.x,
                y: landmark.y,
            })?;
        let sigma = h_inv * self.r * h_inv.transpose();
        Ok((sigma + sigma.transpose()) * 0.5)
    }

    /// Density of a bivariate normal at `residual`:
    /// `exp(-½ yᵀ S⁻¹ y) / (2π √det S)`.
    pub fn likelihood(
        &self,
        residual: &Vector2<f64>,
        innovation_covariance: &Matrix2<f64>,
    ) -> Result<f64, SlamError> {
        gaussian_density(residual, innovation_covariance)
    }
}

/// Bivariate normal density of a zero-mean residual under covariance `s`.
pub fn gaussian_density(residual: &Vector2<f64>, s: &Matrix2<f64>) -> Result<f64, SlamError> {
    let det = s.determinant();
    if !(det > 0.0 && det.is_finite()) {
        return Err(SlamError::SingularInnovation { determinant: det });
    }
    let s_inv = s
        .try_inverse()
        .ok_or(SlamError::SingularInnovation { determinant: det })?;
    let mahalanobis = (residual.transpose() * s_inv * residual)[(0, 0)];
    let p = (-0.5 * mahalanobis).exp() / (2.0 * PI * det.sqrt());
    if p.is_finite() {
        Ok(p)
    } else {
        Err(SlamError::NonFiniteLikelihood {
            context: "evaluating an observation density",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use std::f64::consts::FRAC_PI_2;

    fn model() -> RangeBearingModel {
        RangeBearingModel::from_config(&SensorConfig::default())
    }

    #[test]
    fn prediction_is_in_robot_frame() {
        let pose = Pose::new(0.0, 0.0, FRAC_PI_2);
        let z = model().predict_measurement(&pose, &Vector2::new(0.0, 5.0));
        assert_abs_diff_eq!(z.x, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(z.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn inverse_measurement_undoes_prediction() {
        let m = model();
        let pose = Pose::new(3.0, -1.0, 2.5);
        let obs = Observation::new(7.0, -0.8);
        let lm = m.inverse_measurement(&pose, &obs);
        let z = m.predict_measurement(&pose, &lm);
        assert_abs_diff_eq!(z.x, 7.0, epsilon = 1e-9);
        assert_abs_diff_eq!(z.y, -0.8, epsilon = 1e-9);
    }

    #[test]
    fn jacobians_match_finite_differences() {
        let m = model();
        let pose = Pose::new(1.0, 2.0, 0.3);
        let lm = Vector2::new(6.0, -2.0);
        let lin = m.linearize(&pose, &lm, &Matrix2::identity()).unwrap();
        let h = 1e-6;

        for j in 0..2 {
            let mut bumped = lm;
            bumped[j] += h;
            let dz = m.residual(&m.predict_measurement(&pose, &bumped), &lin.predicted) / h;
            assert_relative_eq!(dz.x, lin.feature_jacobian[(0, j)], epsilon = 1e-5);
            assert_relative_eq!(dz.y, lin.feature_jacobian[(1, j)], epsilon = 1e-5);
        }
        for j in 0..3 {
            let mut v = pose.as_vector();
            v[j] += h;
            let bumped = Pose::from_vector(&v);
            let dz = m.residual(&m.predict_measurement(&bumped, &lm), &lin.predicted) / h;
            assert_relative_eq!(dz.x, lin.pose_jacobian[(0, j)], epsilon = 1e-5);
            assert_relative_eq!(dz.y, lin.pose_jacobian[(1, j)], epsilon = 1e-5);
        }
    }

    #[test]
    fn residual_wraps_bearing() {
        let r = model().residual(&Vector2::new(1.0, 3.1), &Vector2::new(1.0, -3.1));
        assert_abs_diff_eq!(r.y, 6.2 - 2.0 * PI, epsilon = 1e-12);
    }

    #[test]
    fn coincident_landmark_is_degenerate() {
        let pose = Pose::new(1.0, 1.0, 0.0);
        let err = model()
            .linearize(&pose, &Vector2::new(1.0, 1.0), &Matrix2::identity())
            .unwrap_err();
        assert!(matches!(err, SlamError::DegenerateGeometry { .. }));
    }

    #[test]
    fn singular_covariance_is_reported() {
        let err = gaussian_density(&Vector2::zeros(), &Matrix2::zeros()).unwrap_err();
        assert!(matches!(err, SlamError::SingularInnovation { .. }));
    }

    #[test]
    fn density_peaks_at_zero_residual() {
        let s = Matrix2::new(0.5, 0.0, 0.0, 0.2);
        let peak = gaussian_density(&Vector2::zeros(), &s).unwrap();
        let off = gaussian_density(&Vector2::new(0.3, 0.1), &s).unwrap();
        assert_relative_eq!(peak, 1.0 / (2.0 * PI * 0.1_f64.sqrt()), epsilon = 1e-12);
        assert!(off < peak);
    }
}
