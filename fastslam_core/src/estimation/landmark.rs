// fastslam_core/src/estimation/landmark.rs

use nalgebra::{Matrix2, Vector2};

use crate::error::SlamError;
use crate::types::Point2;

/// Gaussian belief over the position of one point landmark.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmark {
    /// Mean position `μ` in the map frame.
    pub mean: Vector2<f64>,
    /// Position covariance `Σ`; kept symmetric positive semi-definite.
    pub covariance: Matrix2<f64>,
}

impl Landmark {
    pub fn new(mean: Vector2<f64>, covariance: Matrix2<f64>) -> Self {
        Self { mean, covariance }
    }

    pub fn position(&self) -> Point2 {
        Point2::from(self.mean)
    }

    /// Folds one associated measurement into the belief.
    ///
    /// # Arguments
    /// * `residual`: `z - ẑ`, bearing already wrapped.
    /// * `h`: Measurement Jacobian w.r.t. the landmark position.
    /// * `s`: Innovation covariance `H Σ Hᵀ + R`.
    /// * `r`: Measurement noise covariance `R`.
    ///
    /// The covariance uses the Joseph form `(I - K H) Σ (I - K H)ᵀ + K R Kᵀ`,
    /// which stays positive semi-definite under rounding.
    /// On a singular `s` the landmark is left untouched.
    pub fn ekf_update(
        &mut self,
        residual: &Vector2<f64>,
        h: &Matrix2<f64>,
        s: &Matrix2<f64>,
        r: &Matrix2<f64>,
    ) -> Result<(), SlamError> {
        let s_inv = s.try_inverse().ok_or(SlamError::SingularInnovation {
            determinant: s.determinant(),
        })?;
        let k_gain = self.covariance * h.transpose() * s_inv;

        let new_mean = self.mean + k_gain * residual;
        let a = Matrix2::identity() - k_gain * h;
        let new_cov = a * self.covariance * a.transpose() + k_gain * r * k_gain.transpose();
        // Rounding leaves Σ slightly asymmetric; force it back.
        let new_cov = (new_cov + new_cov.transpose()) * 0.5;

        if !new_mean.iter().chain(new_cov.iter()).all(|v| v.is_finite()) {
            return Err(SlamError::NonFiniteLikelihood {
                context: "updating a landmark",
            });
        }

        self.mean = new_mean;
        self.covariance = new_cov;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn zero_residual_keeps_mean_and_shrinks_covariance() {
        let mut lm = Landmark::new(Vector2::new(4.0, -1.0), Matrix2::identity() * 2.0);
        let h = Matrix2::identity();
        let r = Matrix2::identity() * 0.5;
        let s = lm.covariance + r;
        lm.ekf_update(&Vector2::zeros(), &h, &s, &r).unwrap();

        assert_abs_diff_eq!(lm.mean.x, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(lm.mean.y, -1.0, epsilon = 1e-12);
        // 2 - 2 * 2 / 2.5
        assert_abs_diff_eq!(lm.covariance[(0, 0)], 0.4, epsilon = 1e-12);
        assert_eq!(lm.covariance[(0, 1)], lm.covariance[(1, 0)]);
    }

    #[test]
    fn singular_innovation_leaves_landmark_untouched() {
        let mut lm = Landmark::new(Vector2::new(1.0, 1.0), Matrix2::identity());
        let before = lm.clone();
        let err = lm
            .ekf_update(
                &Vector2::new(1.0, 0.0),
                &Matrix2::identity(),
                &Matrix2::zeros(),
                &Matrix2::zeros(),
            )
            .unwrap_err();
        assert!(matches!(err, SlamError::SingularInnovation { .. }));
        assert_eq!(lm, before);
    }

    #[test]
    fn ill_conditioned_updates_stay_positive_semi_definite() {
        // Long, thin prior against a very precise sensor along one axis.
        let mut lm = Landmark::new(
            Vector2::new(10.0, 0.0),
            Matrix2::new(1e6, 999.0, 999.0, 1.0),
        );
        let h = Matrix2::new(0.8, 0.6, -0.06, 0.08);
        let r = Matrix2::new(1e-10, 0.0, 0.0, 1e-4);
        for i in 0..200 {
            let s = h * lm.covariance * h.transpose() + r;
            let residual = Vector2::new(0.01 * (i % 3) as f64, -0.001);
            lm.ekf_update(&residual, &h, &s, &r).unwrap();

            let cov = lm.covariance;
            assert_eq!(cov[(0, 1)], cov[(1, 0)]);
            assert!(cov[(0, 0)] >= 0.0 && cov[(1, 1)] >= 0.0, "step {i}: {cov}");
            assert!(cov.determinant() >= -1e-18, "step {i}: {cov}");
        }
    }
}
