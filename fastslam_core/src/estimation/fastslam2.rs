// fastslam_core/src/estimation/fastslam2.rs

use nalgebra::{Cholesky, Matrix2, Matrix3, Vector2, Vector3, U3};
use rand_distr::{Distribution, StandardNormal};
use std::f64::consts::PI;

use crate::config::ProposalConfig;
use crate::error::SlamError;
use crate::estimation::association::{maximum_likelihood, order_new_last, Association, Decision};
use crate::estimation::{
    absorb_numerical, create_landmark, update_existing, Landmark, ParticleState, ParticleUpdate,
    UpdateContext, UpdateStrategy,
};
use crate::types::{normalize_angle, Observation, Pose, SlamRng};

/// A 3D Gaussian over `[x, y, θ]`, factored for sampling and density evaluation.
#[derive(Debug, Clone)]
struct PoseGaussian {
    mean: Vector3<f64>,
    chol: Cholesky<f64, U3>,
}

impl PoseGaussian {
    fn new(
        mean: Vector3<f64>,
        covariance: Matrix3<f64>,
        what: &'static str,
    ) -> Result<Self, SlamError> {
        let symmetric = (covariance + covariance.transpose()) * 0.5;
        let chol = Cholesky::new(symmetric).ok_or(SlamError::NotPositiveDefinite { what })?;
        Ok(Self { mean, chol })
    }

    fn sample(&self, rng: &mut SlamRng) -> Vector3<f64> {
        let n = Vector3::<f64>::from_fn(|_, _| StandardNormal.sample(rng));
        let mut x = self.mean + self.chol.l() * n;
        x.z = normalize_angle(x.z);
        x
    }

    fn ln_density(&self, x: &Vector3<f64>) -> f64 {
        let mut d = x - self.mean;
        d.z = normalize_angle(d.z);
        let l = self.chol.l();
        let ln_det: f64 = 2.0 * (0..3).map(|i| l[(i, i)].ln()).sum::<f64>();
        let mahalanobis = d.dot(&self.chol.solve(&d));
        -0.5 * (mahalanobis + ln_det + 3.0 * (2.0 * PI).ln())
    }
}

/// FastSLAM 2.0 update: observations of known landmarks are folded into a
/// Gaussian proposal over the pose, a new pose is drawn from it, and the
/// weight is corrected by the prior/proposal density ratio.
#[derive(Debug, Clone)]
pub struct ProposalUpdate {
    /// Prior covariance of the motion-propagated pose.
    prior: Matrix3<f64>,
    prior_information: Matrix3<f64>,
}

impl ProposalUpdate {
    pub fn new(prior: Matrix3<f64>) -> Result<Self, SlamError> {
        let prior_information = prior.try_inverse().ok_or(SlamError::NotPositiveDefinite {
            what: "proposal pose prior",
        })?;
        Ok(Self {
            prior,
            prior_information,
        })
    }

    pub fn from_config(config: &ProposalConfig) -> Result<Self, SlamError> {
        Self::new(Matrix3::from_diagonal(&Vector3::from(config.pose_variance)))
    }

    /// Proposal built from a single landmark, as used when scoring candidates.
    fn single_landmark_proposal(
        &self,
        pose: &Pose,
        landmark: &Landmark,
        z: &Vector2<f64>,
        ctx: &UpdateContext,
    ) -> Result<(PoseGaussian, Matrix2<f64>), SlamError> {
        let lin = ctx
            .model
            .linearize(pose, &landmark.mean, &landmark.covariance)?;
        let s = lin.innovation_covariance;
        let s_inv = s.try_inverse().ok_or(SlamError::SingularInnovation {
            determinant: s.determinant(),
        })?;
        let hx = lin.pose_jacobian;
        let information = hx.transpose() * s_inv * hx + self.prior_information;
        let cov = information.try_inverse().ok_or(SlamError::NotPositiveDefinite {
            what: "single-landmark pose proposal",
        })?;
        let residual = ctx.model.residual(z, &lin.predicted);
        let mean = pose.as_vector() + cov * hx.transpose() * s_inv * residual;
        Ok((PoseGaussian::new(mean, cov, "single-landmark pose proposal")?, s))
    }

    /// Scores each gated landmark by the likelihood of `z` at a pose drawn
    /// from that landmark's own proposal.
    fn associate(
        &self,
        particle: &ParticleState,
        observations: &[Vector2<f64>],
        ctx: &UpdateContext,
        rng: &mut SlamRng,
    ) -> Vec<Association> {
        let mut associations = Vec::with_capacity(observations.len());
        for (i, z) in observations.iter().enumerate() {
            let mut scores = Vec::new();
            for (idx, lm) in ctx.gate.candidates(&particle.pose, &particle.landmarks) {
                let score = self
                    .single_landmark_proposal(&particle.pose, lm, z, ctx)
                    .and_then(|(proposal, s)| {
                        let sampled = Pose::from_vector(&proposal.sample(rng));
                        let predicted = ctx.model.predict_measurement(&sampled, &lm.mean);
                        let residual = ctx.model.residual(z, &predicted);
                        ctx.model.likelihood(&residual, &s)
                    });
                scores.push((idx, score));
            }
            associations.push(maximum_likelihood(
                i,
                scores,
                ctx.association.likelihood_threshold,
                ctx.metrics,
            ));
        }
        associations
    }

    /// Fuses every matched observation into one pose Gaussian, linearizing at
    /// the running mean. Returns `None` when nothing could be fused.
    fn fuse_proposal(
        &self,
        particle: &ParticleState,
        matched: &[(usize, Vector2<f64>)],
        ctx: &UpdateContext,
    ) -> Result<Option<PoseGaussian>, SlamError> {
        let mut mean = particle.pose.as_vector();
        let mut information = self.prior_information;
        let mut cov = self.prior;
        let mut fused = 0usize;

        for (idx, z) in matched {
            let landmark = &particle.landmarks[*idx];
            let at = Pose::from_vector(&mean);
            let lin = match ctx.model.linearize(&at, &landmark.mean, &landmark.covariance) {
                Ok(lin) => lin,
                Err(err) => {
                    tracing::debug!(landmark = idx, %err, "not fusing landmark into proposal");
                    continue;
                }
            };
            let Some(s_inv) = lin.innovation_covariance.try_inverse() else {
                tracing::debug!(landmark = idx, "singular innovation, not fusing into proposal");
                continue;
            };
            let hx = lin.pose_jacobian;
            information += hx.transpose() * s_inv * hx;
            cov = information.try_inverse().ok_or(SlamError::NotPositiveDefinite {
                what: "fused pose proposal",
            })?;
            let residual = ctx.model.residual(z, &lin.predicted);
            mean += cov * hx.transpose() * s_inv * residual;
            mean.z = normalize_angle(mean.z);
            fused += 1;
        }

        if fused == 0 {
            return Ok(None);
        }
        PoseGaussian::new(mean, cov, "fused pose proposal").map(Some)
    }
}

impl UpdateStrategy for ProposalUpdate {
    fn name(&self) -> &'static str {
        "proposal"
    }

    fn update(
        &self,
        particle: &mut ParticleState,
        observations: &[Observation],
        ctx: &UpdateContext,
        rng: &mut SlamRng,
    ) -> Result<ParticleUpdate, SlamError> {
        let z: Vec<Vector2<f64>> = observations.iter().map(Observation::as_vector).collect();

        let mut associations = self.associate(particle, &z, ctx, rng);
        order_new_last(&mut associations);

        let matched: Vec<(usize, Vector2<f64>)> = associations
            .iter()
            .filter_map(|a| match a.decision {
                Decision::Existing(idx) => Some((idx, z[a.observation])),
                Decision::New => None,
            })
            .collect();

        // Draw the pose from the proposal and correct for not sampling the prior.
        let mut ratio = 1.0;
        if let Some(proposal) = self.fuse_proposal(particle, &matched, ctx)? {
            let prior =
                PoseGaussian::new(particle.pose.as_vector(), self.prior, "proposal pose prior")?;
            let sampled = proposal.sample(rng);
            ratio = (prior.ln_density(&sampled) - proposal.ln_density(&sampled)).exp();
            if !ratio.is_finite() {
                return Err(SlamError::NonFiniteLikelihood {
                    context: "computing the prior/proposal ratio",
                });
            }
            particle.pose = Pose::from_vector(&sampled);
        }

        // Landmark EKFs run at the sampled pose; creations come last.
        let mut summary = ParticleUpdate::default();
        for a in &associations {
            match a.decision {
                Decision::Existing(idx) => {
                    match update_existing(particle, idx, &z[a.observation], ctx.model) {
                        Ok(likelihood) => {
                            particle.weight *= likelihood;
                            summary.updated += 1;
                        }
                        Err(err) => absorb_numerical(err, a.observation, ctx, &mut summary)?,
                    }
                }
                Decision::New => {
                    match create_landmark(particle, &observations[a.observation], ctx.model) {
                        Ok(()) => {
                            particle.weight *= ctx.association.new_landmark_likelihood;
                            summary.created += 1;
                        }
                        Err(err) => absorb_numerical(err, a.observation, ctx, &mut summary)?,
                    }
                }
            }
        }
        particle.weight *= ratio;

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AssociationConfig, SensorConfig};
    use crate::estimation::SensorGate;
    use crate::metrics::NoopMetrics;
    use crate::models::RangeBearingModel;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;

    struct Fixture {
        model: RangeBearingModel,
        gate: SensorGate,
        association: AssociationConfig,
        strategy: ProposalUpdate,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                model: RangeBearingModel::from_config(&SensorConfig::default()),
                gate: SensorGate::OPEN,
                association: AssociationConfig::default(),
                strategy: ProposalUpdate::from_config(&ProposalConfig::default()).unwrap(),
            }
        }

        fn ctx(&self) -> UpdateContext<'_> {
            UpdateContext {
                model: &self.model,
                gate: &self.gate,
                association: &self.association,
                metrics: &NoopMetrics,
            }
        }
    }

    #[test]
    fn fresh_particle_creates_one_landmark_and_keeps_pose() {
        let fx = Fixture::new();
        let mut rng = SlamRng::seed_from_u64(4);
        let mut p = ParticleState::new(Pose::new(0.0, 0.0, 0.0), 1.0);

        let out = fx
            .strategy
            .update(&mut p, &[Observation::new(100.0, 0.0)], &fx.ctx(), &mut rng)
            .unwrap();

        assert_eq!(out.created, 1);
        assert_eq!(p.pose, Pose::new(0.0, 0.0, 0.0));
        assert_abs_diff_eq!(p.landmarks[0].mean.x, 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.weight, fx.association.new_landmark_likelihood, epsilon = 1e-15);
    }

    #[test]
    fn matched_observation_resamples_pose_and_shrinks_landmark() {
        let fx = Fixture::new();
        let mut rng = SlamRng::seed_from_u64(4);
        let mut p = ParticleState::new(Pose::new(0.0, 0.0, 0.0), 1.0);
        let obs = [Observation::new(100.0, 0.0)];
        fx.strategy.update(&mut p, &obs, &fx.ctx(), &mut rng).unwrap();
        let before = p.landmarks[0].clone();
        p.weight = 1.0;

        let out = fx.strategy.update(&mut p, &obs, &fx.ctx(), &mut rng).unwrap();

        assert_eq!(out.updated, 1);
        assert_eq!(p.landmarks.len(), 1);
        assert!(p.landmarks[0].covariance.trace() < before.covariance.trace());
        assert!(p.weight > 0.0 && p.weight.is_finite());
        // The sampled pose stays close to where the landmark says it should be.
        assert!(p.pose.x.abs() < 3.0 && p.pose.y.abs() < 10.0);
        assert!(p.pose.theta.abs() < 0.3);
    }

    #[test]
    fn proposal_pulls_a_displaced_pose_towards_the_evidence() {
        let fx = Fixture::new();
        let mut rng = SlamRng::seed_from_u64(8);
        // Two well-known landmarks, seen from a pose that is 0.5 off in x.
        let tight = Matrix2::identity() * 1e-4;
        let mut p = ParticleState::new(Pose::new(0.5, 0.0, 0.0), 1.0);
        p.landmarks.push(Landmark::new(Vector2::new(10.0, 0.0), tight));
        p.landmarks.push(Landmark::new(Vector2::new(0.0, 10.0), tight));
        let truth = Pose::new(0.0, 0.0, 0.0);
        let obs: Vec<Observation> = p
            .landmarks
            .iter()
            .map(|lm| {
                let z = fx.model.predict_measurement(&truth, &lm.mean);
                Observation::new(z.x, z.y)
            })
            .collect();

        let mut total_x = 0.0;
        let runs = 200;
        for _ in 0..runs {
            let mut q = p.clone();
            fx.strategy.update(&mut q, &obs, &fx.ctx(), &mut rng).unwrap();
            total_x += q.pose.x;
        }
        let mean_x = total_x / runs as f64;
        assert!(mean_x < 0.25, "proposal mean x = {mean_x}");
    }

    #[test]
    fn rejects_non_positive_prior() {
        assert!(ProposalUpdate::new(Matrix3::zeros()).is_err());
    }

    #[test]
    fn pose_gaussian_density_matches_closed_form() {
        let cov = Matrix3::from_diagonal(&Vector3::new(0.5, 2.0, 0.1));
        let g = PoseGaussian::new(Vector3::zeros(), cov, "test").unwrap();
        let expected = -0.5 * (cov.determinant().ln() + 3.0 * (2.0 * PI).ln());
        assert_abs_diff_eq!(g.ln_density(&Vector3::zeros()), expected, epsilon = 1e-12);
    }
}
