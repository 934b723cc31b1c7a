// fastslam_core/src/estimation/fastslam1.rs

use nalgebra::Vector2;

use crate::error::SlamError;
use crate::estimation::association::{maximum_likelihood, order_new_last, Association, Decision};
use crate::estimation::{
    absorb_numerical, create_landmark, update_existing, ParticleState, ParticleUpdate,
    UpdateContext, UpdateStrategy,
};
use crate::types::{Observation, SlamRng};

/// FastSLAM 1.0 update: the pose is whatever the motion model sampled, and
/// only the landmark EKFs and the weight react to the observations.
#[derive(Debug, Clone, Copy, Default)]
pub struct EkfOnlyUpdate;

impl EkfOnlyUpdate {
    fn associate(
        particle: &ParticleState,
        observations: &[Vector2<f64>],
        ctx: &UpdateContext,
    ) -> Vec<Association> {
        observations
            .iter()
            .enumerate()
            .map(|(i, z)| {
                let scores = ctx
                    .gate
                    .candidates(&particle.pose, &particle.landmarks)
                    .map(|(idx, lm)| {
                        let score = ctx
                            .model
                            .linearize(&particle.pose, &lm.mean, &lm.covariance)
                            .and_then(|lin| {
                                let residual = ctx.model.residual(z, &lin.predicted);
                                ctx.model.likelihood(&residual, &lin.innovation_covariance)
                            });
                        (idx, score)
                    });
                maximum_likelihood(i, scores, ctx.association.likelihood_threshold, ctx.metrics)
            })
            .collect()
    }
}

impl UpdateStrategy for EkfOnlyUpdate {
    fn name(&self) -> &'static str {
        "ekf_only"
    }

    fn update(
        &self,
        particle: &mut ParticleState,
        observations: &[Observation],
        ctx: &UpdateContext,
        _rng: &mut SlamRng,
    ) -> Result<ParticleUpdate, SlamError> {
        let z: Vec<Vector2<f64>> = observations.iter().map(Observation::as_vector).collect();

        // Associate everything against the map as it stood before this step.
        let mut associations = Self::associate(particle, &z, ctx);
        order_new_last(&mut associations);

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
    use crate::types::Pose;
    use approx::assert_abs_diff_eq;
    use rand::{Rng, SeedableRng};
    use rand_distr::{Distribution, Normal};

    struct Fixture {
        model: RangeBearingModel,
        gate: SensorGate,
        association: AssociationConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                model: RangeBearingModel::from_config(&SensorConfig::default()),
                gate: SensorGate::OPEN,
                association: AssociationConfig::default(),
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
    fn first_observation_creates_landmark_near_expected_position() {
        let fx = Fixture::new();
        let mut rng = SlamRng::seed_from_u64(1);
        let mut p = ParticleState::new(Pose::new(0.0, 0.0, 0.0), 1.0);

        let out = EkfOnlyUpdate
            .update(&mut p, &[Observation::new(100.0, 0.0)], &fx.ctx(), &mut rng)
            .unwrap();

        assert_eq!(out.created, 1);
        assert_eq!(p.landmarks.len(), 1);
        let lm = &p.landmarks[0];
        assert_abs_diff_eq!(lm.mean.x, 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(lm.mean.y, 0.0, epsilon = 1e-9);
        // H⁻¹ R H⁻ᵀ with H = diag(1, 1/100): diag(σr², 100² σb²).
        let r = fx.model.get_r();
        assert_abs_diff_eq!(lm.covariance[(0, 0)], r[(0, 0)], epsilon = 1e-9);
        assert_abs_diff_eq!(lm.covariance[(1, 1)], 1e4 * r[(1, 1)], epsilon = 1e-6);
        assert_abs_diff_eq!(lm.covariance[(0, 1)], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn repeated_noiseless_reading_keeps_mean_and_shrinks_covariance() {
        let fx = Fixture::new();
        let mut rng = SlamRng::seed_from_u64(1);
        let mut p = ParticleState::new(Pose::new(0.0, 0.0, 0.0), 1.0);
        let obs = [Observation::new(100.0, 0.0)];
        EkfOnlyUpdate.update(&mut p, &obs, &fx.ctx(), &mut rng).unwrap();
        let before = p.landmarks[0].clone();

        let out = EkfOnlyUpdate.update(&mut p, &obs, &fx.ctx(), &mut rng).unwrap();

        assert_eq!(out.updated, 1);
        assert_eq!(out.created, 0);
        assert_eq!(p.landmarks.len(), 1);
        let after = &p.landmarks[0];
        assert_abs_diff_eq!(after.mean.x, 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(after.mean.y, 0.0, epsilon = 1e-9);
        assert!(after.covariance.trace() < before.covariance.trace());
        assert!(after.covariance[(0, 0)] < before.covariance[(0, 0)]);
        assert!(after.covariance[(1, 1)] < before.covariance[(1, 1)]);
    }

    #[test]
    fn consistent_observations_never_increase_covariance_trace() {
        let fx = Fixture::new();
        let r = *fx.model.get_r();
        let range_noise = Normal::new(0.0, r[(0, 0)].sqrt()).unwrap();
        let bearing_noise = Normal::new(0.0, r[(1, 1)].sqrt()).unwrap();

        for seed in 0..20 {
            let mut rng = SlamRng::seed_from_u64(seed);
            let pose = Pose::new(rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0), 0.2);
            let target = Vector2::new(20.0, 8.0);
            let mut p = ParticleState::new(pose, 1.0);
            let mut last_trace = f64::INFINITY;

            for _ in 0..15 {
                let ideal = fx.model.predict_measurement(&pose, &target);
                let obs = Observation::new(
                    ideal.x + range_noise.sample(&mut rng),
                    ideal.y + bearing_noise.sample(&mut rng),
                );
                EkfOnlyUpdate.update(&mut p, &[obs], &fx.ctx(), &mut rng).unwrap();
                assert_eq!(p.landmarks.len(), 1, "seed {seed} spawned a duplicate");
                let cov = p.landmarks[0].covariance;
                assert!(cov[(0, 0)] >= 0.0 && cov[(1, 1)] >= 0.0, "seed {seed}: {cov}");
                assert!(cov.determinant() >= 0.0, "seed {seed}: {cov}");
                let trace = cov.trace();
                assert!(trace <= last_trace + 1e-12, "seed {seed}: {trace} > {last_trace}");
                last_trace = trace;
            }
        }
    }

    #[test]
    fn distant_observation_starts_a_second_landmark() {
        let fx = Fixture::new();
        let mut rng = SlamRng::seed_from_u64(1);
        let mut p = ParticleState::new(Pose::default(), 1.0);
        EkfOnlyUpdate
            .update(&mut p, &[Observation::new(10.0, 0.0)], &fx.ctx(), &mut rng)
            .unwrap();
        let out = EkfOnlyUpdate
            .update(&mut p, &[Observation::new(10.0, 1.5)], &fx.ctx(), &mut rng)
            .unwrap();
        assert_eq!(out.created, 1);
        assert_eq!(p.landmarks.len(), 2);
    }

    #[test]
    fn observations_of_one_step_do_not_match_landmarks_created_in_that_step() {
        let fx = Fixture::new();
        let mut rng = SlamRng::seed_from_u64(1);
        let mut p = ParticleState::new(Pose::default(), 1.0);
        let twice = [Observation::new(10.0, 0.0), Observation::new(10.0, 0.0)];
        let out = EkfOnlyUpdate.update(&mut p, &twice, &fx.ctx(), &mut rng).unwrap();
        assert_eq!(out.created, 2);
        assert_eq!(out.updated, 0);
    }

    #[test]
    fn weight_scales_with_match_likelihood() {
        let fx = Fixture::new();
        let mut rng = SlamRng::seed_from_u64(1);
        let mut good = ParticleState::new(Pose::default(), 1.0);
        let obs = [Observation::new(10.0, 0.0)];
        EkfOnlyUpdate.update(&mut good, &obs, &fx.ctx(), &mut rng).unwrap();
        let mut bad = good.clone();
        good.weight = 1.0;
        bad.weight = 1.0;

        EkfOnlyUpdate.update(&mut good, &obs, &fx.ctx(), &mut rng).unwrap();
        EkfOnlyUpdate
            .update(&mut bad, &[Observation::new(10.6, 0.0)], &fx.ctx(), &mut rng)
            .unwrap();
        assert!(good.weight > bad.weight);
        assert!(bad.weight >= 0.0);
    }
}
