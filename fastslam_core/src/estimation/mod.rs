// fastslam_core/src/estimation/mod.rs

use dyn_clone::DynClone;
use nalgebra::Vector2;
use std::fmt::Debug;

use crate::config::{AssociationConfig, FilterConfig, UpdateStrategyKind};
use crate::error::SlamError;
use crate::metrics::{Counter, MetricsCollector};
use crate::models::RangeBearingModel;
use crate::types::{Observation, SlamRng};

pub mod association;
pub mod fastslam1;
pub mod fastslam2;
pub mod landmark;
pub mod particle;
pub mod particle_set;
pub mod scheduler;

pub use association::SensorGate;
pub use fastslam1::EkfOnlyUpdate;
pub use fastslam2::ProposalUpdate;
pub use landmark::Landmark;
pub use particle::ParticleState;
pub use particle_set::{ParticleSet, WeightStatus};
pub use scheduler::{ParallelStepScheduler, StepOutcome};

/// The shared, read-only world an update strategy works against.
/// One instance is borrowed by every worker during a step.
#[derive(Debug, Clone, Copy)]
pub struct UpdateContext<'a> {
    pub model: &'a RangeBearingModel,
    pub gate: &'a SensorGate,
    pub association: &'a AssociationConfig,
    pub metrics: &'a dyn MetricsCollector,
}

/// What one particle's observation update did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParticleUpdate {
    pub created: usize,
    pub updated: usize,
    /// Observations discarded after a numerical failure.
    pub dropped: usize,
}

/// The contract for a per-particle observation update (the "ObservationUpdater").
///
/// Implementations receive exclusive access to one particle, already moved by
/// the motion model, and fold the step's observations into its pose, map and
/// weight. They must never touch any other particle.
pub trait UpdateStrategy: DynClone + Debug + Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Associates, updates and re-weights `particle`.
    ///
    /// # Arguments
    /// * `particle`: The particle to update in place.
    /// * `observations`: Validated observations of this step.
    /// * `ctx`: Sensor model, gate, thresholds and metrics.
    /// * `rng`: The particle's private random stream for this step.
    ///
    /// # Returns
    /// Counts of what happened, or an error when the particle as a whole could
    /// not be updated (the scheduler then discards it).
    fn update(
        &self,
        particle: &mut ParticleState,
        observations: &[Observation],
        ctx: &UpdateContext,
        rng: &mut SlamRng,
    ) -> Result<ParticleUpdate, SlamError>;
}

// Make the trait object cloneable.
dyn_clone::clone_trait_object!(UpdateStrategy);

/// Builds the strategy selected in `config`.
pub fn build_strategy(config: &FilterConfig) -> Result<Box<dyn UpdateStrategy>, SlamError> {
    Ok(match config.strategy {
        UpdateStrategyKind::Proposal => Box::new(ProposalUpdate::from_config(&config.proposal)?),
        UpdateStrategyKind::EkfOnly => Box::new(EkfOnlyUpdate),
    })
}

// --- Helpers shared by both strategies ---

/// Runs the EKF update of landmark `idx` against `z` from the particle's
/// current pose and returns the measurement likelihood.
pub(crate) fn update_existing(
    particle: &mut ParticleState,
    idx: usize,
    z: &Vector2<f64>,
    model: &RangeBearingModel,
) -> Result<f64, SlamError> {
    let pose = particle.pose;
    let landmark = &mut particle.landmarks[idx];
    let lin = model.linearize(&pose, &landmark.mean, &landmark.covariance)?;
    let residual = model.residual(z, &lin.predicted);
    let likelihood = model.likelihood(&residual, &lin.innovation_covariance)?;
    landmark.ekf_update(
        &residual,
        &lin.feature_jacobian,
        &lin.innovation_covariance,
        model.get_r(),
    )?;
    Ok(likelihood)
}

/// Appends a landmark initialized from `obs` at the particle's current pose.
pub(crate) fn create_landmark(
    particle: &mut ParticleState,
    obs: &Observation,
    model: &RangeBearingModel,
) -> Result<(), SlamError> {
    let mean = model.inverse_measurement(&particle.pose, obs);
    let covariance = model.initial_covariance(&particle.pose, &mean)?;
    particle.landmarks.push(Landmark::new(mean, covariance));
    Ok(())
}

/// Records a per-observation failure. Errors that are not numerical are
/// returned so the whole particle fails.
pub(crate) fn absorb_numerical(
    err: SlamError,
    observation: usize,
    ctx: &UpdateContext,
    summary: &mut ParticleUpdate,
) -> Result<(), SlamError> {
    if !err.is_numerical() {
        return Err(err);
    }
    if matches!(err, SlamError::SingularInnovation { .. }) {
        ctx.metrics.increment(Counter::SingularInnovations, 1);
    }
    ctx.metrics.increment(Counter::ObservationsDropped, 1);
    tracing::debug!(observation, %err, "dropping observation");
    summary.dropped += 1;
    Ok(())
}
