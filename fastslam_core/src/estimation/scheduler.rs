// fastslam_core/src/estimation/scheduler.rs

//! Runs motion + observation update over every particle of a step, either on
//! a rayon pool or on the calling thread. Both modes give identical results.

use rand::SeedableRng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

use crate::config::{ExecutionConfig, ExecutionMode, LandmarkPruning, MotionNoise};
use crate::error::SlamError;
use crate::estimation::particle_set::ParticleSet;
use crate::estimation::{ParticleState, ParticleUpdate, UpdateContext, UpdateStrategy};
use crate::models::MotionModel;
use crate::types::{Control, Observation, SlamRng};

/// Weight given to a particle whose update failed. Healthy weights are raw
/// likelihood products and can fall below any fixed floor, so a failed
/// particle gets nothing at all. If every particle fails, `normalize` resets
/// the set to uniform.
pub const FAILED_PARTICLE_WEIGHT: f64 = 0.0;

/// Everything a worker needs for one step. Shared read-only by all workers.
#[derive(Debug, Clone, Copy)]
pub struct StepInputs<'a> {
    pub control: &'a Control,
    pub observations: &'a [Observation],
    pub motion: &'a dyn MotionModel,
    pub motion_noise: &'a MotionNoise,
    pub strategy: &'a dyn UpdateStrategy,
    pub context: UpdateContext<'a>,
    pub pruning: LandmarkPruning,
    /// Base seed of this step; each particle derives its own stream from it.
    pub step_seed: u64,
}

/// Totals over all particles of one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub failed_particles: usize,
    pub created: usize,
    pub updated: usize,
    pub dropped: usize,
    pub pruned: usize,
}

impl StepOutcome {
    fn record(&mut self, result: Result<(ParticleUpdate, usize), SlamError>) {
        match result {
            Ok((update, pruned)) => {
                self.created += update.created;
                self.updated += update.updated;
                self.dropped += update.dropped;
                self.pruned += pruned;
            }
            Err(_) => self.failed_particles += 1,
        }
    }

    fn merge(self, other: Self) -> Self {
        Self {
            failed_particles: self.failed_particles + other.failed_particles,
            created: self.created + other.created,
            updated: self.updated + other.updated,
            dropped: self.dropped + other.dropped,
            pruned: self.pruned + other.pruned,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParallelStepScheduler {
    mode: ExecutionMode,
    chunk_size: usize,
    /// Dedicated pool. `None` means rayon's global pool.
    pool: Option<Arc<ThreadPool>>,
}

impl ParallelStepScheduler {
    pub fn from_config(config: &ExecutionConfig) -> Result<Self, SlamError> {
        let pool = match (config.mode, config.num_threads) {
            (ExecutionMode::Parallel, Some(threads)) => Some(Arc::new(
                ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("fastslam-worker-{i}"))
                    .build()?,
            )),
            _ => None,
        };
        Ok(Self {
            mode: config.mode,
            chunk_size: config.chunk_size.max(1),
            pool,
        })
    }

    pub fn sequential() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            chunk_size: 1,
            pool: None,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Updates every particle in place and returns once all are done.
    pub fn run(&self, set: &mut ParticleSet, inputs: &StepInputs) -> StepOutcome {
        let particles = set.particles_mut();
        match self.mode {
            ExecutionMode::Sequential => run_chunk(0, particles, inputs),
            ExecutionMode::Parallel => match &self.pool {
                Some(pool) => pool.install(|| self.run_parallel(particles, inputs)),
                None => self.run_parallel(particles, inputs),
            },
        }
    }

    fn run_parallel(&self, particles: &mut [ParticleState], inputs: &StepInputs) -> StepOutcome {
        let chunk_size = self.chunk_size;
        particles
            .par_chunks_mut(chunk_size)
            .enumerate()
            .map(|(chunk, slice)| run_chunk(chunk * chunk_size, slice, inputs))
            .reduce(StepOutcome::default, StepOutcome::merge)
    }
}

fn run_chunk(offset: usize, slice: &mut [ParticleState], inputs: &StepInputs) -> StepOutcome {
    let mut outcome = StepOutcome::default();
    for (i, particle) in slice.iter_mut().enumerate() {
        outcome.record(update_particle(offset + i, particle, inputs));
    }
    outcome
}

/// Motion, observation update and pruning for one particle. Any error or
/// panic leaves the particle with `FAILED_PARTICLE_WEIGHT`.
fn update_particle(
    index: usize,
    particle: &mut ParticleState,
    inputs: &StepInputs,
) -> Result<(ParticleUpdate, usize), SlamError> {
    let mut rng = SlamRng::seed_from_u64(inputs.step_seed);
    rng.set_stream(index as u64);

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        particle.pose = inputs
            .motion
            .advance(&particle.pose, inputs.control, inputs.motion_noise, &mut rng);
        let update = inputs
            .strategy
            .update(particle, inputs.observations, &inputs.context, &mut rng)?;
        if !particle.weight.is_finite() || particle.weight < 0.0 {
            return Err(SlamError::NonFiniteLikelihood {
                context: "updating the particle weight",
            });
        }
        let pruned = particle.prune(inputs.pruning);
        Ok((update, pruned))
    }))
    .unwrap_or_else(|payload| Err(SlamError::WorkerPanic(panic_message(payload))));

    if let Err(err) = &result {
        warn!(
            particle = index,
            strategy = inputs.strategy.name(),
            %err,
            "particle update failed"
        );
        particle.weight = FAILED_PARTICLE_WEIGHT;
    }
    result
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
