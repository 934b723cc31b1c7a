// fastslam_core/src/slam/fast_slam.rs

use rand::{Rng, SeedableRng};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::{FilterConfig, MotionNoise};
use crate::error::SlamError;
use crate::estimation::scheduler::StepInputs;
use crate::estimation::{
    build_strategy, ParallelStepScheduler, ParticleSet, ParticleState, SensorGate, UpdateContext,
    UpdateStrategy, WeightStatus,
};
use crate::messages::{SlamInput, StepReport};
use crate::metrics::{Counter, MetricsCollector, NoopMetrics, Timer};
use crate::models::{MotionModel, OdometryMotionModel, RangeBearingModel};
use crate::slam::{export, SlamSystem};
use crate::types::{Control, Observation, Point2, Pose, SlamRng};

/// A Rao-Blackwellized particle filter for landmark SLAM.
///
/// Each particle carries a pose hypothesis and its own set of independent
/// landmark EKFs. A step moves every particle with noisy odometry, folds the
/// observations in through the configured update strategy, renormalizes the
/// weights and resamples when the effective sample size collapses.
#[derive(Debug)]
pub struct FastSlam {
    config: FilterConfig,
    particles: ParticleSet,
    motion: OdometryMotionModel,
    sensor: RangeBearingModel,
    gate: SensorGate,
    strategy: Box<dyn UpdateStrategy>,
    scheduler: ParallelStepScheduler,
    metrics: Arc<dyn MetricsCollector>,
    /// Drives step seeds and resampling. Particle noise never comes from here
    /// directly.
    rng: SlamRng,
    /// Dead-reckoned track of the commands, without noise.
    robot: Pose,
    steps: u64,
}

impl FastSlam {
    /// Creates a filter with every particle at `start`, discarding metrics.
    pub fn new(config: FilterConfig, start: Pose) -> Result<Self, SlamError> {
        Self::with_metrics(config, start, Arc::new(NoopMetrics))
    }

    /// Creates a filter that reports into `metrics`.
    pub fn with_metrics(
        config: FilterConfig,
        start: Pose,
        metrics: Arc<dyn MetricsCollector>,
    ) -> Result<Self, SlamError> {
        config.validate()?;
        if !start.is_finite() {
            return Err(SlamError::InvalidConfig(format!(
                "start pose must be finite, got {start:?}"
            )));
        }

        let strategy = build_strategy(&config)?;
        let scheduler = ParallelStepScheduler::from_config(&config.execution)?;
        let mut rng = SlamRng::seed_from_u64(config.seed);
        let particles = ParticleSet::new(
            config.num_particles,
            start,
            config.initial_heading_jitter,
            &mut rng,
        );

        info!(
            particles = config.num_particles,
            strategy = strategy.name(),
            mode = ?scheduler.mode(),
            seed = config.seed,
            "fastslam filter initialized"
        );

        Ok(Self {
            sensor: RangeBearingModel::from_config(&config.sensor),
            gate: SensorGate::from_config(&config.sensor),
            motion: OdometryMotionModel,
            strategy,
            scheduler,
            metrics,
            rng,
            particles,
            robot: start,
            steps: 0,
            config,
        })
    }

    /// Advances the filter by one control and its observations.
    ///
    /// Inputs are validated before any particle is touched; a rejected input
    /// leaves the filter exactly as it was.
    pub fn step(
        &mut self,
        control: &Control,
        observations: &[Observation],
    ) -> Result<StepReport, SlamError> {
        let started = Instant::now();
        control.validate()?;
        for (i, obs) in observations.iter().enumerate() {
            obs.validate(i)?;
        }

        let step_seed: u64 = self.rng.gen();
        self.robot = self
            .motion
            .advance(&self.robot, control, &MotionNoise::NONE, &mut self.rng);

        let inputs = StepInputs {
            control,
            observations,
            motion: &self.motion,
            motion_noise: &self.config.motion,
            strategy: self.strategy.as_ref(),
            context: UpdateContext {
                model: &self.sensor,
                gate: &self.gate,
                association: &self.config.association,
                metrics: self.metrics.as_ref(),
            },
            pruning: self.config.pruning,
            step_seed,
        };
        let updates_started = Instant::now();
        let outcome = self.scheduler.run(&mut self.particles, &inputs);
        self.metrics
            .record_duration(Timer::ParticleUpdates, updates_started.elapsed());

        let degenerate = self.particles.normalize() == WeightStatus::Degenerate;
        let ess = self.particles.effective_sample_size();
        self.steps += 1;

        let resampled = self.steps % self.config.resampling.interval == 0
            && self.particles.should_resample(self.config.resampling.ess_ratio);
        if resampled {
            let resampling_started = Instant::now();
            self.particles.low_variance_resample(&mut self.rng);
            self.metrics
                .record_duration(Timer::Resampling, resampling_started.elapsed());
        }

        let m = &self.metrics;
        m.increment(Counter::Steps, 1);
        m.increment(Counter::LandmarksCreated, outcome.created as u64);
        m.increment(Counter::LandmarksUpdated, outcome.updated as u64);
        m.increment(Counter::FailedParticles, outcome.failed_particles as u64);
        m.increment(Counter::DegenerateWeights, u64::from(degenerate));
        m.increment(Counter::Resamples, u64::from(resampled));
        m.record_duration(Timer::Step, started.elapsed());

        debug!(
            step = self.steps,
            observations = observations.len(),
            created = outcome.created,
            updated = outcome.updated,
            failed = outcome.failed_particles,
            ess,
            resampled,
            "step complete"
        );

        Ok(StepReport {
            step: self.steps,
            failed_particles: outcome.failed_particles,
            landmarks_created: outcome.created,
            landmarks_updated: outcome.updated,
            observations_dropped: outcome.dropped,
            landmarks_pruned: outcome.pruned,
            effective_sample_size: ess,
            degenerate_weights: degenerate,
            resampled,
        })
    }

    /// Weight-averaged pose with a circular mean for the heading.
    pub fn mean_pose(&self) -> Pose {
        self.particles.mean_pose()
    }

    /// The commanded track, integrated without noise.
    pub fn robot_pose(&self) -> Pose {
        self.robot
    }

    pub fn landmarks(&self, particle_index: usize) -> Result<Vec<Point2>, SlamError> {
        Ok(self.particles.get(particle_index)?.landmark_positions())
    }

    pub fn particle_positions(&self) -> Vec<Point2> {
        self.particles.particles().iter().map(ParticleState::position).collect()
    }

    /// Landmark map averaged over the particles that agree on the map size.
    pub fn mean_landmarks(&self) -> Vec<Point2> {
        self.particles.mean_landmarks()
    }

    /// Index of the particle with the largest weight.
    pub fn best_particle_index(&self) -> usize {
        self.particles
            .particles()
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.weight.total_cmp(&b.1.weight))
            .map_or(0, |(i, _)| i)
    }

    /// Writes one particle's landmarks as an `x,y` table.
    pub fn export_landmarks(&self, path: &Path, particle_index: usize) -> Result<(), SlamError> {
        export::write_points(path, &self.landmarks(particle_index)?)
    }

    /// Writes the landmarks of every particle into one `x,y` table.
    pub fn export_all_landmarks(&self, path: &Path) -> Result<(), SlamError> {
        let all: Vec<Point2> = self
            .particles
            .particles()
            .iter()
            .flat_map(ParticleState::landmark_positions)
            .collect();
        export::write_points(path, &all)
    }

    pub fn particles(&self) -> &ParticleSet {
        &self.particles
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }
}

impl SlamSystem for FastSlam {
    fn process(&mut self, input: &SlamInput) -> Result<StepReport, SlamError> {
        self.step(&input.control, &input.observations)
    }

    fn estimated_pose(&self) -> Pose {
        self.mean_pose()
    }

    fn estimated_map(&self) -> Vec<Point2> {
        self.mean_landmarks()
    }
}
