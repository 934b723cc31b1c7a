// fastslam_core/src/config.rs

//! Tunable parameters of the filter. Every struct deserializes with defaults
//! so a scenario file only needs to mention what it changes.

use serde::{Deserialize, Serialize};

use crate::error::SlamError;

/// Which per-particle observation update to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStrategyKind {
    /// FastSLAM 2.0: the pose is re-sampled from a proposal that already
    /// includes the latest observations.
    #[default]
    Proposal,
    /// FastSLAM 1.0: landmarks are updated against the motion-sampled pose only.
    /// Cheaper, lower fidelity.
    EkfOnly,
}

/// Gaussian noise injected by the motion model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionNoise {
    /// Standard deviation added independently to x and y after a move.
    pub translation_std: f64,
    /// Standard deviation added to every heading change, in radians.
    pub rotation_std: f64,
}

impl MotionNoise {
    /// Used by the robot track, which follows the commands exactly.
    pub const NONE: MotionNoise = MotionNoise {
        translation_std: 0.0,
        rotation_std: 0.0,
    };
}

impl Default for MotionNoise {
    fn default() -> Self {
        Self {
            translation_std: 0.1,
            rotation_std: 1.0_f64.to_radians(),
        }
    }
}

/// Range-bearing sensor description.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Variance of the range reading.
    pub range_variance: f64,
    /// Variance of the bearing reading, in rad².
    pub bearing_variance: f64,
    /// Maximum sensing distance. `None` disables range gating.
    pub max_range: Option<f64>,
    /// Half of the angular field of view. `None` disables bearing gating.
    pub half_fov: Option<f64>,
    /// Safety factor applied to both gates.
    pub gate_margin: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            range_variance: 0.1,
            bearing_variance: 3.0_f64.to_radians().powi(2),
            max_range: None,
            half_fov: None,
            gate_margin: 1.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationConfig {
    /// Below this likelihood an observation starts a new landmark.
    pub likelihood_threshold: f64,
    /// Importance factor applied for each observation that creates a landmark.
    pub new_landmark_likelihood: f64,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            likelihood_threshold: 1e-4,
            new_landmark_likelihood: 1e-4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalConfig {
    /// Diagonal of the pose prior covariance `[σx², σy², σθ²]`.
    pub pose_variance: [f64; 3],
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            pose_variance: [0.2, 0.2, 3.0_f64.to_radians().powi(2)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResamplingConfig {
    /// Resample when ESS drops below `ess_ratio * N`.
    pub ess_ratio: f64,
    /// Only check the ESS every `interval` steps.
    pub interval: u64,
}

impl Default for ResamplingConfig {
    fn default() -> Self {
        Self {
            ess_ratio: 1.0 / 1.5,
            interval: 1,
        }
    }
}

/// Bounded-memory policy for per-particle landmark lists. Pruning discards
/// information, so it is off unless asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkPruning {
    #[default]
    Unbounded,
    /// Keep only the `n` most recently created landmarks.
    KeepMostRecent(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Parallel,
    Sequential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    /// Particles handed to one worker task at a time.
    pub chunk_size: usize,
    /// Size of a dedicated worker pool. `None` uses rayon's global pool.
    pub num_threads: Option<usize>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Parallel,
            chunk_size: 4,
            num_threads: None,
        }
    }
}

/// The full filter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub num_particles: usize,
    pub strategy: UpdateStrategyKind,
    /// Width of the uniform heading spread given to particles at start-up.
    pub initial_heading_jitter: f64,
    /// Seed for every random draw the filter makes.
    pub seed: u64,
    pub motion: MotionNoise,
    pub sensor: SensorConfig,
    pub association: AssociationConfig,
    pub proposal: ProposalConfig,
    pub resampling: ResamplingConfig,
    pub pruning: LandmarkPruning,
    pub execution: ExecutionConfig,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            num_particles: 50,
            strategy: UpdateStrategyKind::default(),
            initial_heading_jitter: 0.1,
            seed: 0,
            motion: MotionNoise::default(),
            sensor: SensorConfig::default(),
            association: AssociationConfig::default(),
            proposal: ProposalConfig::default(),
            resampling: ResamplingConfig::default(),
            pruning: LandmarkPruning::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

fn require(ok: bool, msg: impl FnOnce() -> String) -> Result<(), SlamError> {
    if ok {
        Ok(())
    } else {
        Err(SlamError::InvalidConfig(msg()))
    }
}

impl FilterConfig {
    /// Checks the invariants the filter relies on.
    pub fn validate(&self) -> Result<(), SlamError> {
        require(self.num_particles > 0, || {
            "num_particles must be at least 1".into()
        })?;
        require(
            self.initial_heading_jitter.is_finite() && self.initial_heading_jitter >= 0.0,
            || "initial_heading_jitter must be finite and non-negative".into(),
        )?;
        require(
            self.motion.translation_std >= 0.0 && self.motion.rotation_std >= 0.0,
            || "motion noise standard deviations must be non-negative".into(),
        )?;
        require(
            self.sensor.range_variance > 0.0 && self.sensor.bearing_variance > 0.0,
            || "sensor variances must be strictly positive".into(),
        )?;
        require(self.sensor.gate_margin > 0.0, || {
            "sensor.gate_margin must be positive".into()
        })?;
        if let Some(range) = self.sensor.max_range {
            require(range > 0.0, || "sensor.max_range must be positive".into())?;
        }
        if let Some(fov) = self.sensor.half_fov {
            require(fov > 0.0, || "sensor.half_fov must be positive".into())?;
        }
        require(
            self.association.likelihood_threshold >= 0.0
                && self.association.new_landmark_likelihood > 0.0,
            || "association likelihoods must be positive".into(),
        )?;
        require(
            self.proposal.pose_variance.iter().all(|v| *v > 0.0),
            || "proposal.pose_variance entries must be strictly positive".into(),
        )?;
        require(
            self.resampling.ess_ratio > 0.0 && self.resampling.ess_ratio <= 1.0,
            || "resampling.ess_ratio must lie in (0, 1]".into(),
        )?;
        require(self.resampling.interval > 0, || {
            "resampling.interval must be at least 1".into()
        })?;
        require(self.execution.chunk_size > 0, || {
            "execution.chunk_size must be at least 1".into()
        })?;
        if let LandmarkPruning::KeepMostRecent(n) = self.pruning {
            require(n > 0, || "pruning must keep at least one landmark".into())?;
        }
        if let Some(threads) = self.execution.num_threads {
            require(threads > 0, || "execution.num_threads must be positive".into())?;
        }
        Ok(())
    }
}
