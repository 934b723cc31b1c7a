// fastslam_core/src/estimation/association.rs

//! Maximum-likelihood data association shared by both update strategies.

use nalgebra::Vector2;
use tracing::debug;

use crate::config::SensorConfig;
use crate::error::SlamError;
use crate::estimation::landmark::Landmark;
use crate::metrics::{Counter, MetricsCollector};
use crate::types::{normalize_angle, Pose};

/// Restricts association to landmarks the sensor could plausibly have seen.
#[derive(Debug, Clone, Copy)]
pub struct SensorGate {
    max_distance: Option<f64>,
    max_bearing: Option<f64>,
}

impl SensorGate {
    /// A gate that admits everything.
    pub const OPEN: SensorGate = SensorGate {
        max_distance: None,
        max_bearing: None,
    };

    pub fn from_config(sensor: &SensorConfig) -> Self {
        Self {
            max_distance: sensor.max_range.map(|r| r * sensor.gate_margin),
            max_bearing: sensor.half_fov.map(|f| f * sensor.gate_margin),
        }
    }

    pub fn admits(&self, pose: &Pose, landmark: &Vector2<f64>) -> bool {
        let dx = landmark.x - pose.x;
        let dy = landmark.y - pose.y;
        if let Some(max) = self.max_distance {
            if dx.hypot(dy) >= max {
                return false;
            }
        }
        if let Some(max) = self.max_bearing {
            if normalize_angle(dy.atan2(dx) - pose.theta).abs() >= max {
                return false;
            }
        }
        true
    }

    /// Landmarks inside the gate, with their index in the particle's map.
    pub fn candidates<'a>(
        &'a self,
        pose: &'a Pose,
        landmarks: &'a [Landmark],
    ) -> impl Iterator<Item = (usize, &'a Landmark)> + 'a {
        landmarks
            .iter()
            .enumerate()
            .filter(move |(_, lm)| self.admits(pose, &lm.mean))
    }
}

/// Outcome of associating one observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Update the landmark at this index.
    Existing(usize),
    /// Start a new landmark.
    New,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Association {
    /// Position of the observation in the step's input batch.
    pub observation: usize,
    pub decision: Decision,
    /// Best likelihood found, 0 when no candidate was scored.
    pub likelihood: f64,
}

/// Picks the best-scoring landmark and applies the new-landmark threshold.
///
/// Candidates whose score failed numerically are skipped; if none survive the
/// observation is treated as new.
pub fn maximum_likelihood<I>(
    observation: usize,
    scores: I,
    threshold: f64,
    metrics: &dyn MetricsCollector,
) -> Association
where
    I: IntoIterator<Item = (usize, Result<f64, SlamError>)>,
{
    let mut best: Option<(usize, f64)> = None;
    let mut tested = 0u64;

    for (idx, score) in scores {
        tested += 1;
        match score {
            Ok(p) => {
                if best.map_or(true, |(_, bp)| p > bp) {
                    best = Some((idx, p));
                }
            }
            Err(err) => {
                if matches!(err, SlamError::SingularInnovation { .. }) {
                    metrics.increment(Counter::SingularInnovations, 1);
                }
                debug!(landmark = idx, %err, "skipping association candidate");
            }
        }
    }
    metrics.increment(Counter::AssociationTests, tested);

    match best {
        Some((idx, p)) if p >= threshold => Association {
            observation,
            decision: Decision::Existing(idx),
            likelihood: p,
        },
        Some((_, p)) => Association {
            observation,
            decision: Decision::New,
            likelihood: p,
        },
        None => Association {
            observation,
            decision: Decision::New,
            likelihood: 0.0,
        },
    }
}

/// Puts updates of existing landmarks first and creations last, keeping the
/// input order within each group.
pub fn order_new_last(associations: &mut [Association]) {
    associations.sort_by_key(|a| matches!(a.decision, Decision::New));
}
