// fastslam_core/src/estimation/particle_set.rs

use rand::Rng;
use std::collections::HashMap;
use tracing::warn;

use crate::error::SlamError;
use crate::estimation::particle::ParticleState;
use crate::types::{normalize_angle, Point2, Pose, SlamRng};

/// Result of renormalizing the weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightStatus {
    Normalized,
    /// The weights summed to zero or a non-finite value and were reset to uniform.
    Degenerate,
}

/// A fixed-size population of particles stored contiguously so workers can
/// borrow disjoint slices of it.
#[derive(Debug, Clone)]
pub struct ParticleSet {
    particles: Vec<ParticleState>,
}

impl ParticleSet {
    /// Creates `n` particles at `start` with uniform weights. Each heading gets
    /// an independent uniform perturbation of total width `heading_jitter`.
    pub fn new(n: usize, start: Pose, heading_jitter: f64, rng: &mut SlamRng) -> Self {
        let weight = 1.0 / n as f64;
        let half = heading_jitter * 0.5;
        let particles = (0..n)
            .map(|_| {
                let theta = if half > 0.0 {
                    start.theta + rng.gen_range(-half..half)
                } else {
                    start.theta
                };
                ParticleState::new(Pose::new(start.x, start.y, theta), weight)
            })
            .collect();
        Self { particles }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particles(&self) -> &[ParticleState] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [ParticleState] {
        &mut self.particles
    }

    pub fn get(&self, index: usize) -> Result<&ParticleState, SlamError> {
        self.particles
            .get(index)
            .ok_or(SlamError::ParticleIndexOutOfRange {
                index,
                len: self.particles.len(),
            })
    }

    pub fn weights(&self) -> impl Iterator<Item = f64> + '_ {
        self.particles.iter().map(|p| p.weight)
    }

    /// Scales the weights to sum to one.
    pub fn normalize(&mut self) -> WeightStatus {
        let total: f64 = self.weights().sum();
        if total > 0.0 && total.is_finite() {
            for p in &mut self.particles {
                p.weight /= total;
            }
            return WeightStatus::Normalized;
        }

        warn!(
            total,
            particles = self.len(),
            "degenerate particle weights, resetting to uniform"
        );
        let uniform = 1.0 / self.len() as f64;
        for p in &mut self.particles {
            p.weight = uniform;
        }
        WeightStatus::Degenerate
    }

    /// `1 / Σ w²`. Assumes normalized weights.
    pub fn effective_sample_size(&self) -> f64 {
        let sum_sq: f64 = self.weights().map(|w| w * w).sum();
        if sum_sq > 0.0 {
            1.0 / sum_sq
        } else {
            0.0
        }
    }

    pub fn should_resample(&self, ess_ratio: f64) -> bool {
        self.effective_sample_size() < ess_ratio * self.len() as f64
    }

    /// Systematic (low-variance) resampling. Every slot receives an
    /// independent copy of its source particle and the weights become 1/N.
    pub fn low_variance_resample(&mut self, rng: &mut SlamRng) {
        let n = self.len();
        if n == 0 {
            return;
        }
        let step = 1.0 / n as f64;
        let u: f64 = rng.gen_range(0.0..1.0);

        let mut cumulative = Vec::with_capacity(n);
        let mut acc = 0.0;
        for w in self.weights() {
            acc += w;
            cumulative.push(acc);
        }
        let total = acc;

        let mut resampled = Vec::with_capacity(n);
        let mut source = 0;
        for i in 0..n {
            let point = (i as f64 + u) * step * total;
            // `<=` so a zero-weight particle is never picked, even at point 0.
            while source < n - 1 && cumulative[source] <= point {
                source += 1;
            }
            let mut copy = self.particles[source].clone();
            copy.weight = step;
            resampled.push(copy);
        }
        self.particles = resampled;
    }

    /// Weighted mean of the particle poses, with a circular mean for heading.
    pub fn mean_pose(&self) -> Pose {
        let (mut x, mut y, mut s, mut c, mut total) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for p in &self.particles {
            x += p.weight * p.pose.x;
            y += p.weight * p.pose.y;
            s += p.weight * p.pose.theta.sin();
            c += p.weight * p.pose.theta.cos();
            total += p.weight;
        }
        if total <= 0.0 || !total.is_finite() {
            return Pose::default();
        }
        Pose::new(x / total, y / total, normalize_angle(s.atan2(c)))
    }

    /// Average map over the particles holding the most common number of
    /// landmarks, matched index by index.
    pub fn mean_landmarks(&self) -> Vec<Point2> {
        let mut counts: HashMap<usize, usize> = HashMap::new();
        for p in &self.particles {
            *counts.entry(p.landmarks.len()).or_default() += 1;
        }
        // Ties go to the larger map.
        let Some(mode) = counts
            .into_iter()
            .max_by_key(|&(len, count)| (count, len))
            .map(|(len, _)| len)
        else {
            return Vec::new();
        };

        let members: Vec<&ParticleState> = self
            .particles
            .iter()
            .filter(|p| p.landmarks.len() == mode)
            .collect();
        let k = members.len() as f64;
        (0..mode)
            .map(|i| {
                let sum = members
                    .iter()
                    .fold((0.0, 0.0), |(sx, sy), p| {
                        (sx + p.landmarks[i].mean.x, sy + p.landmarks[i].mean.y)
                    });
                Point2::new(sum.0 / k, sum.1 / k)
            })
            .collect()
    }
}
