// fastslam_core/src/estimation/particle.rs

use crate::config::LandmarkPruning;
use crate::estimation::landmark::Landmark;
use crate::types::{Point2, Pose};

/// One hypothesis: a robot pose, its importance weight and its own map.
///
/// Landmarks are kept in creation order, so an index into `landmarks`
/// stays stable until pruning removes older entries.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleState {
    pub pose: Pose,
    pub weight: f64,
    pub landmarks: Vec<Landmark>,
}

impl ParticleState {
    pub fn new(pose: Pose, weight: f64) -> Self {
        Self {
            pose,
            weight,
            landmarks: Vec::new(),
        }
    }

    pub fn position(&self) -> Point2 {
        self.pose.position()
    }

    pub fn landmark_positions(&self) -> Vec<Point2> {
        self.landmarks.iter().map(Landmark::position).collect()
    }

    /// Applies the bounded-memory policy. Returns how many landmarks were dropped.
    pub fn prune(&mut self, policy: LandmarkPruning) -> usize {
        match policy {
            LandmarkPruning::Unbounded => 0,
            LandmarkPruning::KeepMostRecent(cap) => {
                let excess = self.landmarks.len().saturating_sub(cap);
                if excess > 0 {
                    self.landmarks.drain(..excess);
                }
                excess
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix2, Vector2};

    fn particle_with(n: usize) -> ParticleState {
        let mut p = ParticleState::new(Pose::default(), 1.0);
        for i in 0..n {
            p.landmarks.push(Landmark::new(
                Vector2::new(i as f64, 0.0),
                Matrix2::identity(),
            ));
        }
        p
    }

    #[test]
    fn pruning_keeps_the_most_recent_landmarks() {
        let mut p = particle_with(5);
        assert_eq!(p.prune(LandmarkPruning::KeepMostRecent(2)), 3);
        let xs: Vec<f64> = p.landmark_positions().iter().map(|l| l.x).collect();
        assert_eq!(xs, vec![3.0, 4.0]);
    }

    #[test]
    fn unbounded_policy_never_drops() {
        let mut p = particle_with(5);
        assert_eq!(p.prune(LandmarkPruning::Unbounded), 0);
        assert_eq!(p.landmarks.len(), 5);
    }

    #[test]
    fn clones_do_not_share_landmarks() {
        let original = particle_with(1);
        let mut copy = original.clone();
        copy.landmarks[0].mean.x = 42.0;
        assert_eq!(original.landmarks[0].mean.x, 0.0);
    }
}
