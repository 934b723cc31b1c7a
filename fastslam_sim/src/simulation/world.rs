// fastslam_sim/src/simulation/world.rs

use fastslam_core::config::MotionNoise;
use fastslam_core::messages::SlamInput;
use fastslam_core::models::{MotionModel, OdometryMotionModel};
use fastslam_core::types::{normalize_angle, Control, Observation, Point2, Pose, SlamRng};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::FRAC_PI_2;

use crate::simulation::config::{RobotSection, ScenarioConfig, SimulatedSensor, WorldSection};

// =========================================================================
// == Landmark World ==
// =========================================================================

/// The ground-truth map: a fixed set of point landmarks.
#[derive(Debug, Clone)]
pub struct World {
    landmarks: Vec<Point2>,
}

impl World {
    /// Builds the explicit landmarks of `world` plus its random ones, scattered
    /// over the area around the robot's square.
    pub fn generate(world: &WorldSection, robot: &RobotSection, rng: &mut SlamRng) -> Self {
        let mut landmarks: Vec<Point2> = world
            .landmarks
            .iter()
            .map(|&[x, y]| Point2::new(x, y))
            .collect();

        let lo_x = robot.start.x - world.room_margin;
        let lo_y = robot.start.y - world.room_margin;
        let span = robot.side_length + 2.0 * world.room_margin;
        for _ in 0..world.random_landmarks {
            landmarks.push(Point2::new(
                lo_x + rng.gen::<f64>() * span,
                lo_y + rng.gen::<f64>() * span,
            ));
        }
        Self { landmarks }
    }

    pub fn from_landmarks(landmarks: Vec<Point2>) -> Self {
        Self { landmarks }
    }

    pub fn landmarks(&self) -> &[Point2] {
        &self.landmarks
    }
}

// =========================================================================
// == Sensor ==
// =========================================================================

/// Produces noisy range-bearing readings of every landmark within range and
/// field of view.
#[derive(Debug, Clone, Copy)]
pub struct RangeBearingSensor {
    config: SimulatedSensor,
}

impl RangeBearingSensor {
    pub fn new(config: SimulatedSensor) -> Self {
        Self { config }
    }

    pub fn observe(&self, pose: &Pose, world: &World, rng: &mut SlamRng) -> Vec<Observation> {
        let mut observations = Vec::new();
        for lm in world.landmarks() {
            let dx = lm.x - pose.x;
            let dy = lm.y - pose.y;
            let range = dx.hypot(dy);
            let bearing = normalize_angle(dy.atan2(dx) - pose.theta);
            if range > self.config.max_range || bearing.abs() > self.config.half_fov {
                continue;
            }

            let noisy_range = range + gaussian(self.config.range_std, rng);
            // A reading that lands on or behind the sensor is not reported.
            if noisy_range <= 0.0 {
                continue;
            }
            let noisy_bearing = normalize_angle(bearing + gaussian(self.config.bearing_std, rng));
            observations.push(Observation::new(noisy_range, noisy_bearing));
        }
        observations
    }
}

fn gaussian(std: f64, rng: &mut SlamRng) -> f64 {
    match Normal::new(0.0, std) {
        Ok(dist) if std > 0.0 => dist.sample(rng),
        _ => 0.0,
    }
}

// =========================================================================
// == Driving Script ==
// =========================================================================

/// A counter-clockwise square loop: straight segments of `step_distance`,
/// with a quarter turn at each corner.
#[derive(Debug, Clone, Copy)]
pub struct SquareLoop {
    step_distance: f64,
    steps_per_side: usize,
}

impl SquareLoop {
    pub fn new(robot: &RobotSection) -> Self {
        let steps_per_side = (robot.side_length / robot.step_distance).round().max(1.0) as usize;
        Self {
            step_distance: robot.step_distance,
            steps_per_side,
        }
    }

    /// The command for step `index` (0-based). The turn of a corner is folded
    /// into the first command of the following side.
    pub fn control(&self, index: usize) -> Control {
        let turn = if index > 0 && index % self.steps_per_side == 0 {
            FRAC_PI_2
        } else {
            0.0
        };
        Control::new(self.step_distance, turn)
    }
}

// =========================================================================
// == Ground Truth ==
// =========================================================================

/// The simulated robot: follows the commands with odometry noise and looks at
/// the world after every move.
#[derive(Debug, Clone)]
pub struct GroundTruth {
    pub pose: Pose,
    odometry_noise: MotionNoise,
    sensor: RangeBearingSensor,
    route: SquareLoop,
    rng: SlamRng,
}

impl GroundTruth {
    pub fn new(scenario: &ScenarioConfig, rng: SlamRng) -> Self {
        Self {
            pose: scenario.robot.start,
            odometry_noise: scenario.robot.odometry_noise,
            sensor: RangeBearingSensor::new(scenario.robot.sensor),
            route: SquareLoop::new(&scenario.robot),
            rng,
        }
    }

    /// Moves the robot for step `index` and returns the commanded control
    /// together with what the sensor saw from the new pose.
    pub fn advance(&mut self, index: usize, world: &World) -> SlamInput {
        let control = self.route.control(index);
        self.pose =
            OdometryMotionModel.advance(&self.pose, &control, &self.odometry_noise, &mut self.rng);
        let observations = self.sensor.observe(&self.pose, world, &mut self.rng);
        SlamInput::new(control, observations)
    }
}
