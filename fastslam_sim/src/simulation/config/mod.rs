// fastslam_sim/src/simulation/config/mod.rs

//! Loads a scenario from a TOML file, layered over the built-in defaults and
//! under `FASTSLAM_`-prefixed environment variables.

mod catalog;

use fastslam_core::config::{FilterConfig, MotionNoise};
use fastslam_core::types::Pose;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::SimError;
pub use catalog::discover_scenarios;

/// Prefix of environment overrides. Nested keys use `__`, e.g.
/// `FASTSLAM_FILTER__NUM_PARTICLES=200`.
pub const ENV_PREFIX: &str = "FASTSLAM_";

// =========================================================================
// == Top-Level Configuration ==
// =========================================================================

/// # ScenarioConfig
/// The root of the data parsed from a scenario file. Every section is
/// optional and falls back to its defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    pub simulation: SimulationSection,
    pub world: WorldSection,
    pub robot: RobotSection,
    /// Handed to the filter unchanged.
    pub filter: FilterConfig,
}

// =========================================================================
// == Configuration Sub-Structs ==
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationSection {
    /// Used in log lines and as the output sub-directory in batch runs.
    pub name: String,
    pub steps: usize,
    /// Seed for the world layout and the ground-truth noise.
    pub seed: u64,
    /// Log the pose error every this many steps. 0 disables it.
    pub log_every: usize,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            name: "scenario".to_string(),
            steps: 200,
            seed: 0,
            log_every: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldSection {
    /// Explicit landmark positions `[x, y]`.
    pub landmarks: Vec<[f64; 2]>,
    /// Extra landmarks scattered uniformly over the room.
    pub random_landmarks: usize,
    /// The room spans `[-margin, side + margin]` on both axes, where `side`
    /// is the robot's square side length.
    pub room_margin: f64,
}

impl Default for WorldSection {
    fn default() -> Self {
        Self {
            landmarks: Vec::new(),
            random_landmarks: 0,
            room_margin: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RobotSection {
    pub start: Pose,
    /// Length of one side of the square loop the robot drives.
    pub side_length: f64,
    /// Distance commanded per step.
    pub step_distance: f64,
    /// How far the real motion strays from the commanded one.
    pub odometry_noise: MotionNoise,
    pub sensor: SimulatedSensor,
}

impl Default for RobotSection {
    fn default() -> Self {
        Self {
            start: Pose::default(),
            side_length: 20.0,
            step_distance: 1.0,
            odometry_noise: MotionNoise {
                translation_std: 0.05,
                rotation_std: 0.5_f64.to_radians(),
            },
            sensor: SimulatedSensor::default(),
        }
    }
}

/// The range-bearing sensor that produces observations from ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulatedSensor {
    pub range_std: f64,
    pub bearing_std: f64,
    pub max_range: f64,
    pub half_fov: f64,
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self {
            range_std: 0.1,
            bearing_std: 1.0_f64.to_radians(),
            max_range: 15.0,
            half_fov: 90.0_f64.to_radians(),
        }
    }
}

impl ScenarioConfig {
    /// Checks the simulator's own settings. The filter section is checked by
    /// the filter when it is built.
    pub fn validate(&self) -> Result<(), SimError> {
        let invalid = |reason: &str| SimError::InvalidScenario {
            name: self.simulation.name.clone(),
            reason: reason.to_string(),
        };
        let robot = &self.robot;
        if !(robot.side_length > 0.0 && robot.step_distance > 0.0) {
            return Err(invalid("robot.side_length and robot.step_distance must be positive"));
        }
        if robot.step_distance > robot.side_length {
            return Err(invalid("robot.step_distance must not exceed robot.side_length"));
        }
        let s = &robot.sensor;
        if !(s.range_std >= 0.0 && s.bearing_std >= 0.0 && s.max_range > 0.0 && s.half_fov > 0.0) {
            return Err(invalid("robot.sensor values must be positive"));
        }
        if !(self.world.room_margin >= 0.0) {
            return Err(invalid("world.room_margin must be non-negative"));
        }
        if self.world.landmarks.is_empty() && self.world.random_landmarks == 0 {
            return Err(invalid("the world has no landmarks"));
        }
        Ok(())
    }
}

/// Loads, merges and validates one scenario file.
pub fn load_scenario(path: &Path) -> Result<ScenarioConfig, SimError> {
    if !path.is_file() {
        return Err(SimError::ScenarioNotFound(path.to_path_buf()));
    }
    info!("Loading scenario from: {}", path.display());

    let mut scenario: ScenarioConfig =
        Figment::from(Serialized::defaults(ScenarioConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

    // A scenario without a name is named after its file.
    if scenario.simulation.name == SimulationSection::default().name {
        if let Some(stem) = path.file_stem() {
            scenario.simulation.name = stem.to_string_lossy().into_owned();
        }
    }
    scenario.validate()?;
    Ok(scenario)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastslam_core::config::{LandmarkPruning, UpdateStrategyKind};
    use figment::Jail;

    fn load(path: &str) -> Result<ScenarioConfig, figment::Error> {
        load_scenario(Path::new(path)).map_err(|e| figment::Error::from(e.to_string()))
    }

    #[test]
    fn partial_file_keeps_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "loop.toml",
                r#"
                [simulation]
                steps = 40

                [world]
                landmarks = [[3.0, 4.0], [10.0, -2.0]]

                [filter]
                num_particles = 12
                strategy = "ekf_only"
                pruning = { keep_most_recent = 30 }

                [filter.sensor]
                max_range = 15.0
                "#,
            )?;

            let scenario = load("loop.toml")?;
            assert_eq!(scenario.simulation.name, "loop");
            assert_eq!(scenario.simulation.steps, 40);
            assert_eq!(scenario.simulation.log_every, 20);
            assert_eq!(scenario.world.landmarks, vec![[3.0, 4.0], [10.0, -2.0]]);
            assert_eq!(scenario.robot, RobotSection::default());
            assert_eq!(scenario.filter.num_particles, 12);
            assert_eq!(scenario.filter.strategy, UpdateStrategyKind::EkfOnly);
            assert_eq!(scenario.filter.pruning, LandmarkPruning::KeepMostRecent(30));
            assert_eq!(scenario.filter.sensor.max_range, Some(15.0));
            assert_eq!(scenario.filter.sensor.range_variance, 0.1);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_the_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "env.toml",
                r#"
                [world]
                random_landmarks = 8
                [filter]
                num_particles = 12
                "#,
            )?;
            jail.set_env("FASTSLAM_FILTER__NUM_PARTICLES", "64");
            jail.set_env("FASTSLAM_SIMULATION__NAME", "from-env");

            let scenario = load("env.toml")?;
            assert_eq!(scenario.filter.num_particles, 64);
            assert_eq!(scenario.simulation.name, "from-env");
            Ok(())
        });
    }

    #[test]
    fn unknown_keys_and_empty_worlds_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("typo.toml", "[world]\nrandom_landmarkz = 3\n")?;
            jail.create_file("empty.toml", "[simulation]\nsteps = 3\n")?;
            assert!(load("typo.toml").is_err());
            assert!(load("empty.toml").is_err());
            Ok(())
        });
    }

    #[test]
    fn missing_file_is_reported() {
        assert!(matches!(
            load_scenario(Path::new("definitely/not/here.toml")),
            Err(SimError::ScenarioNotFound(_))
        ));
    }

    #[test]
    fn resolved_scenario_round_trips_through_toml() {
        let mut scenario = ScenarioConfig::default();
        scenario.world.landmarks = vec![[1.0, 2.0]];
        scenario.filter.pruning = LandmarkPruning::KeepMostRecent(5);
        let text = toml::to_string(&scenario).unwrap();
        let back: ScenarioConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, scenario);
    }
}
