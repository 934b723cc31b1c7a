// fastslam_sim/src/prelude.rs

// Re-export the entire fastslam_core prelude so the filter types are at hand.
pub use fastslam_core::prelude::*;

// Re-export common simulation-specific types.
pub use crate::error::SimError;
pub use crate::simulation::config::{
    discover_scenarios, load_scenario, RobotSection, ScenarioConfig, SimulatedSensor,
    SimulationSection, WorldSection,
};
pub use crate::simulation::runner::{run_scenario, RunSummary};
pub use crate::simulation::world::{GroundTruth, RangeBearingSensor, SquareLoop, World};
