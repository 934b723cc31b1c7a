// fastslam_sim/src/simulation/mod.rs

//! Everything needed to run the filter against a synthetic world: scenario
//! loading, the world and its sensor, and the step loop.

pub mod config;
pub mod runner;
pub mod world;
