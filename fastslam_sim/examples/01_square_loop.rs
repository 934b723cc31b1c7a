// fastslam_sim/examples/01_square_loop.rs

//! An end-to-end run that builds everything in code instead of from a TOML file.
//!
//! This example demonstrates how to:
//! 1. Describe a world and a robot with the scenario structs.
//! 2. Drive the ground truth and the filter step by step.
//! 3. Read back the pose estimate and the landmark map.
//!
//! To run this example:
//! `cargo run -p fastslam_sim --example 01_square_loop`

use fastslam_sim::logging::init_logging;
use fastslam_sim::prelude::*;
use rand::SeedableRng;

fn main() -> Result<(), SimError> {
    init_logging("info")?;

    // --- 1. Scenario ---
    let mut scenario = ScenarioConfig::default();
    scenario.simulation.seed = 3;
    scenario.world.landmarks = vec![
        [5.0, -4.0],
        [24.0, 5.0],
        [15.0, 24.0],
        [-4.0, 15.0],
        [10.0, 10.0],
    ];
    scenario.world.random_landmarks = 10;
    scenario.filter.num_particles = 30;

    // --- 2. World, ground truth and filter ---
    let mut rng = SlamRng::seed_from_u64(scenario.simulation.seed);
    let world = World::generate(&scenario.world, &scenario.robot, &mut rng);
    let mut truth = GroundTruth::new(&scenario, SlamRng::seed_from_u64(99));
    let mut slam = FastSlam::new(scenario.filter.clone(), scenario.robot.start)?;

    // --- 3. One lap around the square ---
    for i in 0..80 {
        let report = slam.process(&truth.advance(i, &world))?;
        if report.resampled {
            println!(
                "step {:3}: resampled (ESS was {:.1})",
                report.step, report.effective_sample_size
            );
        }
    }

    let estimate = slam.mean_pose();
    println!(
        "truth ({:.2}, {:.2}, {:.3})  estimate ({:.2}, {:.2}, {:.3})",
        truth.pose.x, truth.pose.y, truth.pose.theta, estimate.x, estimate.y, estimate.theta
    );
    for (i, lm) in slam.mean_landmarks().iter().enumerate() {
        println!("landmark {i:2}: ({:.2}, {:.2})", lm.x, lm.y);
    }
    Ok(())
}
