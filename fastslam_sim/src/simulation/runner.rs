// fastslam_sim/src/simulation/runner.rs

use fastslam_core::metrics::{InMemoryMetrics, MetricsSnapshot};
use fastslam_core::slam::{export, FastSlam, SlamSystem};
use fastslam_core::types::{normalize_angle, Point2, Pose, SlamRng};
use rand::SeedableRng;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::SimError;
use crate::simulation::config::ScenarioConfig;
use crate::simulation::world::{GroundTruth, World};

/// Random stream of the ground-truth robot, kept apart from the world layout.
const TRUTH_STREAM: u64 = 1;

/// How a run went, compared against ground truth.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub name: String,
    pub steps: usize,
    pub final_position_error: f64,
    pub final_heading_error: f64,
    pub mean_position_error: f64,
    pub max_position_error: f64,
    pub true_landmarks: usize,
    pub estimated_landmarks: usize,
    /// Mean distance from each estimated landmark to the closest true one.
    pub map_error: Option<f64>,
    pub resamples: usize,
    pub failed_particles: usize,
    pub metrics: MetricsSnapshot,
}

/// One row of the trajectory table.
#[derive(Debug, Clone, Copy)]
struct TrackPoint {
    step: usize,
    truth: Pose,
    estimate: Pose,
}

/// Runs `scenario` to completion. When `output` is given, the trajectory and
/// the landmark maps are written there as CSV files.
pub fn run_scenario(
    scenario: &ScenarioConfig,
    output: Option<&Path>,
) -> Result<RunSummary, SimError> {
    scenario.validate()?;
    let sim = &scenario.simulation;

    let mut world_rng = SlamRng::seed_from_u64(sim.seed);
    let world = World::generate(&scenario.world, &scenario.robot, &mut world_rng);
    let mut truth_rng = SlamRng::seed_from_u64(sim.seed);
    truth_rng.set_stream(TRUTH_STREAM);
    let mut truth = GroundTruth::new(scenario, truth_rng);

    let metrics = Arc::new(InMemoryMetrics::new());
    let mut slam =
        FastSlam::with_metrics(scenario.filter.clone(), scenario.robot.start, metrics.clone())?;

    info!(
        scenario = %sim.name,
        steps = sim.steps,
        landmarks = world.landmarks().len(),
        "starting simulation"
    );

    let mut track = Vec::with_capacity(sim.steps);
    let mut resamples = 0;
    let mut failed_particles = 0;
    let mut error_sum = 0.0;
    let mut error_max: f64 = 0.0;

    for i in 0..sim.steps {
        let input = truth.advance(i, &world);
        let report = slam.process(&input)?;
        resamples += usize::from(report.resampled);
        failed_particles += report.failed_particles;
        if report.failed_particles > 0 {
            warn!(step = report.step, failed = report.failed_particles, "particles failed");
        }

        let estimate = slam.estimated_pose();
        let error = estimate.position().distance_to(&truth.pose.position());
        error_sum += error;
        error_max = error_max.max(error);
        track.push(TrackPoint {
            step: i + 1,
            truth: truth.pose,
            estimate,
        });

        if sim.log_every > 0 && (i + 1) % sim.log_every == 0 {
            info!(
                step = i + 1,
                position_error = error,
                heading_error = heading_error(&estimate, &truth.pose),
                ess = report.effective_sample_size,
                observations = input.observations.len(),
                "pose error"
            );
        }
    }

    let final_estimate = slam.estimated_pose();
    let map = slam.estimated_map();
    let summary = RunSummary {
        name: sim.name.clone(),
        steps: sim.steps,
        final_position_error: final_estimate.position().distance_to(&truth.pose.position()),
        final_heading_error: heading_error(&final_estimate, &truth.pose),
        mean_position_error: if sim.steps > 0 {
            error_sum / sim.steps as f64
        } else {
            0.0
        },
        max_position_error: error_max,
        true_landmarks: world.landmarks().len(),
        estimated_landmarks: map.len(),
        map_error: map_error(&map, world.landmarks()),
        resamples,
        failed_particles,
        metrics: metrics.snapshot(),
    };

    if let Some(dir) = output {
        write_outputs(dir, &slam, &map, world.landmarks(), &track)?;
        info!("Wrote results to: {}", dir.display());
    }
    Ok(summary)
}

fn heading_error(estimate: &Pose, truth: &Pose) -> f64 {
    normalize_angle(estimate.theta - truth.theta).abs()
}

fn map_error(estimated: &[Point2], truth: &[Point2]) -> Option<f64> {
    if estimated.is_empty() || truth.is_empty() {
        return None;
    }
    let total: f64 = estimated
        .iter()
        .map(|e| {
            truth
                .iter()
                .map(|t| e.distance_to(t))
                .fold(f64::INFINITY, f64::min)
        })
        .sum();
    Some(total / estimated.len() as f64)
}

fn write_outputs(
    dir: &Path,
    slam: &FastSlam,
    mean_map: &[Point2],
    true_map: &[Point2],
    track: &[TrackPoint],
) -> Result<(), SimError> {
    fs::create_dir_all(dir).map_err(|source| SimError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    slam.export_landmarks(&dir.join("landmarks_best.csv"), slam.best_particle_index())?;
    slam.export_all_landmarks(&dir.join("landmarks_all.csv"))?;
    export::write_points(&dir.join("landmarks_mean.csv"), mean_map)?;
    export::write_points(&dir.join("landmarks_true.csv"), true_map)?;
    write_trajectory(&dir.join("trajectory.csv"), track)
}

fn write_trajectory(path: &Path, track: &[TrackPoint]) -> Result<(), SimError> {
    let io_err = |source| SimError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut out = BufWriter::new(File::create(path).map_err(io_err)?);
    writeln!(out, "step,true_x,true_y,true_theta,est_x,est_y,est_theta").map_err(io_err)?;
    for p in track {
        writeln!(
            out,
            "{},{},{},{},{},{},{}",
            p.step,
            p.truth.x,
            p.truth.y,
            p.truth.theta,
            p.estimate.x,
            p.estimate.y,
            p.estimate.theta
        )
        .map_err(io_err)?;
    }
    out.flush().map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastslam_core::config::{ExecutionMode, UpdateStrategyKind};

    fn small_scenario(strategy: UpdateStrategyKind) -> ScenarioConfig {
        let mut scenario = ScenarioConfig::default();
        scenario.simulation.steps = 24;
        scenario.simulation.seed = 5;
        scenario.simulation.log_every = 0;
        scenario.world.landmarks =
            vec![[3.0, -3.0], [3.0, 9.0], [-3.0, 3.0], [9.0, 3.0], [3.0, 3.0]];
        scenario.robot.side_length = 6.0;
        scenario.filter.num_particles = 15;
        scenario.filter.strategy = strategy;
        scenario.filter.seed = 5;
        scenario
    }

    #[test]
    fn both_strategies_track_the_loop() {
        for strategy in [UpdateStrategyKind::Proposal, UpdateStrategyKind::EkfOnly] {
            let summary = run_scenario(&small_scenario(strategy), None).unwrap();
            assert_eq!(summary.steps, 24);
            assert_eq!(summary.failed_particles, 0);
            assert!(summary.final_position_error < 1.5, "{strategy:?}: {summary:?}");
            assert!(summary.estimated_landmarks > 0);
        }
    }

    #[test]
    fn runs_are_reproducible_across_execution_modes() {
        let parallel = small_scenario(UpdateStrategyKind::Proposal);
        let mut sequential = parallel.clone();
        sequential.filter.execution.mode = ExecutionMode::Sequential;

        let a = run_scenario(&parallel, None).unwrap();
        let b = run_scenario(&sequential, None).unwrap();
        assert_eq!(a.final_position_error, b.final_position_error);
        assert_eq!(a.map_error, b.map_error);
    }

    #[test]
    fn writes_result_tables() {
        let dir = std::env::temp_dir().join(format!("fastslam-sim-out-{}", std::process::id()));
        let mut scenario = small_scenario(UpdateStrategyKind::EkfOnly);
        scenario.simulation.steps = 5;
        run_scenario(&scenario, Some(&dir)).unwrap();

        for name in [
            "landmarks_best.csv",
            "landmarks_all.csv",
            "landmarks_mean.csv",
            "landmarks_true.csv",
            "trajectory.csv",
        ] {
            assert!(dir.join(name).is_file(), "missing {name}");
        }
        let track = fs::read_to_string(dir.join("trajectory.csv")).unwrap();
        assert_eq!(track.lines().count(), 6);
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn map_error_uses_nearest_true_landmark() {
        let truth = [Point2::new(0.0, 0.0), Point2::new(10.0, 0.0)];
        let est = [Point2::new(0.5, 0.0), Point2::new(9.0, 0.0)];
        assert_eq!(map_error(&est, &truth), Some(0.75));
        assert_eq!(map_error(&[], &truth), None);
    }
}
