// fastslam_sim/src/main.rs

use clap::Parser;
use fastslam_sim::cli::Cli;
use fastslam_sim::logging::init_logging;
use fastslam_sim::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), SimError> {
    let paths = discover_scenarios(&cli.scenario)?;
    let batch = paths.len() > 1;
    let mut failed = 0;

    for path in &paths {
        if let Err(e) = run_one(cli, path, batch) {
            // One broken scenario must not stop a batch.
            error!("Scenario {} failed: {}", path.display(), e);
            if !batch {
                return Err(e);
            }
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(SimError::Batch {
            failed,
            total: paths.len(),
        });
    }
    Ok(())
}

fn run_one(cli: &Cli, path: &std::path::Path, batch: bool) -> Result<(), SimError> {
    let mut scenario = load_scenario(path)?;
    cli.apply_overrides(&mut scenario);

    if cli.print_config {
        println!("# {}\n{}", path.display(), toml::to_string_pretty(&scenario)?);
        return Ok(());
    }

    // Batch runs get one sub-directory per scenario.
    let output: Option<PathBuf> = cli.output.as_ref().map(|dir| {
        if batch {
            dir.join(&scenario.simulation.name)
        } else {
            dir.clone()
        }
    });

    let summary = run_scenario(&scenario, output.as_deref())?;
    info!(
        scenario = %summary.name,
        steps = summary.steps,
        final_position_error = summary.final_position_error,
        final_heading_error = summary.final_heading_error,
        mean_position_error = summary.mean_position_error,
        max_position_error = summary.max_position_error,
        landmarks = summary.estimated_landmarks,
        true_landmarks = summary.true_landmarks,
        map_error = ?summary.map_error,
        resamples = summary.resamples,
        "run finished"
    );
    for timer in &summary.metrics.timers {
        info!(
            timer = %timer.name,
            calls = timer.calls,
            mean_ms = timer.mean_ms,
            total_ms = timer.total_ms,
            "timing"
        );
    }
    Ok(())
}
