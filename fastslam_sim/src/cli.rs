// fastslam_sim/src/cli.rs

use clap::{Parser, ValueEnum};
use fastslam_core::config::{ExecutionMode, UpdateStrategyKind};
use std::path::PathBuf;

use crate::logging::DEFAULT_FILTER;
use crate::simulation::config::ScenarioConfig;

/// FastSLAM simulator: drives a robot through a synthetic landmark world and
/// reports how well the particle filter tracks it.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// A scenario TOML file, or a directory that is searched for them.
    #[arg(short, long, default_value = "assets/scenarios/square_room.toml")]
    pub scenario: PathBuf,

    /// Directory for landmark and trajectory CSV files. Nothing is written if omitted.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Override the number of simulated steps.
    #[arg(long)]
    pub steps: Option<usize>,

    /// Override both the world seed and the filter seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the number of particles.
    #[arg(short = 'n', long)]
    pub particles: Option<usize>,

    /// Override the observation update strategy.
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Update particles on the calling thread instead of the worker pool.
    #[arg(long, default_value_t = false)]
    pub sequential: bool,

    /// Log filter, e.g. `debug` or `fastslam_core=debug,info`. `RUST_LOG` wins if set.
    #[arg(long, default_value = DEFAULT_FILTER)]
    pub log_level: String,

    /// Print the resolved scenario as TOML and exit without running it.
    #[arg(long, default_value_t = false)]
    pub print_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Proposal,
    EkfOnly,
}

impl From<StrategyArg> for UpdateStrategyKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Proposal => UpdateStrategyKind::Proposal,
            StrategyArg::EkfOnly => UpdateStrategyKind::EkfOnly,
        }
    }
}

impl Cli {
    /// Applies command-line overrides on top of a loaded scenario.
    pub fn apply_overrides(&self, scenario: &mut ScenarioConfig) {
        if let Some(steps) = self.steps {
            scenario.simulation.steps = steps;
        }
        if let Some(seed) = self.seed {
            scenario.simulation.seed = seed;
            scenario.filter.seed = seed;
        }
        if let Some(n) = self.particles {
            scenario.filter.num_particles = n;
        }
        if let Some(strategy) = self.strategy {
            scenario.filter.strategy = strategy.into();
        }
        if self.sequential {
            scenario.filter.execution.mode = ExecutionMode::Sequential;
        }
    }
}
