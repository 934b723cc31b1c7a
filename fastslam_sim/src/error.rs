// fastslam_sim/src/error.rs

use fastslam_core::error::SlamError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the simulator binary, on top of what the filter itself reports.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Slam(#[from] SlamError),

    #[error("failed to load scenario: {0}")]
    Config(#[from] figment::Error),

    #[error("scenario path {0:?} does not exist")]
    ScenarioNotFound(PathBuf),

    #[error("no scenario files found under {0:?}")]
    NoScenarios(PathBuf),

    #[error("invalid scenario '{name}': {reason}")]
    InvalidScenario { name: String, reason: String },

    #[error("failed to serialize scenario: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install log subscriber: {0}")]
    Logging(String),

    #[error("{failed} of {total} scenarios failed")]
    Batch { failed: usize, total: usize },
}
