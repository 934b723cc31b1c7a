// fastslam_sim/src/logging.rs

//! Installs the `tracing` subscriber for the simulator. The filter comes from
//! `RUST_LOG` when set, otherwise from the CLI level.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::SimError;

/// Filter used when neither `RUST_LOG` nor the CLI asks for anything else.
pub const DEFAULT_FILTER: &str = "info";

pub fn init_logging(level: &str) -> Result<(), SimError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| SimError::Logging(e.to_string()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false))
        .try_init()
        .map_err(|e| SimError::Logging(e.to_string()))
}
