// fastslam_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::estimation::UpdateStrategy;
pub use crate::metrics::MetricsCollector;
pub use crate::models::MotionModel;
pub use crate::slam::SlamSystem;

// --- Core Data Structures ---
pub use crate::config::{FilterConfig, UpdateStrategyKind};
pub use crate::error::SlamError;
pub use crate::messages::{SlamInput, StepReport};
pub use crate::types::{normalize_angle, Control, Observation, Point2, Pose, SlamRng};

// --- The Engine ---
pub use crate::slam::FastSlam;

// --- Concrete Implementations (Export common ones for convenience) ---
pub use crate::estimation::{EkfOnlyUpdate, ProposalUpdate};
pub use crate::metrics::{InMemoryMetrics, MetricsSnapshot, NoopMetrics};
pub use crate::models::{OdometryMotionModel, RangeBearingModel};
