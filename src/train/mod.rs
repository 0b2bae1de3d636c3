//! Training loop, step coordination, and run metrics.

pub mod coordinator;
mod hooks;
pub mod metrics;
pub mod trainer;

pub use coordinator::StepCoordinator;
pub use metrics::{EpochMetrics, TrainReport};
pub use trainer::Trainer;
