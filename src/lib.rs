pub mod adapters;
pub mod bucket;
pub mod client;
pub mod collective;
pub mod config;
pub mod engine;
pub mod error;
pub(crate) mod reduce;
pub mod schedule;
pub mod train;
pub mod transform;
pub mod transport;
pub mod types;

pub use adapters::{BackwardObserver, BatchAdapter, BatchSource, Optimizer, Replica, StepOutput};
pub use bucket::{partition, BucketLayout, BucketRegion, OversizePolicy, TensorBucket};
pub use client::SyncraClient;
pub use collective::ring_allreduce;
pub use config::SyncraConfig;
pub use engine::ReductionEngine;
pub use error::{Result, SyncraError};
pub use schedule::{
    FileSegmentStore, SegmentCell, SegmentRecord, SegmentSchedule, SegmentScheduler, SegmentStore,
};
pub use train::{EpochMetrics, StepCoordinator, TrainReport, Trainer};
pub use transform::{GradientTransform, RandomizedHadamard, TransformKind};
pub use transport::PeerChannel;
pub use types::Rank;
