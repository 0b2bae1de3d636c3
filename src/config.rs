//! Runtime-configurable tuning parameters for syncra.
//!
//! All values have sensible defaults. Override via environment variables
//! (prefixed `SYNCRA_`) or by constructing a custom `SyncraConfig`.

use std::path::PathBuf;
use std::time::Duration;

use crate::bucket::OversizePolicy;
use crate::error::{Result, SyncraError};
use crate::transform::TransformKind;
use crate::types::GRAD_ELEM_BYTES;

/// Tuning parameters for bucketing, transforms, scheduling, and transport.
#[derive(Debug, Clone)]
pub struct SyncraConfig {
    /// Maximum bytes of gradient data per communication bucket.
    pub bucket_cap_bytes: usize,

    /// What to do with a single parameter larger than the bucket cap.
    pub oversize_policy: OversizePolicy,

    /// Transform applied to bucket payloads before the exchange.
    pub transform: TransformKind,

    /// Seed for the transform's sign diagonal. Must match on every worker.
    pub transform_seed: u64,

    /// Segment size the schedule starts from and regrows back to.
    pub base_segment_bytes: usize,

    /// Steps between schedule recomputations.
    pub reschedule_interval: u64,

    /// Last interval index of the halving phase: `t <= shrink_until`
    /// publishes `base >> t`.
    pub shrink_until: u64,

    /// Last interval index of the regrow phase: `shrink_until < t <=
    /// regrow_until` publishes `base >> (regrow_until - t)`. Beyond it the
    /// schedule holds at `base`.
    pub regrow_until: u64,

    /// Stop the run once this many steps completed. `None` runs until the
    /// batch source is exhausted.
    pub max_scheduled_steps: Option<u64>,

    /// Mirror each published segment record to this file.
    pub segment_record_path: Option<PathBuf>,

    /// Write one wall-clock timestamp per executed step here at run end.
    pub step_log_path: Option<PathBuf>,

    /// Rewrite per-epoch loss/accuracy/time triples to this file.
    pub metrics_path: Option<PathBuf>,

    /// Timeout for individual send/recv operations within a reduction.
    pub collective_timeout: Duration,

    /// Timeout for the full mesh to form at startup.
    pub formation_timeout: Duration,
}

impl Default for SyncraConfig {
    fn default() -> Self {
        Self {
            bucket_cap_bytes: 25 * 1024 * 1024, // 25 MiB
            oversize_policy: OversizePolicy::Isolate,
            transform: TransformKind::None,
            transform_seed: 0,
            base_segment_bytes: 1024 * 1024, // 1 MiB
            reschedule_interval: 4,
            shrink_until: 7,
            regrow_until: 14,
            max_scheduled_steps: Some(60), // reschedule_interval * (regrow_until + 1)
            segment_record_path: None,
            step_log_path: None,
            metrics_path: None,
            collective_timeout: Duration::from_secs(30),
            formation_timeout: Duration::from_secs(60),
        }
    }
}

impl SyncraConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `SYNCRA_BUCKET_CAP_BYTES`
    /// - `SYNCRA_TRANSFORM` (`none` or `hadamard`; unknown names fail)
    /// - `SYNCRA_TRANSFORM_SEED`
    /// - `SYNCRA_BASE_SEGMENT_BYTES`
    /// - `SYNCRA_RESCHEDULE_INTERVAL`
    /// - `SYNCRA_SHRINK_UNTIL`
    /// - `SYNCRA_REGROW_UNTIL`
    /// - `SYNCRA_MAX_SCHEDULED_STEPS` (`0` means uncapped)
    /// - `SYNCRA_SEGMENT_RECORD_PATH`
    /// - `SYNCRA_STEP_LOG_PATH`
    /// - `SYNCRA_METRICS_PATH`
    /// - `SYNCRA_COLLECTIVE_TIMEOUT_SECS`
    /// - `SYNCRA_FORMATION_TIMEOUT_SECS`
    ///
    /// Numeric variables that fail to parse are ignored. An unknown
    /// transform name is an error: a worker silently training without the
    /// transform it was asked for would diverge from its peers.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("SYNCRA_BUCKET_CAP_BYTES") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.bucket_cap_bytes = n;
            }
        }
        if let Ok(v) = std::env::var("SYNCRA_TRANSFORM") {
            cfg.transform = v.parse()?;
        }
        if let Ok(v) = std::env::var("SYNCRA_TRANSFORM_SEED") {
            if let Ok(n) = v.parse::<u64>() {
                cfg.transform_seed = n;
            }
        }
        if let Ok(v) = std::env::var("SYNCRA_BASE_SEGMENT_BYTES") {
            if let Ok(n) = v.parse::<usize>() {
                cfg.base_segment_bytes = n;
            }
        }
        if let Ok(v) = std::env::var("SYNCRA_RESCHEDULE_INTERVAL") {
            if let Ok(n) = v.parse::<u64>() {
                cfg.reschedule_interval = n;
            }
        }
        if let Ok(v) = std::env::var("SYNCRA_SHRINK_UNTIL") {
            if let Ok(n) = v.parse::<u64>() {
                cfg.shrink_until = n;
            }
        }
        if let Ok(v) = std::env::var("SYNCRA_REGROW_UNTIL") {
            if let Ok(n) = v.parse::<u64>() {
                cfg.regrow_until = n;
            }
        }
        if let Ok(v) = std::env::var("SYNCRA_MAX_SCHEDULED_STEPS") {
            if let Ok(n) = v.parse::<u64>() {
                cfg.max_scheduled_steps = if n == 0 { None } else { Some(n) };
            }
        }
        if let Ok(v) = std::env::var("SYNCRA_SEGMENT_RECORD_PATH") {
            cfg.segment_record_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("SYNCRA_STEP_LOG_PATH") {
            cfg.step_log_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("SYNCRA_METRICS_PATH") {
            cfg.metrics_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("SYNCRA_COLLECTIVE_TIMEOUT_SECS") {
            if let Ok(s) = v.parse::<u64>() {
                cfg.collective_timeout = Duration::from_secs(s);
            }
        }
        if let Ok(v) = std::env::var("SYNCRA_FORMATION_TIMEOUT_SECS") {
            if let Ok(s) = v.parse::<u64>() {
                cfg.formation_timeout = Duration::from_secs(s);
            }
        }

        Ok(cfg)
    }

    /// Reject parameter combinations that cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.bucket_cap_bytes < GRAD_ELEM_BYTES {
            return Err(SyncraError::configuration(format!(
                "bucket cap of {} bytes cannot hold a single gradient element",
                self.bucket_cap_bytes
            )));
        }
        if self.base_segment_bytes < GRAD_ELEM_BYTES {
            return Err(SyncraError::configuration(format!(
                "base segment of {} bytes cannot hold a single gradient element",
                self.base_segment_bytes
            )));
        }
        if self.reschedule_interval == 0 {
            return Err(SyncraError::configuration(
                "reschedule interval must be at least 1 step",
            ));
        }
        if self.shrink_until > self.regrow_until {
            return Err(SyncraError::configuration(format!(
                "shrink phase ends at interval {} but regrow phase ends earlier, at {}",
                self.shrink_until, self.regrow_until
            )));
        }
        if self.max_scheduled_steps == Some(0) {
            return Err(SyncraError::configuration(
                "a step cap of 0 would terminate before the first batch",
            ));
        }
        Ok(())
    }
}
