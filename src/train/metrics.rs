//! Per-epoch training metrics and their on-disk form.

use std::fmt::Write as _;
use std::path::Path;

use crate::error::Result;

/// Averages over the steps a worker ran in one epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
    pub seconds: f64,
}

/// What a finished (or schedule-capped) run looked like.
#[derive(Debug, Clone)]
pub struct TrainReport {
    /// One entry per fully completed epoch. An epoch cut short by the
    /// schedule cap is not recorded here.
    pub epochs: Vec<EpochMetrics>,
    pub steps_completed: u64,
    pub stopped_by_schedule: bool,
}

/// Rewrites the whole metrics file. One line per epoch:
/// `epoch loss accuracy seconds`.
pub(crate) fn write_metrics_file(path: &Path, epochs: &[EpochMetrics]) -> Result<()> {
    let mut out = String::new();
    for m in epochs {
        let _ = writeln!(
            out,
            "{} {:.6} {:.6} {:.3}",
            m.epoch, m.loss, m.accuracy, m.seconds
        );
    }
    std::fs::write(path, out)?;
    Ok(())
}

/// Writes the step timestamp log, one unix timestamp per executed step.
pub(crate) fn write_step_log(path: &Path, timestamps: &[f64]) -> Result<()> {
    let mut out = String::new();
    for ts in timestamps {
        let _ = writeln!(out, "{ts:.6}");
    }
    std::fs::write(path, out)?;
    Ok(())
}
