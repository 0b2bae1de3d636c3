//! Backward-pass observer that stages buckets as their parameters finish.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::adapters::{BackwardObserver, Replica};
use crate::bucket::{BucketLayout, TensorBucket};
use crate::error::{Result, SyncraError};

/// Tracks per-bucket completion during one backward pass and ships each
/// bucket to the reduction leg the moment its last parameter reports in.
///
/// Adapters that never call the observer are fine: `finish` stages
/// whatever is still held, so the step degrades to whole-model staging
/// with no overlap.
pub(crate) struct GradientHook {
    /// Unreported parameters, keyed by parameter index. Removal doubles
    /// as duplicate-report protection.
    param_to_bucket: HashMap<usize, usize>,
    remaining: Vec<usize>,
    buckets: Vec<Option<TensorBucket>>,
    tx: mpsc::UnboundedSender<TensorBucket>,
    error: Option<SyncraError>,
}

impl GradientHook {
    pub(crate) fn new(
        layouts: &[BucketLayout],
        buckets: Vec<TensorBucket>,
        tx: mpsc::UnboundedSender<TensorBucket>,
    ) -> Self {
        let mut param_to_bucket = HashMap::new();
        let mut remaining = vec![0; layouts.len()];
        for layout in layouts {
            remaining[layout.index] = layout.regions.len();
            for region in &layout.regions {
                param_to_bucket.insert(region.param, layout.index);
            }
        }
        let mut slots: Vec<Option<TensorBucket>> = (0..layouts.len()).map(|_| None).collect();
        for bucket in buckets {
            let index = bucket.index();
            slots[index] = Some(bucket);
        }
        Self {
            param_to_bucket,
            remaining,
            buckets: slots,
            tx,
            error: None,
        }
    }

    fn stage(&mut self, index: usize, replica: &dyn Replica) {
        if let Some(mut bucket) = self.buckets[index].take() {
            match bucket.fill(replica) {
                // A send failure means the reduction leg is gone; its own
                // error is the one worth reporting.
                Ok(()) => {
                    let _ = self.tx.send(bucket);
                }
                Err(e) => {
                    if self.error.is_none() {
                        self.error = Some(e);
                    }
                }
            }
        }
    }

    /// Stage every bucket not yet shipped, in partition order, and close
    /// the channel. Surfaces the first staging error, if any.
    pub(crate) fn finish(mut self, replica: &dyn Replica) -> Result<()> {
        for index in 0..self.buckets.len() {
            self.stage(index, replica);
        }
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl BackwardObserver for GradientHook {
    fn gradient_ready(&mut self, replica: &dyn Replica, param: usize) {
        let Some(index) = self.param_to_bucket.remove(&param) else {
            return;
        };
        self.remaining[index] -= 1;
        if self.remaining[index] == 0 {
            self.stage(index, replica);
        }
    }
}
