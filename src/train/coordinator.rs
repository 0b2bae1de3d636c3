//! Runs one synchronous training step: backward on a blocking thread,
//! bucket reductions on the async side, strictly in partition order.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::adapters::{BatchAdapter, Replica, StepOutput};
use crate::bucket::{BucketLayout, TensorBucket};
use crate::client::SyncraClient;
use crate::engine::ReductionEngine;
use crate::error::{Result, SyncraError};
use crate::train::hooks::GradientHook;

/// Drives the per-step overlap between backward and reduction.
///
/// Buckets are allocated once and parked here between steps; each step
/// moves them through the hook, the reduction leg, and back. A bucket is
/// reduced at most once per step, and bucket `k` never starts before
/// `k - 1` has finished, so all workers issue collectives in the same
/// order.
pub struct StepCoordinator {
    client: Arc<SyncraClient>,
    engine: Arc<ReductionEngine>,
    layouts: Vec<BucketLayout>,
    buckets: Vec<TensorBucket>,
}

impl StepCoordinator {
    pub fn new(
        client: Arc<SyncraClient>,
        engine: Arc<ReductionEngine>,
        layouts: Vec<BucketLayout>,
    ) -> Self {
        let buckets = layouts.iter().cloned().map(TensorBucket::new).collect();
        Self {
            client,
            engine,
            layouts,
            buckets,
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.layouts.len()
    }

    /// Zero gradients, run forward/backward, reduce every bucket, and
    /// write the averaged gradients back into the replica. The optimizer
    /// step is the caller's, so schedule bookkeeping stays outside.
    ///
    /// The replica and adapter are moved through the blocking task and
    /// handed back on success. Any failure aborts the step; a failed
    /// coordinator is not reusable.
    pub async fn run_step<R, A>(
        &mut self,
        mut replica: R,
        mut adapter: A,
        batch: A::Batch,
        step: u64,
    ) -> Result<(R, A, StepOutput)>
    where
        R: Replica + 'static,
        A: BatchAdapter + 'static,
        A::Batch: Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let hook = GradientHook::new(&self.layouts, std::mem::take(&mut self.buckets), tx);

        let compute = tokio::task::spawn_blocking(move || -> Result<(R, A, StepOutput)> {
            let mut hook = hook;
            replica.zero_gradients();
            let output = adapter.forward_backward(&mut replica, &batch, &mut hook)?;
            hook.finish(&replica)?;
            Ok((replica, adapter, output))
        });

        // Reduce in partition order regardless of arrival order. Buckets
        // that land early wait in `pending` until their turn.
        let mut reduced: Vec<TensorBucket> = Vec::with_capacity(self.layouts.len());
        let mut pending: BTreeMap<usize, TensorBucket> = BTreeMap::new();
        while let Some(bucket) = rx.recv().await {
            pending.insert(bucket.index(), bucket);
            while let Some(mut next) = pending.remove(&reduced.len()) {
                self.engine
                    .reduce_bucket(&self.client, &mut next, step)
                    .await?;
                reduced.push(next);
            }
        }

        let (mut replica, adapter, output) = compute.await.map_err(|e| SyncraError::StepFailed {
            step,
            reason: format!("backward task panicked: {e}"),
        })??;

        if reduced.len() != self.layouts.len() {
            return Err(SyncraError::StepFailed {
                step,
                reason: format!(
                    "only {} of {} buckets were staged for reduction",
                    reduced.len(),
                    self.layouts.len()
                ),
            });
        }

        for bucket in &reduced {
            bucket.drain(&mut replica)?;
        }
        self.buckets = reduced;
        debug!(
            rank = self.client.rank(),
            step,
            loss = output.loss,
            "step reduced"
        );
        Ok((replica, adapter, output))
    }
}
