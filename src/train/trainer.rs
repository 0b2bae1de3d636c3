//! The synchronous multi-worker training loop.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::adapters::{BatchAdapter, BatchSource, Optimizer, Replica};
use crate::bucket;
use crate::client::SyncraClient;
use crate::engine::ReductionEngine;
use crate::error::Result;
use crate::schedule::{
    FileSegmentStore, SegmentCell, SegmentRecord, SegmentSchedule, SegmentScheduler, SegmentStore,
};
use crate::train::coordinator::StepCoordinator;
use crate::train::metrics::{self, EpochMetrics, TrainReport};
use crate::transform;

/// Runs epochs of synchronous data-parallel training against one worker's
/// replica. Construction wires the whole reduction path from the client's
/// configuration: bucket layout, gradient transform, segment store, and
/// scheduler.
pub struct Trainer<R, A, S, O> {
    client: Arc<SyncraClient>,
    coordinator: StepCoordinator,
    scheduler: SegmentScheduler,
    replica: R,
    adapter: A,
    source: S,
    optimizer: O,
}

impl<R, A, S, O> Trainer<R, A, S, O>
where
    R: Replica + 'static,
    A: BatchAdapter + 'static,
    A::Batch: Send + 'static,
    S: BatchSource<Batch = A::Batch>,
    O: Optimizer,
{
    pub fn new(
        client: Arc<SyncraClient>,
        replica: R,
        adapter: A,
        source: S,
        optimizer: O,
    ) -> Result<Self> {
        let config = client.config();
        let lens: Vec<usize> = (0..replica.parameter_count())
            .map(|p| replica.gradient_len(p))
            .collect();
        let layouts = bucket::partition(&lens, config.bucket_cap_bytes, config.oversize_policy)?;
        let max_elems = layouts.iter().map(|l| l.elems).max().unwrap_or(0);
        let transform = transform::build(config.transform, config.transform_seed, max_elems);

        let initial = SegmentRecord::initial(config.base_segment_bytes);
        let store: Arc<dyn SegmentStore> = match &config.segment_record_path {
            Some(path) => Arc::new(FileSegmentStore::new(path, initial)),
            None => Arc::new(SegmentCell::new(initial)),
        };
        let schedule = SegmentSchedule {
            base_bytes: config.base_segment_bytes,
            shrink_until: config.shrink_until,
            regrow_until: config.regrow_until,
        };
        let scheduler = SegmentScheduler::new(
            client.rank(),
            schedule,
            config.reschedule_interval,
            Arc::clone(&store),
        );
        let engine = Arc::new(ReductionEngine::new(transform, store));
        let coordinator = StepCoordinator::new(Arc::clone(&client), engine, layouts);

        info!(
            rank = client.rank(),
            world_size = client.world_size(),
            buckets = coordinator.bucket_count(),
            transform = %config.transform,
            "trainer ready"
        );
        Ok(Self {
            client,
            coordinator,
            scheduler,
            replica,
            adapter,
            source,
            optimizer,
        })
    }

    /// Train for up to `epochs` epochs, stopping early if the configured
    /// schedule cap is reached mid-run. Consumes the trainer; the report
    /// carries everything a caller needs afterwards.
    pub async fn run(mut self, epochs: usize) -> Result<TrainReport> {
        let config = self.client.config();
        let max_steps = config.max_scheduled_steps;
        let metrics_path = config.metrics_path.clone();
        let step_log_path = config.step_log_path.clone();

        let mut replica = self.replica;
        let mut adapter = self.adapter;
        let mut timestamps: Vec<f64> = Vec::new();
        let mut epoch_metrics: Vec<EpochMetrics> = Vec::new();
        let mut stopped_by_schedule = false;

        'epochs: for epoch in 0..epochs {
            let epoch_start = Instant::now();
            let mut loss_sum = 0.0f64;
            let mut accuracy_sum = 0.0f64;
            let mut steps_in_epoch = 0u64;

            for index in 0..self.source.batches_per_epoch() {
                if let Some(cap) = max_steps {
                    if self.scheduler.steps_begun() >= cap {
                        stopped_by_schedule = true;
                        info!(
                            rank = self.client.rank(),
                            steps = cap,
                            "schedule cap reached, stopping run"
                        );
                        break 'epochs;
                    }
                }
                let batch = self.source.batch(epoch, index)?;
                let step = self.scheduler.begin_step()?;
                timestamps.push(unix_seconds());

                let (r, a, output) = self
                    .coordinator
                    .run_step(replica, adapter, batch, step)
                    .await?;
                replica = r;
                adapter = a;
                self.optimizer.step(&mut replica)?;

                loss_sum += output.loss as f64;
                accuracy_sum += output.accuracy as f64;
                steps_in_epoch += 1;
            }

            let denom = steps_in_epoch.max(1) as f64;
            let entry = EpochMetrics {
                epoch,
                loss: (loss_sum / denom) as f32,
                accuracy: (accuracy_sum / denom) as f32,
                seconds: epoch_start.elapsed().as_secs_f64(),
            };
            info!(
                rank = self.client.rank(),
                epoch,
                loss = entry.loss,
                accuracy = entry.accuracy,
                seconds = entry.seconds,
                "epoch complete"
            );
            epoch_metrics.push(entry);
            if let Some(path) = &metrics_path {
                metrics::write_metrics_file(path, &epoch_metrics)?;
            }
        }

        if let Some(path) = &step_log_path {
            metrics::write_step_log(path, &timestamps)?;
        }
        let report = TrainReport {
            epochs: epoch_metrics,
            steps_completed: self.scheduler.steps_begun(),
            stopped_by_schedule,
        };
        info!(
            rank = self.client.rank(),
            steps = report.steps_completed,
            stopped_by_schedule = report.stopped_by_schedule,
            "run finished"
        );
        Ok(report)
    }
}

fn unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
