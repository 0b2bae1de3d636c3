//! Per-bucket reduction pipeline: encode, exchange-sum, average, decode.
//!
//! The transform is linear, so the ring can sum payloads in encoded
//! space and a single decode at the end recovers the averaged gradient.
//! Wire chunking follows the segment record current at the moment the
//! bucket starts reducing; a record published mid-reduction applies from
//! the next bucket on.

use std::sync::Arc;

use tracing::debug;

use crate::bucket::TensorBucket;
use crate::client::SyncraClient;
use crate::collective;
use crate::error::Result;
use crate::reduce;
use crate::schedule::SegmentStore;
use crate::transform::GradientTransform;

pub struct ReductionEngine {
    transform: Box<dyn GradientTransform>,
    segments: Arc<dyn SegmentStore>,
}

impl ReductionEngine {
    pub fn new(transform: Box<dyn GradientTransform>, segments: Arc<dyn SegmentStore>) -> Self {
        Self {
            transform,
            segments,
        }
    }

    pub fn transform_name(&self) -> &'static str {
        self.transform.name()
    }

    /// Reduce one staged bucket across the mesh, leaving the
    /// cross-worker average in the bucket scratch.
    pub async fn reduce_bucket(
        &self,
        client: &SyncraClient,
        bucket: &mut TensorBucket,
        step: u64,
    ) -> Result<()> {
        let record = self.segments.read()?;
        debug!(
            rank = client.rank(),
            step,
            bucket = bucket.index(),
            own_bytes = record.own_bytes,
            peer_bytes = record.peer_bytes,
            version = record.version,
            "reducing bucket"
        );

        let mut payload = self.transform.encode(bucket.as_slice())?;
        collective::ring_allreduce(client, &mut payload, bucket.index(), step, record.own_bytes)
            .await?;
        reduce::scale(&mut payload, 1.0 / client.world_size() as f32);
        self.transform.decode(&payload, bucket.as_mut_slice())?;
        Ok(())
    }
}
