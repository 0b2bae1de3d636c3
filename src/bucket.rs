//! Parameter-to-bucket assignment and per-bucket staging buffers.
//!
//! Buckets are fixed at setup from the replica's parameter sizes and a byte
//! cap, then refilled, reduced, and drained every step. A parameter never
//! spans two buckets. Placement is first-fit: each parameter lands in the
//! lowest-indexed bucket with room, so small parameters pack around large
//! ones and the assignment is a pure function of sizes, cap, and policy.

use crate::adapters::Replica;
use crate::error::{Result, SyncraError};
use crate::types::GRAD_ELEM_BYTES;

/// Fallback when a single parameter alone exceeds the bucket cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OversizePolicy {
    /// Give the parameter a dedicated bucket larger than the cap.
    Isolate,
    /// Fail partitioning with a configuration error.
    Reject,
}

/// One parameter's slot inside a bucket's scratch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketRegion {
    /// Parameter index in replica traversal order.
    pub param: usize,
    /// Element offset inside the bucket scratch.
    pub offset: usize,
    /// Element count.
    pub len: usize,
}

/// Immutable assignment of parameters to one bucket.
///
/// Bucket index order is reduction order; every worker derives the same
/// layouts from the same inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketLayout {
    pub index: usize,
    pub regions: Vec<BucketRegion>,
    pub elems: usize,
}

impl BucketLayout {
    pub fn byte_len(&self) -> usize {
        self.elems * GRAD_ELEM_BYTES
    }
}

/// Assign parameters to ordered buckets under `cap_bytes`.
///
/// Zero-length parameters are skipped; they contribute nothing to the
/// exchange. Errors with `Configuration` when the cap cannot hold one
/// element, or when a parameter exceeds the cap under
/// `OversizePolicy::Reject`.
pub fn partition(
    param_lens: &[usize],
    cap_bytes: usize,
    policy: OversizePolicy,
) -> Result<Vec<BucketLayout>> {
    let cap_elems = cap_bytes / GRAD_ELEM_BYTES;
    if cap_elems == 0 {
        return Err(SyncraError::configuration(format!(
            "bucket cap of {cap_bytes} bytes cannot hold a single gradient element"
        )));
    }

    let mut buckets: Vec<BucketLayout> = Vec::new();
    for (param, &len) in param_lens.iter().enumerate() {
        if len == 0 {
            continue;
        }

        if len > cap_elems {
            match policy {
                OversizePolicy::Isolate => {
                    buckets.push(BucketLayout {
                        index: buckets.len(),
                        regions: vec![BucketRegion {
                            param,
                            offset: 0,
                            len,
                        }],
                        elems: len,
                    });
                    continue;
                }
                OversizePolicy::Reject => {
                    return Err(SyncraError::configuration(format!(
                        "parameter {param} needs {} bytes but the bucket cap is {cap_bytes}",
                        len * GRAD_ELEM_BYTES
                    )));
                }
            }
        }

        // First fit. An isolated oversize bucket is already past the cap,
        // so it never accepts another region.
        let slot = buckets
            .iter()
            .position(|b| b.elems + len <= cap_elems);
        match slot {
            Some(i) => {
                let bucket = &mut buckets[i];
                bucket.regions.push(BucketRegion {
                    param,
                    offset: bucket.elems,
                    len,
                });
                bucket.elems += len;
            }
            None => {
                buckets.push(BucketLayout {
                    index: buckets.len(),
                    regions: vec![BucketRegion {
                        param,
                        offset: 0,
                        len,
                    }],
                    elems: len,
                });
            }
        }
    }

    Ok(buckets)
}

/// A bucket's owned staging buffer, allocated once and reused every step.
#[derive(Debug)]
pub struct TensorBucket {
    layout: BucketLayout,
    scratch: Vec<f32>,
}

impl TensorBucket {
    pub fn new(layout: BucketLayout) -> Self {
        let scratch = vec![0.0; layout.elems];
        Self { layout, scratch }
    }

    pub fn index(&self) -> usize {
        self.layout.index
    }

    pub fn layout(&self) -> &BucketLayout {
        &self.layout
    }

    pub fn elems(&self) -> usize {
        self.layout.elems
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.scratch
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.scratch
    }

    /// Gather the replica's current gradients into scratch.
    pub fn fill(&mut self, replica: &dyn Replica) -> Result<()> {
        for r in &self.layout.regions {
            let grad = replica.gradient(r.param);
            if grad.len() != r.len {
                return Err(SyncraError::SizeMismatch {
                    expected: r.len * GRAD_ELEM_BYTES,
                    actual: grad.len() * GRAD_ELEM_BYTES,
                });
            }
            self.scratch[r.offset..r.offset + r.len].copy_from_slice(grad);
        }
        Ok(())
    }

    /// Scatter reduced values back into the replica's gradient buffers.
    pub fn drain(&self, replica: &mut dyn Replica) -> Result<()> {
        for r in &self.layout.regions {
            let grad = replica.gradient_mut(r.param);
            if grad.len() != r.len {
                return Err(SyncraError::SizeMismatch {
                    expected: r.len * GRAD_ELEM_BYTES,
                    actual: grad.len() * GRAD_ELEM_BYTES,
                });
            }
            grad.copy_from_slice(&self.scratch[r.offset..r.offset + r.len]);
        }
        Ok(())
    }
}
