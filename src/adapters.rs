//! Glue traits through which syncra drives a host training stack.
//!
//! Model construction, optimizer math, tokenization, and data loading live
//! outside this crate. A training run plugs its stack in through these
//! seams; everything syncra does with a model goes through dense `f32`
//! gradient buffers enumerated in a fixed parameter order.

use crate::error::Result;

/// A worker-local model replica exposing dense `f32` gradient buffers.
///
/// Parameter indices follow a fixed traversal order that every worker in
/// the mesh must share; bucket assignment is derived from it once at setup.
pub trait Replica: Send {
    /// Number of parameters, fixed for the life of the run.
    fn parameter_count(&self) -> usize;

    /// Gradient length in elements of one parameter. Stable across steps.
    fn gradient_len(&self, param: usize) -> usize;

    /// Reset every gradient buffer to zero.
    fn zero_gradients(&mut self);

    /// Borrow one parameter's gradient.
    fn gradient(&self, param: usize) -> &[f32];

    /// Mutably borrow one parameter's gradient.
    fn gradient_mut(&mut self, param: usize) -> &mut [f32];
}

/// Receives per-parameter completion notifications during backward.
pub trait BackwardObserver {
    /// Called at most once per parameter when its gradient is final for
    /// the current step.
    fn gradient_ready(&mut self, replica: &dyn Replica, param: usize);
}

/// Loss and accuracy of one forward/backward pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutput {
    pub loss: f32,
    pub accuracy: f32,
}

/// Per-model-family forward/backward capability, selected once at setup.
pub trait BatchAdapter: Send {
    type Batch;

    /// Run forward and backward for one batch, leaving gradients in the
    /// replica.
    ///
    /// Adapters that can track per-parameter completion report it through
    /// `observer` as backward progresses, which lets bucket reduction
    /// overlap the rest of the pass. Adapters that cannot may skip the
    /// calls entirely; whatever has not been reported is staged when this
    /// returns.
    fn forward_backward(
        &mut self,
        replica: &mut dyn Replica,
        batch: &Self::Batch,
        observer: &mut dyn BackwardObserver,
    ) -> Result<StepOutput>;
}

/// Ordered, replayable stream of pre-sharded batches.
///
/// Sharding happens upstream: each worker's source yields only that
/// worker's slice of the data, and `batch(epoch, index)` must be
/// deterministic so a replayed epoch sees identical data.
pub trait BatchSource: Send {
    type Batch;

    fn batches_per_epoch(&self) -> usize;

    fn batch(&mut self, epoch: usize, index: usize) -> Result<Self::Batch>;
}

/// Applies a parameter update from the replica's (already averaged)
/// gradients.
pub trait Optimizer: Send {
    fn step(&mut self, replica: &mut dyn Replica) -> Result<()>;
}
