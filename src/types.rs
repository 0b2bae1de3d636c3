/// Rank of a worker in the training mesh (0-indexed).
pub type Rank = u32;

/// Size of one gradient element on the wire.
///
/// Gradients are dense `f32` buffers end to end; byte caps and segment
/// sizes in the configuration are converted with this constant.
pub const GRAD_ELEM_BYTES: usize = std::mem::size_of::<f32>();
