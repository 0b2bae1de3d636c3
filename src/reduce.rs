//! Element-wise kernels for folding exchanged gradient payloads.
//!
//! Payloads travel as raw bytes; incoming frames are folded with
//! alignment-safe reads because receive buffers carry no alignment
//! guarantee.

use crate::error::{Result, SyncraError};
use crate::types::GRAD_ELEM_BYTES;

/// Fold a received byte payload into `dst`, element-wise.
pub(crate) fn add_assign_bytes(dst: &mut [f32], src: &[u8]) -> Result<()> {
    if src.len() != dst.len() * GRAD_ELEM_BYTES {
        return Err(SyncraError::SizeMismatch {
            expected: dst.len() * GRAD_ELEM_BYTES,
            actual: src.len(),
        });
    }
    for (d, chunk) in dst.iter_mut().zip(src.chunks_exact(GRAD_ELEM_BYTES)) {
        *d += bytemuck::pod_read_unaligned::<f32>(chunk);
    }
    Ok(())
}

/// Overwrite `dst` with a received byte payload.
pub(crate) fn copy_from_bytes(dst: &mut [f32], src: &[u8]) -> Result<()> {
    if src.len() != dst.len() * GRAD_ELEM_BYTES {
        return Err(SyncraError::SizeMismatch {
            expected: dst.len() * GRAD_ELEM_BYTES,
            actual: src.len(),
        });
    }
    for (d, chunk) in dst.iter_mut().zip(src.chunks_exact(GRAD_ELEM_BYTES)) {
        *d = bytemuck::pod_read_unaligned::<f32>(chunk);
    }
    Ok(())
}

/// `dst[i] *= factor`, used to turn a cross-worker sum into an average.
pub(crate) fn scale(dst: &mut [f32], factor: f32) {
    for d in dst.iter_mut() {
        *d *= factor;
    }
}
