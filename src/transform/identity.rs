//! Identity (no-op) transform. Payloads cross the wire unmodified.

use crate::error::{Result, SyncraError};
use crate::types::GRAD_ELEM_BYTES;

use super::traits::GradientTransform;

/// Pass-through transform used when no encoding is configured.
pub struct Identity;

impl GradientTransform for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn encoded_len(&self, len: usize) -> usize {
        len
    }

    fn encode(&self, input: &[f32]) -> Result<Vec<f32>> {
        Ok(input.to_vec())
    }

    fn decode(&self, encoded: &[f32], output: &mut [f32]) -> Result<()> {
        if encoded.len() != output.len() {
            return Err(SyncraError::SizeMismatch {
                expected: output.len() * GRAD_ELEM_BYTES,
                actual: encoded.len() * GRAD_ELEM_BYTES,
            });
        }
        output.copy_from_slice(encoded);
        Ok(())
    }
}
