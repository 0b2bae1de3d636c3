//! Seeded randomized Hadamard transform.
//!
//! `encode` pads the payload to the next power of two, flips signs by a
//! seeded diagonal, runs an in-place fast Walsh-Hadamard pass, and scales
//! by `1/sqrt(p)`. The scaled transform is orthonormal and its own
//! inverse, so `decode` applies the same pass in the opposite order and
//! truncates the padding. All state is fixed at construction; two workers
//! built from the same seed produce bit-identical encodings.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Result, SyncraError};
use crate::types::GRAD_ELEM_BYTES;

use super::traits::GradientTransform;

/// Randomized Hadamard transform state: a sign diagonal sized to the
/// largest bucket it will ever encode.
pub struct RandomizedHadamard {
    signs: Vec<f32>,
}

impl RandomizedHadamard {
    /// Build state able to encode payloads up to `max_elems` elements.
    ///
    /// The sign diagonal is drawn once from a seeded generator; `seed`
    /// and `max_elems` must match on every worker or decoded gradients
    /// will be garbage with no error raised.
    pub fn new(seed: u64, max_elems: usize) -> Self {
        let capacity = max_elems.next_power_of_two().max(1);
        let mut rng = StdRng::seed_from_u64(seed);
        let signs = (0..capacity)
            .map(|_| if rng.random::<bool>() { 1.0 } else { -1.0 })
            .collect();
        Self { signs }
    }

    fn capacity(&self) -> usize {
        self.signs.len()
    }
}

impl GradientTransform for RandomizedHadamard {
    fn name(&self) -> &'static str {
        "hadamard"
    }

    fn encoded_len(&self, len: usize) -> usize {
        len.next_power_of_two()
    }

    fn encode(&self, input: &[f32]) -> Result<Vec<f32>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }
        let padded = input.len().next_power_of_two();
        if padded > self.capacity() {
            return Err(SyncraError::configuration(format!(
                "hadamard state sized for {} elements cannot encode {}",
                self.capacity(),
                input.len()
            )));
        }

        let mut buf = vec![0.0f32; padded];
        for (i, (b, x)) in buf[..input.len()].iter_mut().zip(input).enumerate() {
            *b = self.signs[i] * x;
        }
        fwht(&mut buf);
        let norm = 1.0 / (padded as f32).sqrt();
        for b in &mut buf {
            *b *= norm;
        }
        Ok(buf)
    }

    fn decode(&self, encoded: &[f32], output: &mut [f32]) -> Result<()> {
        if output.is_empty() && encoded.is_empty() {
            return Ok(());
        }
        let padded = self.encoded_len(output.len());
        if encoded.len() != padded {
            return Err(SyncraError::SizeMismatch {
                expected: padded * GRAD_ELEM_BYTES,
                actual: encoded.len() * GRAD_ELEM_BYTES,
            });
        }

        let mut buf = encoded.to_vec();
        fwht(&mut buf);
        let norm = 1.0 / (padded as f32).sqrt();
        for (i, (out, y)) in output.iter_mut().zip(&buf).enumerate() {
            *out = self.signs[i] * y * norm;
        }
        Ok(())
    }
}

/// In-place fast Walsh-Hadamard transform. `buf.len()` must be a power
/// of two.
fn fwht(buf: &mut [f32]) {
    let n = buf.len();
    let mut h = 1;
    while h < n {
        for block in (0..n).step_by(h * 2) {
            for j in block..block + h {
                let x = buf[j];
                let y = buf[j + h];
                buf[j] = x + y;
                buf[j + h] = x - y;
            }
        }
        h *= 2;
    }
}
