//! Transform trait and configuration-time selection.

use crate::error::{Result, SyncraError};

/// Which transform a run applies to bucket payloads before the exchange.
///
/// Parsing an unknown name fails immediately: a worker must refuse to
/// start rather than silently exchange untransformed payloads its peers
/// would decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    /// Exchange raw gradients.
    None,
    /// Seeded randomized Hadamard transform.
    Hadamard,
}

impl std::str::FromStr for TransformKind {
    type Err = SyncraError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" | "identity" => Ok(TransformKind::None),
            "hadamard" => Ok(TransformKind::Hadamard),
            other => Err(SyncraError::UnavailableTransform {
                requested: other.to_string(),
                reason: "not provided by this build".into(),
            }),
        }
    }
}

impl std::fmt::Display for TransformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformKind::None => f.write_str("none"),
            TransformKind::Hadamard => f.write_str("hadamard"),
        }
    }
}

/// Reversible transform applied per bucket around the exchange.
///
/// Implementations are pure functions of the input and state fixed at
/// construction, so concurrent buckets may be encoded in parallel. Every
/// worker constructs the same state from the same configuration, and
/// `decode` inverts `encode` to within 1e-5 relative error. Transforms
/// must be linear: summing encoded payloads across workers and decoding
/// once must equal decoding each and summing.
pub trait GradientTransform: Send + Sync {
    fn name(&self) -> &'static str;

    /// Length in elements of the encoded form of a `len`-element input.
    /// Identical on every worker for a given `len`.
    fn encoded_len(&self, len: usize) -> usize;

    /// Encode one bucket payload.
    fn encode(&self, input: &[f32]) -> Result<Vec<f32>>;

    /// Invert `encode`, writing the recovered payload into `output`.
    /// `encoded.len()` must equal `encoded_len(output.len())`.
    fn decode(&self, encoded: &[f32], output: &mut [f32]) -> Result<()>;
}
