pub mod hadamard;
pub mod identity;
pub mod traits;

pub use hadamard::RandomizedHadamard;
pub use identity::Identity;
pub use traits::{GradientTransform, TransformKind};

/// Build the configured transform with state sized for the largest bucket.
pub fn build(kind: TransformKind, seed: u64, max_elems: usize) -> Box<dyn GradientTransform> {
    match kind {
        TransformKind::None => Box::new(Identity),
        TransformKind::Hadamard => Box::new(RandomizedHadamard::new(seed, max_elems)),
    }
}
