mod allreduce;
mod helpers;

pub use allreduce::ring_allreduce;
