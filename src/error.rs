use crate::types::Rank;

pub type Result<T> = std::result::Result<T, SyncraError>;

#[derive(Debug, thiserror::Error)]
pub enum SyncraError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("transform '{requested}' is unavailable: {reason}")]
    UnavailableTransform { requested: String, reason: String },

    #[error("{operation} failed at rank {rank} (bucket {bucket}): {reason}")]
    Reduction {
        operation: &'static str,
        bucket: usize,
        rank: Rank,
        reason: String,
    },

    #[error("connection to rank {rank} failed: {reason}")]
    ConnectionFailed { rank: Rank, reason: String },

    #[error("peer {rank} disconnected unexpectedly")]
    PeerDisconnected { rank: Rank },

    #[error("rank {rank} not found in mesh")]
    UnknownPeer { rank: Rank },

    #[error("mesh formation timed out: {joined}/{expected} workers connected")]
    MeshFormationTimeout { joined: u32, expected: u32 },

    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("invalid rank {rank}: world size is {world_size}")]
    InvalidRank { rank: Rank, world_size: u32 },

    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("training step {step} failed: {reason}")]
    StepFailed { step: u64, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl SyncraError {
    /// Create a `Configuration` error from any displayable message.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a `Transport` error with just a message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a `Transport` error with a message and a source error.
    pub fn transport_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a `Reduction` error for a failed collective on one bucket.
    pub fn reduction(
        operation: &'static str,
        bucket: usize,
        rank: Rank,
        reason: impl Into<String>,
    ) -> Self {
        Self::Reduction {
            operation,
            bucket,
            rank,
            reason: reason.into(),
        }
    }
}
