// Error types for chunked storage and map maintenance.
//
// Backend failures are wrapped as-is and surfaced to the caller. Nothing in
// this crate retries; the polling loop that drives it decides what to do.

use crate::chunk::ChunkKind;
use radar_nav_map::MapError;

/// Result type alias
pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Map-level configuration error (cell size, payload, profile)
    #[error(transparent)]
    Map(#[from] MapError),

    /// Embedded key-value store failure
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// SQLite failure
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Stored document could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// File system failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Chunk identifier is not three `:`-separated integers
    #[error("invalid chunk id: {0:?}")]
    InvalidChunkId(String),

    /// Stored kind name is not one of the known kinds
    #[error("unknown chunk kind: {0:?}")]
    UnknownKind(String),

    /// Store was created with a different chunk size
    #[error("chunk size mismatch: store uses {stored}, configured {configured}")]
    ChunkSizeMismatch {
        /// Chunk size persisted in the index
        stored: f64,
        /// Chunk size the caller asked for
        configured: f64,
    },

    /// Operation does not apply to this kind of chunk
    #[error("operation not supported for {0} chunks")]
    WrongKind(ChunkKind),

    /// Store or maintenance parameter out of range
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    /// Whether the caller handed in bad parameters, as opposed to a backend
    /// failure.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Map(_)
                | Self::InvalidChunkId(_)
                | Self::ChunkSizeMismatch { .. }
                | Self::WrongKind(_)
                | Self::InvalidConfig(_)
        )
    }
}
