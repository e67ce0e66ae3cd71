//! Error types for the chunk store.

use delve_common::{ChunkId, MapId};
use thiserror::Error;

/// Chunk store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No chunk record under this ID
    #[error("chunk {0} not found")]
    ChunkNotFound(ChunkId),

    /// Chunk exists but has no block array (not a leaf, or never reserved)
    #[error("block array for chunk {0} not found")]
    BlocksNotFound(ChunkId),

    /// No game map descriptor under this ID
    #[error("map {0} not found")]
    MapNotFound(MapId),

    /// A stored value has the wrong shape
    #[error("corrupt {what}: {detail}")]
    Corrupt {
        /// Kind of record that failed to decode
        what: &'static str,
        /// Description of the mismatch
        detail: String,
    },

    /// The store was written with an incompatible layout
    #[error("incompatible store format: {0}")]
    IncompatibleFormat(String),

    /// Storage engine failure
    #[error("database error: {0}")]
    Database(#[from] redb::Error),

    /// Worker pool could not be started
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl StoreError {
    /// Checks whether this is one of the "absent" outcomes.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ChunkNotFound(_) | Self::BlocksNotFound(_) | Self::MapNotFound(_)
        )
    }

    pub(crate) fn corrupt(what: &'static str, detail: impl Into<String>) -> Self {
        Self::Corrupt {
            what,
            detail: detail.into(),
        }
    }
}

macro_rules! impl_from_redb {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StoreError {
                fn from(err: $ty) -> Self {
                    Self::Database(err.into())
                }
            }
        )*
    };
}

impl_from_redb!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
