//! Error types for user storage operations

use thiserror::Error;
use uuid::Uuid;

use crate::codec::CodecError;
use crate::store::StoreError;

/// Result type alias for user storage operations
pub type UserStorageResult<T> = Result<T, UserStorageError>;

/// Storage error types for user operations
#[derive(Debug, Error)]
pub enum UserStorageError {
    /// The request was rejected before reaching the store
    #[error("Invalid request: {0}")]
    Validation(String),

    /// A user could not be converted to or from its stored form
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A scan, query or batch get failed; no partial result is returned
    #[error("Failed to retrieve users: {0}")]
    Retrieval(#[source] StoreError),

    /// A single item read, put or delete failed
    #[error("Store request failed: {0}")]
    Store(#[source] StoreError),

    /// The user was modified by someone else since it was read
    #[error("User {id} was modified concurrently")]
    ConflictRejected {
        /// Id of the user that was not updated
        id: Uuid,
    },

    /// The update could not be written
    #[error("Failed to update user {id}: {source}")]
    Update {
        /// Id of the user that was not updated
        id: Uuid,
        /// Underlying store error
        #[source]
        source: StoreError,
    },

    /// Cancelled while a write was in flight; it may or may not have applied
    #[error("Outcome of write to user {id} is unknown")]
    OutcomeUnknown {
        /// Id of the user whose write was in flight
        id: Uuid,
    },

    /// Cancelled before any request was made, so nothing was written
    #[error("Operation cancelled")]
    Cancelled,
}

impl UserStorageError {
    /// Whether a conditional update lost to a concurrent writer
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::ConflictRejected { .. })
    }
}
