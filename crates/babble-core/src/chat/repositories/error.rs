use thiserror::Error;

use crate::storage::StoreError;

#[derive(Debug, Error)]
#[allow(clippy::enum_variant_names)]
pub enum RepositoryError {
    #[error("No saved conversations found")]
    StoreEmpty,

    #[error("Conversation not found: {id}")]
    NotFound { id: String },

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
