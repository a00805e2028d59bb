use thiserror::Error;

#[derive(Debug, Error)]
#[allow(clippy::enum_variant_names)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Store path error: {message}")]
    PathError { message: String },

    #[error("Invalid store contents in {path}: {message}")]
    InvalidData { path: String, message: String },
}

pub type StoreResult<T> = Result<T, StoreError>;
