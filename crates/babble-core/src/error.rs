use thiserror::Error;

use crate::chat::repositories::RepositoryError;
use crate::chat::services::{SendError, StreamError};
use crate::config::ConfigError;
use crate::crypto::CodecError;
use crate::settings::{ModelSelectionError, TokenError};
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    ModelSelection(#[from] ModelSelectionError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Send(#[from] SendError),
}

pub type AppResult<T> = Result<T, AppError>;
