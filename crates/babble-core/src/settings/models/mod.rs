pub mod access_token;
pub mod active_model;

pub use access_token::{AccessTokenVault, TOKEN_KEY, TokenError};
pub use active_model::{ActiveModelSelector, MODEL_KEY, ModelSelectionError};
