pub mod models;

pub use models::{AccessTokenVault, ActiveModelSelector, ModelSelectionError, TokenError};
