//! Conversation state, streaming replies and encrypted token storage for the
//! Babble chat client.

pub mod chat;
pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod settings;
pub mod storage;

pub use chat::controllers::{BabbleApp, Blocker, ModalAction, Readiness};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
