pub mod conversation_repository;
pub mod error;

pub use conversation_repository::{CONVERSATIONS_KEY, ConversationRepository};
pub use error::{RepositoryError, RepositoryResult};
