pub mod conversation;
pub mod conversations_store;
pub mod message;
pub mod stream_manager;

pub use conversation::{Conversation, DEFAULT_TITLE, SYSTEM_PROMPT};
pub use conversations_store::ConversationsStore;
pub use message::{Message, Role};
pub use stream_manager::{StreamGuard, StreamManager};
