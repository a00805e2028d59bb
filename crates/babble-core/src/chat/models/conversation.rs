use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::{Message, Role};

pub const DEFAULT_TITLE: &str = "New conversation";

pub const SYSTEM_PROMPT: &str = "Always assist with care, respect, and truth. Respond with utmost utility yet securely. Avoid harmful, unethical, prejudiced, or negative content. Ensure replies promote fairness and positivity. Keep responses short.";

/// A titled, append-only message history.
///
/// Index 0 always holds the system prompt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    id: String,
    title: String,
    messages: Vec<Message>,
}

impl Conversation {
    /// Create a conversation with a fresh id and the system prompt seeded
    pub fn new(title: Option<&str>) -> Self {
        Self {
            id: format!("conv_{}", Uuid::new_v4().simple()),
            title: title.unwrap_or(DEFAULT_TITLE).to_string(),
            messages: vec![Message::system(SYSTEM_PROMPT)],
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages after the system prompt
    pub fn visible_messages(&self) -> &[Message] {
        self.messages.get(1..).unwrap_or(&[])
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// True when nothing beyond the system prompt has been exchanged
    pub fn is_empty(&self) -> bool {
        self.messages.len() <= 1
    }

    /// Append a message, returning its index
    pub fn push_message(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    /// Concatenate `fragment` onto the message at `index`.
    /// Returns false if there is no message at that index.
    pub fn append_to_message(&mut self, index: usize, fragment: &str) -> bool {
        match self.messages.get_mut(index) {
            Some(message) => {
                message.content.push_str(fragment);
                true
            }
            None => false,
        }
    }

    /// Re-seed the system prompt when a persisted conversation lost it.
    /// Returns true if a repair happened.
    pub fn ensure_system_prompt(&mut self) -> bool {
        match self.messages.first() {
            Some(first) if first.role == Role::System => false,
            _ => {
                self.messages.insert(0, Message::system(SYSTEM_PROMPT));
                true
            }
        }
    }
}
