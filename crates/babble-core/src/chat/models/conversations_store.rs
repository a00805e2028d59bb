use std::collections::HashMap;

use super::conversation::Conversation;

/// In-memory conversation collection in creation order, plus the active selection
#[derive(Debug, Default, Clone)]
pub struct ConversationsStore {
    conversations: Vec<Conversation>,
    index: HashMap<String, usize>,
    active_conversation_id: Option<String>,
}

impl ConversationsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a conversation to the end of the collection.
    /// Does not change the active selection.
    pub fn add_conversation(&mut self, conversation: Conversation) {
        self.index
            .insert(conversation.id().to_string(), self.conversations.len());
        self.conversations.push(conversation);
    }

    /// Get a conversation by ID (immutable)
    pub fn get_conversation(&self, id: &str) -> Option<&Conversation> {
        self.index.get(id).map(|&i| &self.conversations[i])
    }

    /// Get a mutable reference to a conversation by ID
    pub fn get_conversation_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        match self.index.get(id) {
            Some(&i) => self.conversations.get_mut(i),
            None => None,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Delete a conversation by ID.
    ///
    /// If it was active, the most recently created remaining conversation
    /// becomes active, or none when the collection is now empty.
    pub fn delete_conversation(&mut self, id: &str) -> bool {
        let Some(position) = self.index.remove(id) else {
            return false;
        };
        self.conversations.remove(position);
        self.rebuild_index();

        if self.active_conversation_id.as_deref() == Some(id) {
            self.active_conversation_id = self.conversations.last().map(|c| c.id().to_string());
        }

        true
    }

    /// Set the active conversation
    pub fn set_active(&mut self, id: &str) -> bool {
        if self.contains(id) {
            self.active_conversation_id = Some(id.to_string());
            true
        } else {
            false
        }
    }

    /// Get the active conversation ID
    pub fn active_id(&self) -> Option<&str> {
        self.active_conversation_id.as_deref()
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active_id().and_then(|id| self.get_conversation(id))
    }

    /// Clear the active conversation (set to None)
    pub fn clear_active(&mut self) {
        self.active_conversation_id = None;
    }

    /// List all conversations in creation order
    pub fn list_all(&self) -> &[Conversation] {
        &self.conversations
    }

    /// List conversations newest first
    pub fn list_recent(&self) -> Vec<&Conversation> {
        self.conversations.iter().rev().collect()
    }

    /// Get count of conversations
    pub fn count(&self) -> usize {
        self.conversations.len()
    }

    /// Replace the whole collection.
    /// The active selection survives only if it still names a conversation.
    pub fn replace_all(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
        self.rebuild_index();

        let stale = self
            .active_conversation_id
            .as_deref()
            .is_some_and(|active| !self.index.contains_key(active));
        if stale {
            self.active_conversation_id = None;
        }
    }

    /// Owned copy of the collection for persistence
    pub fn snapshot(&self) -> Vec<Conversation> {
        self.conversations.clone()
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .conversations
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id().to_string(), i))
            .collect();
    }
}
