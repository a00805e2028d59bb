use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::error::{RepositoryError, RepositoryResult};
use crate::chat::models::{Conversation, ConversationsStore};
use crate::storage::KeyValueStore;

/// Key of the conversation collection inside the conversations store
pub const CONVERSATIONS_KEY: &str = "conversations";

/// Owns the conversation collection and mirrors it to durable storage.
///
/// Every mutation goes through [`ConversationRepository::update`], which
/// writes the changed collection and only then makes it the live state. Writers are serialised so durable writes land in mutation order.
pub struct ConversationRepository {
    state: Mutex<ConversationsStore>,
    store: Arc<dyn KeyValueStore>,
    write_lock: tokio::sync::Mutex<()>,
}

impl ConversationRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            state: Mutex::new(ConversationsStore::new()),
            store,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// All conversations in creation order
    pub fn list_conversations(&self) -> Vec<Conversation> {
        self.state.lock().snapshot()
    }

    /// All conversations newest first (sidebar order)
    pub fn list_recent_first(&self) -> Vec<Conversation> {
        self.state
            .lock()
            .list_recent()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn conversation(&self, id: &str) -> Option<Conversation> {
        self.state.lock().get_conversation(id).cloned()
    }

    pub fn active_conversation(&self) -> Option<Conversation> {
        self.state.lock().active_conversation().cloned()
    }

    pub fn active_conversation_id(&self) -> Option<String> {
        self.state.lock().active_id().map(str::to_string)
    }

    pub fn count(&self) -> usize {
        self.state.lock().count()
    }

    /// Create and persist a new conversation. It is not selected.
    pub async fn create_conversation(
        &self,
        title: Option<&str>,
    ) -> RepositoryResult<Conversation> {
        let conversation = Conversation::new(title);
        let created = conversation.clone();

        self.update(move |store| {
            store.add_conversation(conversation);
            Some(())
        })
        .await?;

        info!(conv_id = %created.id(), "Created conversation");
        Ok(created)
    }

    /// Point the active selection at `id`. Unknown ids leave it unchanged.
    pub fn select_conversation(&self, id: &str) -> bool {
        let selected = self.state.lock().set_active(id);
        if !selected {
            debug!(conv_id = %id, "Ignoring selection of unknown conversation");
        }
        selected
    }

    /// Clear the active selection so the next send starts a new conversation
    pub fn clear_selection(&self) {
        self.state.lock().clear_active();
    }

    /// Rename a conversation. Returns false (and writes nothing) if it does not exist.
    pub async fn edit_conversation(&self, id: &str, title: &str) -> RepositoryResult<bool> {
        let title = title.to_string();
        let edited = self
            .update(|store| {
                let conversation = store.get_conversation_mut(id)?;
                conversation.set_title(title);
                Some(())
            })
            .await?;

        Ok(edited.is_some())
    }

    /// Delete a conversation, promoting another to active if needed.
    /// Returns false (and writes nothing) if it does not exist.
    pub async fn delete_conversation(&self, id: &str) -> RepositoryResult<bool> {
        let deleted = self
            .update(|store| store.delete_conversation(id).then_some(()))
            .await?;

        if deleted.is_some() {
            info!(conv_id = %id, "Deleted conversation");
        }
        Ok(deleted.is_some())
    }

    /// Replace the in-memory collection with the persisted snapshot.
    ///
    /// Fails with [`RepositoryError::StoreEmpty`] when nothing was ever saved.
    pub async fn load(&self) -> RepositoryResult<()> {
        let _write = self.write_lock.lock().await;

        let value = self
            .store
            .get(CONVERSATIONS_KEY)
            .await?
            .ok_or(RepositoryError::StoreEmpty)?;
        let mut conversations: Vec<Conversation> = serde_json::from_value(value)?;

        for conversation in conversations.iter_mut() {
            if conversation.ensure_system_prompt() {
                warn!(
                    conv_id = %conversation.id(),
                    "Persisted conversation had no system prompt, re-seeded"
                );
            }
        }

        let count = conversations.len();
        self.state.lock().replace_all(conversations);
        info!(count, "Loaded conversations");
        Ok(())
    }

    /// Load, treating a never-saved collection as empty (first run)
    pub async fn load_or_start_empty(&self) -> RepositoryResult<()> {
        match self.load().await {
            Err(RepositoryError::StoreEmpty) => {
                info!("No saved conversations, starting empty");
                Ok(())
            }
            other => other,
        }
    }

    /// The single mutation path.
    ///
    /// `f` mutates a working copy of the collection and returns `Some` when it
    /// changed something. The copy is persisted and only then becomes the live
    /// state, so a failed write leaves memory matching disk.
    /// `None` means no change, and nothing is written.
    pub async fn update<F, R>(&self, f: F) -> RepositoryResult<Option<R>>
    where
        F: FnOnce(&mut ConversationsStore) -> Option<R> + Send,
        R: Send,
    {
        let _write = self.write_lock.lock().await;

        let (mut working, previous_active) = {
            let state = self.state.lock();
            (state.clone(), state.active_id().map(str::to_string))
        };
        let Some(result) = f(&mut working) else {
            return Ok(None);
        };

        let value = serde_json::to_value(working.list_all())?;
        self.store.set(CONVERSATIONS_KEY, value).await?;
        self.store.save().await?;

        let mut state = self.state.lock();
        // Selection is not persisted; keep any change made while the write was in flight
        if working.active_id() == previous_active.as_deref() {
            match state.active_id().map(str::to_string) {
                Some(id) => {
                    if !working.set_active(&id) {
                        working.clear_active();
                    }
                }
                None => working.clear_active(),
            }
        }
        *state = working;

        Ok(Some(result))
    }
}
