use std::path::Path;
use std::sync::Arc;

use super::in_memory_store::InMemoryStore;
use super::json_file_store::JsonFileStore;
use super::store_adapter::KeyValueStore;

pub const SETTINGS_STORE: &str = "settings";
pub const TOKEN_STORE: &str = "token";
pub const CONVERSATIONS_STORE: &str = "conversations";

/// The three independent logical stores the application persists to.
#[derive(Clone)]
pub struct Stores {
    pub settings: Arc<dyn KeyValueStore>,
    pub token: Arc<dyn KeyValueStore>,
    pub conversations: Arc<dyn KeyValueStore>,
}

impl Stores {
    /// JSON files under `dir`, one per logical store
    pub fn json_in(dir: &Path) -> Self {
        Self {
            settings: Arc::new(JsonFileStore::new(dir, SETTINGS_STORE)),
            token: Arc::new(JsonFileStore::new(dir, TOKEN_STORE)),
            conversations: Arc::new(JsonFileStore::new(dir, CONVERSATIONS_STORE)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            settings: Arc::new(InMemoryStore::new()),
            token: Arc::new(InMemoryStore::new()),
            conversations: Arc::new(InMemoryStore::new()),
        }
    }
}
