pub mod error;
pub mod in_memory_store;
pub mod json_file_store;
pub mod store_adapter;
pub mod stores;

pub use error::{StoreError, StoreResult};
pub use in_memory_store::InMemoryStore;
pub use json_file_store::JsonFileStore;
pub use store_adapter::{BoxFuture, KeyValueStore};
pub use stores::{CONVERSATIONS_STORE, SETTINGS_STORE, Stores, TOKEN_STORE};
