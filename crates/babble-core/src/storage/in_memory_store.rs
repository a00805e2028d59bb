use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use super::error::StoreResult;
use super::store_adapter::{BoxFuture, KeyValueStore};

#[derive(Default)]
struct Slots {
    staged: HashMap<String, Value>,
    committed: HashMap<String, Value>,
}

/// Process-local store for tests and ephemeral sessions.
///
/// Keeps staged and committed values apart so callers can observe exactly what
/// a `save` would have made durable, and counts commits.
#[derive(Default)]
pub struct InMemoryStore {
    slots: Arc<Mutex<Slots>>,
    save_count: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value as of the last `save`
    pub fn committed_value(&self, key: &str) -> Option<Value> {
        self.slots.lock().committed.get(key).cloned()
    }

    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> BoxFuture<'static, StoreResult<Option<Value>>> {
        let value = self.slots.lock().staged.get(key).cloned();
        Box::pin(async move { Ok(value) })
    }

    fn set(&self, key: &str, value: Value) -> BoxFuture<'static, StoreResult<()>> {
        self.slots.lock().staged.insert(key.to_string(), value);
        Box::pin(async { Ok(()) })
    }

    fn save(&self) -> BoxFuture<'static, StoreResult<()>> {
        let slots = self.slots.clone();
        let save_count = self.save_count.clone();

        Box::pin(async move {
            let mut guard = slots.lock();
            guard.committed = guard.staged.clone();
            save_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn storage_path(&self) -> String {
        "memory".to_string()
    }
}
