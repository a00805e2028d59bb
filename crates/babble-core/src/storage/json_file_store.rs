use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;

use super::error::{StoreError, StoreResult};
use super::store_adapter::{BoxFuture, KeyValueStore};

type Entries = Arc<Mutex<Option<Map<String, Value>>>>;

/// Distinguishes temp files of overlapping saves within one process
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// JSON file-backed store.
/// Each logical store lives in its own `<dir>/<name>.json` file holding one JSON object.
pub struct JsonFileStore {
    file_path: PathBuf,
    entries: Entries,
    save_lock: Arc<tokio::sync::Mutex<()>>,
}

impl JsonFileStore {
    /// Create the store for logical `name` inside `dir`
    pub fn new(dir: &Path, name: &str) -> Self {
        Self::with_path(dir.join(format!("{}.json", name)))
    }

    /// Create store with custom path (for testing)
    pub fn with_path(file_path: PathBuf) -> Self {
        Self {
            file_path,
            entries: Arc::new(Mutex::new(None)),
            save_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Load the file contents into the cache on first access.
    /// A missing file is an empty store (first run).
    async fn ensure_loaded(path: &Path, entries: &Entries) -> StoreResult<()> {
        if entries.lock().is_some() {
            return Ok(());
        }

        let loaded = if tokio::fs::try_exists(path).await? {
            let contents = tokio::fs::read_to_string(path).await?;
            match serde_json::from_str::<Value>(&contents)? {
                Value::Object(map) => map,
                other => {
                    return Err(StoreError::InvalidData {
                        path: path.display().to_string(),
                        message: format!("expected a JSON object, found {}", json_kind(&other)),
                    });
                }
            }
        } else {
            debug!(path = %path.display(), "Store file absent, starting empty");
            Map::new()
        };

        let mut guard = entries.lock();
        if guard.is_none() {
            *guard = Some(loaded);
        }
        Ok(())
    }
}

/// Unique sibling temp file, so concurrent writers never share one
fn temp_path_for(path: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_extension(format!("json.{}.{}.tmp", std::process::id(), n))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> BoxFuture<'static, StoreResult<Option<Value>>> {
        let path = self.file_path.clone();
        let entries = self.entries.clone();
        let key = key.to_string();

        Box::pin(async move {
            Self::ensure_loaded(&path, &entries).await?;
            Ok(entries
                .lock()
                .as_ref()
                .and_then(|map| map.get(&key).cloned()))
        })
    }

    fn set(&self, key: &str, value: Value) -> BoxFuture<'static, StoreResult<()>> {
        let path = self.file_path.clone();
        let entries = self.entries.clone();
        let key = key.to_string();

        Box::pin(async move {
            Self::ensure_loaded(&path, &entries).await?;
            if let Some(map) = entries.lock().as_mut() {
                map.insert(key, value);
            }
            Ok(())
        })
    }

    fn save(&self) -> BoxFuture<'static, StoreResult<()>> {
        let path = self.file_path.clone();
        let entries = self.entries.clone();
        let save_lock = self.save_lock.clone();

        Box::pin(async move {
            // Saves land in call order; the last commit holds the newest snapshot
            let _save = save_lock.lock().await;
            Self::ensure_loaded(&path, &entries).await?;

            // Snapshot under the lock, serialize and write outside it
            let snapshot = entries.lock().clone().unwrap_or_default();
            let json = serde_json::to_string_pretty(&Value::Object(snapshot))?;

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            // Write atomically using temp file + rename
            let temp_path = temp_path_for(&path);
            tokio::fs::write(&temp_path, &json).await?;
            if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(e.into());
            }

            debug!(path = %path.display(), bytes = json.len(), "Store committed");
            Ok(())
        })
    }

    fn storage_path(&self) -> String {
        self.file_path.to_string_lossy().to_string()
    }
}
