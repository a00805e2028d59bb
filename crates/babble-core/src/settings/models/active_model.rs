use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::storage::{KeyValueStore, StoreError};

/// Key of the selected model id inside the settings store
pub const MODEL_KEY: &str = "model";

#[derive(Debug, Error)]
pub enum ModelSelectionError {
    #[error("No model configured. Please input a model to start babbling.")]
    NoModelConfigured,

    #[error("Model id must not be blank")]
    InvalidModel,

    #[error("Settings store error: {0}")]
    Store(#[from] StoreError),
}

/// Tracks which model id requests are sent to
pub struct ActiveModelSelector {
    store: Arc<dyn KeyValueStore>,
    active_model: RwLock<String>,
    /// Serializes set + save + in-memory update
    write_lock: Mutex<()>,
}

impl ActiveModelSelector {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            active_model: RwLock::new(String::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Current model id; empty until loaded or set
    pub fn get_active_model(&self) -> String {
        self.active_model.read().clone()
    }

    pub fn is_configured(&self) -> bool {
        !self.active_model.read().is_empty()
    }

    /// Read the persisted selection.
    /// Absent or blank values are an error, never defaulted.
    pub async fn load_active_model(&self) -> Result<(), ModelSelectionError> {
        let stored = self.store.get(MODEL_KEY).await?;

        let model_id = match stored {
            Some(Value::String(model_id)) if !model_id.trim().is_empty() => model_id,
            Some(other) if !other.is_string() => {
                warn!("Stored model selection is not a string, ignoring it");
                return Err(ModelSelectionError::NoModelConfigured);
            }
            _ => return Err(ModelSelectionError::NoModelConfigured),
        };

        let model_id = model_id.trim().to_string();
        info!(model = %model_id, "Loaded active model");
        *self.active_model.write() = model_id;
        Ok(())
    }

    /// Validate, persist, then adopt a new model id
    pub async fn set_active_model(&self, model_id: &str) -> Result<(), ModelSelectionError> {
        let model_id = model_id.trim();
        if model_id.is_empty() {
            return Err(ModelSelectionError::InvalidModel);
        }

        let _write = self.write_lock.lock().await;
        self.store
            .set(MODEL_KEY, Value::String(model_id.to_string()))
            .await?;
        self.store.save().await?;

        *self.active_model.write() = model_id.to_string();
        info!(model = %model_id, "Active model changed");
        Ok(())
    }
}
