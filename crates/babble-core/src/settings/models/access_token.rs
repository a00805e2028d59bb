use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::crypto::{self, CodecError};
use crate::storage::{KeyValueStore, StoreError};

/// Key of the encrypted token inside the token store
pub const TOKEN_KEY: &str = "token";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("No access token configured")]
    Missing,

    #[error("Access token must not be blank")]
    Blank,

    #[error("Access token could not be decoded: {0}")]
    Codec(#[from] CodecError),

    #[error("Token store error: {0}")]
    Store(#[from] StoreError),
}

/// Persists the access token encrypted at rest.
///
/// Plaintext only exists in memory while saving and while a caller holds the
/// value returned by [`AccessTokenVault::load_token`].
pub struct AccessTokenVault {
    store: Arc<dyn KeyValueStore>,
    passphrase: String,
    write_lock: Mutex<()>,
}

impl fmt::Debug for AccessTokenVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenVault")
            .field("store", &self.store.storage_path())
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

impl AccessTokenVault {
    pub fn new(store: Arc<dyn KeyValueStore>, passphrase: impl Into<String>) -> Self {
        Self {
            store,
            passphrase: passphrase.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Encrypt and persist `token`
    pub async fn save_token(&self, token: &str) -> Result<(), TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Blank);
        }

        let blob = crypto::encrypt(token, &self.passphrase)?;
        let _write = self.write_lock.lock().await;
        self.store.set(TOKEN_KEY, Value::String(blob)).await?;
        self.store.save().await?;

        info!(token_len = token.len(), "Access token saved");
        Ok(())
    }

    /// Read and decrypt the stored token. Never cached.
    pub async fn load_token(&self) -> Result<String, TokenError> {
        let blob = match self.store.get(TOKEN_KEY).await? {
            Some(Value::String(blob)) if !blob.is_empty() => blob,
            _ => return Err(TokenError::Missing),
        };

        let token = crypto::decrypt(&blob, &self.passphrase).inspect_err(|e| {
            warn!(error = %e, "Stored access token could not be decrypted");
        })?;

        if token.trim().is_empty() {
            return Err(TokenError::Missing);
        }
        Ok(token)
    }

    /// Startup probe: a token is stored and decrypts under the configured passphrase
    pub async fn has_valid_token(&self) -> bool {
        match self.load_token().await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "No usable access token");
                false
            }
        }
    }
}
