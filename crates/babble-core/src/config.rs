use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "https://api-inference.huggingface.co";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_FRAGMENT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config path error: {message}")]
    PathError { message: String },

    #[error("Token passphrase must not be blank")]
    MissingPassphrase,
}

/// Host-supplied settings for one application instance
#[derive(Clone)]
pub struct AppConfig {
    /// Directory holding the settings, token and conversations stores
    pub data_dir: PathBuf,
    pub endpoint_base_url: String,
    pub connect_timeout: Duration,
    /// Longest wait for the next fragment of a reply
    pub fragment_timeout: Duration,
    token_passphrase: String,
}

impl AppConfig {
    /// Config rooted in the platform config directory (`<config>/babble`)
    pub fn new(token_passphrase: impl Into<String>) -> Result<Self, ConfigError> {
        let data_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::PathError {
                message: "Could not determine config directory".to_string(),
            })?
            .join("babble");

        Self::with_data_dir(data_dir, token_passphrase)
    }

    pub fn with_data_dir(
        data_dir: impl Into<PathBuf>,
        token_passphrase: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let token_passphrase = token_passphrase.into();
        if token_passphrase.trim().is_empty() {
            return Err(ConfigError::MissingPassphrase);
        }

        Ok(Self {
            data_dir: data_dir.into(),
            endpoint_base_url: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            fragment_timeout: DEFAULT_FRAGMENT_TIMEOUT,
            token_passphrase,
        })
    }

    pub fn with_endpoint(mut self, base_url: impl Into<String>) -> Self {
        self.endpoint_base_url = base_url.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_fragment_timeout(mut self, timeout: Duration) -> Self {
        self.fragment_timeout = timeout;
        self
    }

    pub fn token_passphrase(&self) -> &str {
        &self.token_passphrase
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("data_dir", &self.data_dir)
            .field("endpoint_base_url", &self.endpoint_base_url)
            .field("connect_timeout", &self.connect_timeout)
            .field("fragment_timeout", &self.fragment_timeout)
            .field("token_passphrase", &"<redacted>")
            .finish()
    }
}
