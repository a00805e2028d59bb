use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Install the global structured-logging subscriber.
///
/// Honours `RUST_LOG`, with `info` as the default level. Fails instead of
/// panicking when a subscriber is already installed.
pub fn init() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}
