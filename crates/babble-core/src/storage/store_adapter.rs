use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use super::error::StoreResult;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable key/value blob storage for one logical store.
///
/// `set` only stages a value; nothing is durable until `save` commits it.
/// Stores are independent of each other, there are no cross-store guarantees.
pub trait KeyValueStore: Send + Sync + 'static {
    /// Read the value stored under `key`, if any
    fn get(&self, key: &str) -> BoxFuture<'static, StoreResult<Option<Value>>>;

    /// Stage `value` under `key`
    fn set(&self, key: &str, value: Value) -> BoxFuture<'static, StoreResult<()>>;

    /// Commit every staged value to durable storage
    fn save(&self) -> BoxFuture<'static, StoreResult<()>>;

    /// Get the storage location (for diagnostics)
    fn storage_path(&self) -> String;
}
