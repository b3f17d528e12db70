//! Namespaced structured storage over a shared key/value service.
//!
//! Values live in the backing service as strings, the way Redis keeps them.
//! Maps and sequences are written as JSON and parsed back on read; string
//! scalars are written verbatim. There is no multi-key atomicity: the only
//! atomic primitives are single-key writes and `compare_and_swap`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

/// Errors surfaced by the store.
///
/// A missing key is never an error: reads return `Ok(None)` for absence and
/// `Err(Unavailable)` only when the service could not be reached.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A message received on a pub/sub channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub channel: String,
    pub payload: String,
}

/// Where a subscription delivers its messages
pub type MessageSink = mpsc::UnboundedSender<RawMessage>;

/// Primitive operations of the shared data service
#[async_trait]
pub trait Backend: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Replace `key` only if its current raw value equals `expected`
    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: String,
    ) -> Result<bool, StoreError>;

    /// Insert at the head of a list, returning the new length
    async fn lpush(&self, key: &str, value: String) -> Result<usize, StoreError>;

    /// Inclusive range; negative indexes count from the tail
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError>;

    /// Publish to a channel, returning the number of receivers
    async fn publish(&self, channel: &str, message: String) -> Result<usize, StoreError>;

    /// Route every future message on `channel` into `sink`
    async fn subscribe(&self, channel: &str, sink: MessageSink) -> Result<(), StoreError>;

    async fn ping(&self) -> bool;
}

/// Shared handle to the state store.
///
/// Cloning is cheap; all clones observe the same backend and namespace.
#[derive(Clone)]
pub struct StateStore {
    backend: Arc<dyn Backend>,
    namespace: String,
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("backend", &self.backend.name())
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl StateStore {
    /// Create a store over `backend`, qualifying every key with `namespace`.
    /// An empty namespace leaves keys untouched.
    pub fn new(backend: Arc<dyn Backend>, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn qualify(&self, key: &str) -> String {
        if self.namespace.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.namespace, key)
        }
    }

    /// Store a structured value (last write wins)
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let raw = encode(value)?;
        logged("SET", key, self.backend.set(&self.qualify(key), raw, ttl).await)
    }

    /// Read a value back in its stored shape
    pub async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.get_raw(key).await?.map(decode))
    }

    /// Read a value and deserialize it into `T`
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.get_raw(key).await?.map(decode_as).transpose()
    }

    /// Read the raw stored string (used as the expected value for CAS)
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        logged("GET", key, self.backend.get(&self.qualify(key)).await)
    }

    /// Replace `key` with `value` only if it still holds `expected_raw`
    pub async fn compare_and_swap<T: Serialize + ?Sized>(
        &self,
        key: &str,
        expected_raw: &str,
        value: &T,
    ) -> Result<bool, StoreError> {
        let raw = encode(value)?;
        logged(
            "CAS",
            key,
            self.backend
                .compare_and_set(&self.qualify(key), expected_raw, raw)
                .await,
        )
    }

    pub async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        logged("DELETE", key, self.backend.delete(&self.qualify(key)).await)
    }

    /// Insert at the head of the list stored at `key`
    pub async fn list_prepend<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<usize, StoreError> {
        let raw = encode(value)?;
        logged("LPUSH", key, self.backend.lpush(&self.qualify(key), raw).await)
    }

    /// Point-in-time snapshot of a list range
    pub async fn list_range(&self, key: &str, start: i64, end: i64) -> Result<Vec<Value>, StoreError> {
        let items = logged(
            "LRANGE",
            key,
            self.backend.lrange(&self.qualify(key), start, end).await,
        )?;
        Ok(items.into_iter().map(decode).collect())
    }

    pub async fn list_range_as<T: DeserializeOwned>(
        &self,
        key: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<T>, StoreError> {
        let items = logged(
            "LRANGE",
            key,
            self.backend.lrange(&self.qualify(key), start, end).await,
        )?;
        items.into_iter().map(decode_as).collect()
    }

    /// Publish a raw message on a channel
    pub async fn publish(&self, channel: &str, message: &str) -> Result<usize, StoreError> {
        logged(
            "PUBLISH",
            channel,
            self.backend.publish(channel, message.to_string()).await,
        )
    }

    /// Deliver every future message on `channel` into `sink`
    pub async fn subscribe(&self, channel: &str, sink: MessageSink) -> Result<(), StoreError> {
        logged("SUBSCRIBE", channel, self.backend.subscribe(channel, sink).await)
    }

    /// Check if the backing service is reachable
    pub async fn ping(&self) -> bool {
        self.backend.ping().await
    }
}

fn logged<T>(op: &str, key: &str, result: Result<T, StoreError>) -> Result<T, StoreError> {
    if let Err(ref e) = result {
        warn!(op, key, error = %e, "state store operation failed");
    }
    result
}

/// Strings are stored verbatim, everything else as JSON text
fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, StoreError> {
    match serde_json::to_value(value)? {
        Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

/// Parse JSON where possible, otherwise hand back the raw string
fn decode(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

/// Decode into `T`. A string stored verbatim that happens to parse as JSON
/// (`"123"`, `"true"`) is retried as the plain string it was written as.
fn decode_as<T: DeserializeOwned>(raw: String) -> Result<T, StoreError> {
    let Ok(value) = serde_json::from_str::<Value>(&raw) else {
        return Ok(serde_json::from_value(Value::String(raw))?);
    };

    match serde_json::from_value(value) {
        Ok(typed) => Ok(typed),
        Err(e) => serde_json::from_value(Value::String(raw)).map_err(|_| StoreError::from(e)),
    }
}
