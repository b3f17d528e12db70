//! In-process shared data service.
//!
//! Mirrors the subset of Redis the coordination core relies on: string
//! values with optional TTL, head-inserted lists, fire-and-forget pub/sub.
//! A single lock guards all state, so every operation is atomic on its own
//! and nothing spans more than one key.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::state_store::{Backend, MessageSink, RawMessage, StoreError};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

#[derive(Default)]
struct Inner {
    values: HashMap<String, Entry>,
    lists: HashMap<String, VecDeque<String>>,
    subscribers: HashMap<String, Vec<MessageSink>>,
}

impl Inner {
    fn live_value(&mut self, key: &str) -> Option<&String> {
        let now = Instant::now();
        if self.values.get(key).map(|e| e.is_expired(now)).unwrap_or(false) {
            self.values.remove(key);
        }
        self.values.get(key).map(|e| &e.value)
    }
}

/// Shared in-memory backend
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    available: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the service going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable(
                "memory backend is offline".to_string(),
            ))
        }
    }
}

/// Translate Redis-style inclusive indexes into a slice range
fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    if len == 0 {
        return None;
    }
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.check()?;
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let mut inner = self.inner.lock().await;
        inner
            .values
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        Ok(inner.live_value(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let value = inner
            .values
            .remove(key)
            .map(|e| !e.is_expired(now))
            .unwrap_or(false);
        let list = inner.lists.remove(key).is_some();
        Ok(value || list)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: String,
    ) -> Result<bool, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        if inner.live_value(key).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        // CAS keeps the existing expiry
        if let Some(entry) = inner.values.get_mut(key) {
            entry.value = value;
        }
        Ok(true)
    }

    async fn lpush(&self, key: &str, value: String) -> Result<usize, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        let list = inner.lists.entry(key.to_string()).or_default();
        list.push_front(value);
        Ok(list.len())
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        self.check()?;
        let inner = self.inner.lock().await;
        let Some(list) = inner.lists.get(key) else {
            return Ok(Vec::new());
        };
        Ok(match resolve_range(list.len(), start, stop) {
            Some((from, to)) => list.range(from..=to).cloned().collect(),
            None => Vec::new(),
        })
    }

    async fn publish(&self, channel: &str, message: String) -> Result<usize, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        let Some(sinks) = inner.subscribers.get_mut(channel) else {
            debug!(channel, "publish with no subscribers");
            return Ok(0);
        };

        sinks.retain(|sink| !sink.is_closed());
        let mut delivered = 0;
        for sink in sinks.iter() {
            let raw = RawMessage {
                channel: channel.to_string(),
                payload: message.clone(),
            };
            if sink.send(raw).is_ok() {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    async fn subscribe(&self, channel: &str, sink: MessageSink) -> Result<(), StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        inner
            .subscribers
            .entry(channel.to_string())
            .or_default()
            .push(sink);
        Ok(())
    }

    async fn ping(&self) -> bool {
        self.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_resolve_range() {
        assert_eq!(resolve_range(5, 0, -1), Some((0, 4)));
        assert_eq!(resolve_range(5, 1, 2), Some((1, 2)));
        assert_eq!(resolve_range(5, -2, -1), Some((3, 4)));
        assert_eq!(resolve_range(5, 0, 100), Some((0, 4)));
        assert_eq!(resolve_range(5, 4, 1), None);
        assert_eq!(resolve_range(0, 0, -1), None);
        assert_eq!(resolve_range(3, 5, 10), None);
    }

    #[tokio::test]
    async fn test_lpush_inserts_at_head() {
        let backend = MemoryBackend::new();
        backend.lpush("ids", "a".to_string()).await.unwrap();
        backend.lpush("ids", "b".to_string()).await.unwrap();
        let len = backend.lpush("ids", "c".to_string()).await.unwrap();

        assert_eq!(len, 3);
        assert_eq!(backend.lrange("ids", 0, -1).await.unwrap(), vec!["c", "b", "a"]);
        assert_eq!(backend.lrange("ids", 0, 0).await.unwrap(), vec!["c"]);
        assert!(backend.lrange("missing", 0, -1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let backend = MemoryBackend::new();
        backend.set("k", "v1".to_string(), None).await.unwrap();

        assert!(!backend.compare_and_set("k", "stale", "v2".to_string()).await.unwrap());
        assert!(backend.compare_and_set("k", "v1", "v2".to_string()).await.unwrap());
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v2"));
        assert!(!backend.compare_and_set("absent", "v1", "x".to_string()).await.unwrap());
    }

    #[tokio::test]
    async fn test_publish_skips_closed_sinks() {
        let backend = MemoryBackend::new();
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        backend.subscribe("chan", tx_live).await.unwrap();
        backend.subscribe("chan", tx_dead).await.unwrap();
        drop(rx_dead);

        let delivered = backend.publish("chan", "hello".to_string()).await.unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(rx_live.recv().await.unwrap().payload, "hello");
    }

    #[tokio::test]
    async fn test_offline_backend_fails_every_call() {
        let backend = MemoryBackend::new();
        backend.set_available(false);

        assert!(!backend.ping().await);
        assert!(matches!(
            backend.get("k").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(backend.lpush("l", "x".to_string()).await.is_err());

        backend.set_available(true);
        assert!(backend.ping().await);
    }
}
