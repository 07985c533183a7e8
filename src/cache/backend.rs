//! Cache backend implementations.

use crate::Result;
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    key: String,
    value: Vec<u8>,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn new(key: &str, value: Vec<u8>, ttl: Duration) -> Self {
        Self {
            key: key.to_string(),
            value,
            stored_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }
}

/// Storage seam under [`ResponseCache`](super::ResponseCache).
///
/// Values are opaque serialized bytes; expiry is the backend's job.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
    async fn clear(&self) -> Result<()>;
    /// Number of live (unexpired) entries.
    async fn len(&self) -> Result<usize>;
    fn capacity(&self) -> usize;
    fn name(&self) -> &'static str;
}

/// In-memory bounded cache.
///
/// Eviction is by insertion order: reads use `peek`, so a hit never refreshes
/// an entry's position. Inserting a new key at capacity purges expired entries
/// first and only then evicts the oldest insert.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    max_entries: NonZeroUsize,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(max_entries)),
            max_entries,
        }
    }

    fn purge_expired(entries: &mut LruCache<String, CacheEntry>) -> usize {
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_expired())
            .map(|(k, _)| k.clone())
            .collect();
        for k in &expired {
            entries.pop(k);
        }
        expired.len()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.lock().await;
        match entries.peek(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
            Some(_) => {}
        }
        entries.pop(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if !entries.contains(key) && entries.len() >= self.max_entries.get() {
            let purged = Self::purge_expired(&mut entries);
            if purged == 0 {
                if let Some((_, evicted)) = entries.pop_lru() {
                    tracing::debug!(key = evicted.key.as_str(), "cache full, evicted oldest entry");
                }
            }
        }
        // Re-inserting an existing key counts as a fresh insert for eviction order.
        entries.put(key.to_string(), CacheEntry::new(key, value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().await.pop(key).is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.lock().await.clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let mut entries = self.entries.lock().await;
        Self::purge_expired(&mut entries);
        Ok(entries.len())
    }

    fn capacity(&self) -> usize {
        self.max_entries.get()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
