//! Response cache.

use super::backend::{CacheBackend, MemoryCache};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Default entry lifetime in seconds.
    pub ttl_secs: u64,
    pub max_size: usize,
    /// Log statistics every N seconds; `None` disables the reporter.
    pub stats_interval_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_size: 100,
            stats_interval_secs: Some(60),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = ttl.as_secs();
        self
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, 0 when nothing was looked up yet.
    pub hit_rate: f64,
    pub size: usize,
    pub max_size: usize,
    /// Default TTL in seconds.
    pub ttl: u64,
}

struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AtomicStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

/// Bounded TTL cache for upstream responses, shared by handlers via `Arc`.
///
/// Values are stored serialized, so every `get` hands back an independent copy.
pub struct ResponseCache {
    config: CacheConfig,
    backend: Box<dyn CacheBackend>,
    stats: AtomicStats,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        let backend = MemoryCache::new(config.max_size);
        Self::with_backend(config, Box::new(backend))
    }

    pub fn with_backend(config: CacheConfig, backend: Box<dyn CacheBackend>) -> Self {
        Self {
            config,
            backend,
            stats: AtomicStats::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn default_ttl(&self) -> Duration {
        self.config.ttl()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.config.enabled {
            return None;
        }
        match self.backend.get(key).await {
            Ok(Some(data)) => match serde_json::from_slice(&data) {
                Ok(val) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    Some(val)
                }
                Err(e) => {
                    warn!(key, error = %e, "cached value no longer deserializes, dropping it");
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    let _ = self.backend.delete(key).await;
                    None
                }
            },
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                warn!(key, error = %e, "cache backend read failed");
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores `value` under `key`; `ttl` overrides the configured default.
    ///
    /// Returns `false` when caching is disabled or the value could not be stored.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        if !self.config.enabled {
            return false;
        }
        let data = match serde_json::to_vec(value) {
            Ok(d) => d,
            Err(e) => {
                warn!(key, error = %e, "value is not serializable, not caching");
                return false;
            }
        };
        let ttl = ttl.unwrap_or_else(|| self.config.ttl());
        match self.backend.set(key, data, ttl).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "cache backend write failed");
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        if !self.config.enabled {
            return false;
        }
        self.backend.delete(key).await.unwrap_or(false)
    }

    pub async fn clear(&self) {
        if let Err(e) = self.backend.clear().await {
            warn!(error = %e, "cache backend clear failed");
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            size: self.backend.len().await.unwrap_or(0),
            max_size: self.backend.capacity(),
            ttl: self.config.ttl_secs,
        }
    }

    /// Deterministic key for `params` under a tool-specific prefix.
    pub fn generate_key(prefix: &str, params: &Value) -> String {
        super::key::generate_key(prefix, params)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Logs `stats()` every `interval` until the returned handle is dropped.
    pub fn spawn_stats_reporter(self: &Arc<Self>, interval: Duration) -> StatsReporter {
        let cache = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let s = cache.stats().await;
                info!(
                    backend = cache.backend_name(),
                    hits = s.hits,
                    misses = s.misses,
                    hit_rate = s.hit_rate,
                    size = s.size,
                    max_size = s.max_size,
                    ttl_secs = s.ttl,
                    "cache statistics"
                );
            }
        });
        StatsReporter { handle }
    }
}

/// Handle for the background statistics task; aborts it on drop.
pub struct StatsReporter {
    handle: JoinHandle<()>,
}

impl Drop for StatsReporter {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
