//! # Response Caching Module
//!
//! Bounded, TTL-based caching of deterministic upstream responses, so that a
//! repeated tool call with identical parameters skips the network.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResponseCache`] | TTL, size bound, hit/miss statistics, enable switch |
//! | [`CacheConfig`] | Configuration for cache behavior and limits |
//! | [`CacheBackend`] | Trait for implementing custom cache backends |
//! | [`MemoryCache`] | In-memory bounded cache with insertion-order eviction |
//! | [`generate_key`] | Order-insensitive key derivation from request parameters |
//!
//! ## Example
//!
//! ```rust
//! use diffusion_gateway::cache::{CacheConfig, ResponseCache};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let cache = ResponseCache::new(CacheConfig::default().with_ttl(Duration::from_secs(60)));
//! let key = ResponseCache::generate_key("chat", &json!({"model": "m", "temperature": 0}));
//! cache.set(&key, &json!({"content": "hi"}), None).await;
//! let hit: Option<serde_json::Value> = cache.get(&key).await;
//! assert!(hit.is_some());
//! # });
//! ```
//!
//! ## What gets cached
//!
//! Only deterministic requests (temperature absent or zero) are stored, and
//! streamed results never are. Those rules live in the tool handlers; this
//! module only stores what it is given.

mod backend;
mod key;
mod manager;

pub use backend::{CacheBackend, MemoryCache};
pub use key::{canonical_json, generate_key};
pub use manager::{CacheConfig, CacheStats, ResponseCache, StatsReporter};
