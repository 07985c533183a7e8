//! # diffusion-gateway
//!
//! Resilient tool-call gateway in front of a diffusion-LLM service.
//!
//! ## Overview
//!
//! The gateway exposes chat, streaming chat, fill-in-the-middle and model
//! listing as tools. Every tool call is validated against its input schema,
//! executed against the upstream HTTP API with per-attempt timeouts and
//! bounded, rate-limit-aware retries, and answered with either a result or a
//! structured error envelope. Deterministic results are cached.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use diffusion_gateway::cache::ResponseCache;
//! use diffusion_gateway::client::UpstreamClientBuilder;
//! use diffusion_gateway::config::GatewayConfig;
//! use diffusion_gateway::tools::{default_dispatcher, ToolContext};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> diffusion_gateway::Result<()> {
//!     let config = Arc::new(GatewayConfig::load(None)?);
//!     let client = Arc::new(UpstreamClientBuilder::from_config(&config.upstream).build()?);
//!     let cache = Arc::new(ResponseCache::new(config.cache.clone()));
//!     let dispatcher = default_dispatcher(&ToolContext::new(client, cache, config))?;
//!
//!     let response = dispatcher
//!         .call(
//!             "chat_completion",
//!             json!({"messages": [{"role": "user", "content": "Write a haiku about Rust"}]}),
//!         )
//!         .await;
//!     println!("{}", response.text_content());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error_kind`] | Error taxonomy shared by classification and envelopes |
//! | [`client`] | Request execution, retry policy, failure classification |
//! | [`transport`] | HTTP transport seam |
//! | [`pipeline`] | Server-sent event decoding |
//! | [`cache`] | TTL + LRU response cache |
//! | [`validation`] | Schema-driven tool argument validation |
//! | [`tools`] | Tool dispatcher, envelopes and the built-in tools |
//! | [`server`] | JSON-RPC tool server over line-delimited streams |
//! | [`config`] | YAML and environment configuration |
//! | [`logging`] | Subscriber setup and argument redaction |
//! | [`types`] | Upstream wire types |

pub mod cache;
pub mod client;
pub mod config;
pub mod error_kind;
pub mod logging;
pub mod pipeline;
pub mod server;
pub mod tools;
pub mod transport;
pub mod types;
pub mod validation;

// Re-export main types for convenience
pub use cache::ResponseCache;
pub use client::{CallStats, RequestExecutor, UpstreamClient, UpstreamClientBuilder};
pub use config::GatewayConfig;
pub use error_kind::ErrorKind;
pub use server::ToolServer;
pub use tools::{ErrorEnvelope, ToolDispatcher, ToolResponse};
pub use types::{Message, MessageRole};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A specialized Result for stream items
pub type PipeResult<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `PipeResult<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = PipeResult<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
