//! HTTP transport seam.
//!
//! The executor talks to the upstream only through [`Transport`], so retry and
//! timeout behavior can be exercised against a scripted fake.

pub mod http;

use crate::client::request::RequestSpec;
use crate::{BoxStream, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

pub use http::HttpTransport;

/// Status line, selected headers and an unread body of one HTTP exchange.
pub struct HttpReply {
    pub status: u16,
    /// Canonical reason phrase, used when an error body is empty
    pub reason: String,
    /// Parsed `Retry-After` (seconds form)
    pub retry_after: Option<Duration>,
    pub upstream_request_id: Option<String>,
    pub body: BoxStream<'static, Bytes>,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for HttpReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpReply")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("retry_after", &self.retry_after)
            .field("upstream_request_id", &self.upstream_request_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and return once response headers have arrived.
    ///
    /// Non-2xx statuses are returned as replies, not errors; only failures to
    /// obtain a response at all are `Err`.
    async fn send(&self, spec: &RequestSpec, request_id: &str) -> Result<HttpReply>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl TransportError {
    /// Whether reqwest itself gave up on a timer.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Http(e) if e.is_timeout())
    }
}
