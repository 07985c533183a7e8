use super::{HttpReply, Transport, TransportError};
use crate::client::request::RequestSpec;
use crate::config::UpstreamConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{HeaderMap, ACCEPT, USER_AGENT};
use std::time::Duration;

const REQUEST_ID_HEADERS: &[&str] = &["x-request-id", "request-id", "cf-ray"];

/// reqwest-backed transport with bearer auth.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        // No whole-request timeout here: the executor times each attempt, and a
        // streamed body may legitimately outlive it.
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, spec: &RequestSpec, request_id: &str) -> Result<HttpReply> {
        let url = format!("{}{}", self.base_url, spec.operation.path());
        let mut req = self
            .client
            .request(spec.operation.method(), &url)
            .bearer_auth(&self.api_key)
            .header(
                USER_AGENT,
                concat!("diffusion-gateway/", env!("CARGO_PKG_VERSION")),
            )
            .header("x-request-id", request_id);

        if let Some(body) = &spec.body {
            req = req.json(body);
        }
        if spec.stream {
            req = req.header(ACCEPT, "text/event-stream");
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;

        let status = resp.status();
        let headers = resp.headers();
        let retry_after = retry_after(headers);
        let upstream_request_id = header_first(headers, REQUEST_ID_HEADERS);

        let body = resp
            .bytes_stream()
            .map_err(|e| Error::Transport(TransportError::Http(e)));

        Ok(HttpReply {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            retry_after,
            upstream_request_id,
            body: Box::pin(body),
        })
    }
}

/// First non-empty value among `names`.
pub fn header_first(headers: &HeaderMap, names: &[&str]) -> Option<String> {
    for name in names {
        if let Some(v) = headers.get(*name) {
            if let Ok(s) = v.to_str() {
                let s = s.trim();
                if !s.is_empty() {
                    return Some(s.to_string());
                }
            }
        }
    }
    None
}

/// Best-effort parsing of `Retry-After`.
///
/// Only the `Retry-After: <seconds>` form is supported; fractional seconds
/// are accepted.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = header_first(headers, &["retry-after"])?;
    let secs: f64 = raw.parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_retry_after_seconds() {
        let mut h = HeaderMap::new();
        assert_eq!(retry_after(&h), None);
        h.insert("retry-after", HeaderValue::from_static("5"));
        assert_eq!(retry_after(&h), Some(Duration::from_secs(5)));
        h.insert("retry-after", HeaderValue::from_static("1.5"));
        assert_eq!(retry_after(&h), Some(Duration::from_millis(1500)));
        h.insert(
            "retry-after",
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&h), None);
    }

    #[test]
    fn test_header_first_skips_blank_values() {
        let mut h = HeaderMap::new();
        h.insert("x-request-id", HeaderValue::from_static("  "));
        h.insert("request-id", HeaderValue::from_static("req-7"));
        assert_eq!(header_first(&h, REQUEST_ID_HEADERS).as_deref(), Some("req-7"));
    }
}
