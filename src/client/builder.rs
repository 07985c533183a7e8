use super::core::UpstreamClient;
use super::execution::RequestExecutor;
use super::policy::RetryPolicy;
use crate::config::UpstreamConfig;
use crate::pipeline::StreamDecoder;
use crate::transport::{HttpTransport, Transport};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`UpstreamClient`].
///
/// Defaults come from [`UpstreamConfig`]; tests inject a transport with
/// [`with_transport`](Self::with_transport) instead of going over HTTP.
pub struct UpstreamClientBuilder {
    config: UpstreamConfig,
    transport: Option<Arc<dyn Transport>>,
    policy: Option<RetryPolicy>,
}

impl Default for UpstreamClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamClientBuilder {
    pub fn new() -> Self {
        Self {
            config: UpstreamConfig::default(),
            transport: None,
            policy: None,
        }
    }

    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            config: config.clone(),
            transport: None,
            policy: None,
        }
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    /// Override the base URL (primarily for testing with mock servers).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Use `transport` instead of building an [`HttpTransport`].
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<UpstreamClient> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new(&self.config)?),
        };
        let policy = self
            .policy
            .unwrap_or_else(|| RetryPolicy::from_config(&self.config));
        Ok(UpstreamClient {
            executor: RequestExecutor::new(transport, policy, self.config.timeout()),
            decoder: StreamDecoder::default(),
        })
    }
}
