//! Gateway error kinds: the taxonomy every failure is mapped onto before it
//! crosses the tool boundary.
//!
//! ## Kinds
//!
//! | Kind               | `type` string              | Retryable |
//! |--------------------|----------------------------|-----------|
//! | Validation         | `validation_error`         | no        |
//! | Authentication     | `authentication_error`     | no        |
//! | RateLimit          | `rate_limit_error`         | yes       |
//! | Server             | `server_error`             | yes       |
//! | Client             | `client_error`             | no        |
//! | Network            | `network_error`            | yes       |
//! | Timeout            | `timeout_error`            | yes       |
//! | ModelConvergence   | `model_convergence_error`  | yes       |
//! | FimBoundary        | `fim_boundary_error`       | no        |
//! | ToolNotFound       | `tool_not_found`           | no        |
//! | Execution          | `execution_error`          | no        |
//!
//! ## Example
//!
//! ```rust
//! use diffusion_gateway::error_kind::ErrorKind;
//!
//! let kind = ErrorKind::from_http_status(429);
//! assert_eq!(kind.name(), "rate_limit_error");
//! assert!(kind.retryable());
//! ```

use serde::{Serialize, Serializer};
use std::fmt;

/// Gateway error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Tool input failed schema validation
    Validation,
    /// Invalid, expired, or missing API key (HTTP 401)
    Authentication,
    /// Upstream rate limit exceeded (HTTP 429)
    RateLimit,
    /// Upstream internal failure (HTTP 5xx)
    Server,
    /// Any other 4xx rejected by the upstream
    Client,
    /// Connection reset, refused, or body read failure
    Network,
    /// Per-attempt timeout elapsed
    Timeout,
    /// Diffusion process did not converge
    ModelConvergence,
    /// Prefix/suffix context rejected for a fill-in-the-middle request
    FimBoundary,
    /// Requested tool is not registered
    ToolNotFound,
    /// Handler failed with an error it did not classify itself
    Execution,
}

impl ErrorKind {
    /// Returns the wire name used as `error.type` in envelopes.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::Authentication => "authentication_error",
            Self::RateLimit => "rate_limit_error",
            Self::Server => "server_error",
            Self::Client => "client_error",
            Self::Network => "network_error",
            Self::Timeout => "timeout_error",
            Self::ModelConvergence => "model_convergence_error",
            Self::FimBoundary => "fim_boundary_error",
            Self::ToolNotFound => "tool_not_found",
            Self::Execution => "execution_error",
        }
    }

    /// Returns whether this kind is retried by the executor.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Server | Self::Network | Self::Timeout | Self::ModelConvergence
        )
    }

    /// A human-actionable hint attached to envelopes of this kind.
    pub fn suggested_fix(&self) -> Option<&'static str> {
        let hint = match self {
            Self::Validation => "Check the tool's inputSchema and correct the listed fields",
            Self::Authentication => "Check the configured API key (GATEWAY_API_KEY)",
            Self::RateLimit => "Wait for the retry_after interval before calling again",
            Self::Server => "The upstream service is failing; retry later",
            Self::Network => "Check network connectivity and the configured base URL",
            Self::Timeout => "Try reducing max_tokens or simplifying the prompt",
            Self::ModelConvergence => "Increase diffusion_steps or adjust temperature",
            Self::FimBoundary => "Ensure prefix and suffix provide clear context boundaries",
            Self::ToolNotFound => "Call tools/list and use one of the available tool names",
            Self::Client | Self::Execution => return None,
        };
        Some(hint)
    }

    /// Maps an HTTP status code to a kind.
    ///
    /// Only meaningful for failed responses; 2xx/3xx statuses map to `Client`
    /// because the gateway never follows them as errors on purpose.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 => Self::Authentication,
            429 => Self::RateLimit,
            s if s >= 500 => Self::Server,
            _ => Self::Client,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for ErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}
