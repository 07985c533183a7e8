//! Gateway configuration.
//!
//! Loaded from an optional YAML file, then overridden by `GATEWAY_*`
//! environment variables, then checked with [`GatewayConfig::validate`].
//!
//! ```yaml
//! default_model: mercury-coder-small
//! upstream:
//!   api_key: sk-...
//!   base_url: https://api.inceptionlabs.ai/v1
//!   timeout_ms: 30000
//!   max_retries: 3
//! cache:
//!   ttl_secs: 300
//!   max_size: 100
//! logging:
//!   level: info
//!   format: json
//! ```

use crate::cache::CacheConfig;
use crate::logging::{LogFormat, LoggingConfig};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.inceptionlabs.ai/v1";
pub const DEFAULT_MODEL: &str = "mercury-coder-small";

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub api_key: String,
    pub base_url: String,
    /// Per-attempt timeout.
    pub timeout_ms: u64,
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub retry_delay_ms: u64,
    /// Cap for computed backoff delays (server retry-after is not capped).
    pub max_retry_delay_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: 30_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
            max_retry_delay_ms: 10_000,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }
}

// Keep the key out of logs and panic messages.
impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("max_retry_delay_ms", &self.max_retry_delay_ms)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffusionConfig {
    pub default_steps: u32,
    /// Requested steps are clamped to this.
    pub max_steps: u32,
    pub default_temperature: f64,
    /// Confidence below this is logged as a low-confidence generation.
    pub stability_threshold: f64,
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        Self {
            default_steps: 20,
            max_steps: 50,
            default_temperature: 0.7,
            stability_threshold: 0.85,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub diffusion: DiffusionConfig,
    pub logging: LoggingConfig,
    pub default_model: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            cache: CacheConfig::default(),
            diffusion: DiffusionConfig::default(),
            logging: LoggingConfig::default(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl GatewayConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("Failed to read config file: {}", e),
                ErrorContext::new()
                    .with_details(path.display().to_string())
                    .with_source("config_loader"),
            )
        })?;
        Self::from_yaml_str(&raw)
    }

    /// File (if given) or defaults, then environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_yaml_file(p)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Apply `GATEWAY_*` overrides using `lookup` to read variables.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GATEWAY_API_KEY") {
            self.upstream.api_key = v;
        }
        if let Some(v) = get("GATEWAY_BASE_URL") {
            self.upstream.base_url = v;
        }
        if let Some(v) = get("GATEWAY_TIMEOUT_MS") {
            self.upstream.timeout_ms = parse_env("GATEWAY_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("GATEWAY_MAX_RETRIES") {
            self.upstream.max_retries = parse_env("GATEWAY_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("GATEWAY_RETRY_DELAY_MS") {
            self.upstream.retry_delay_ms = parse_env("GATEWAY_RETRY_DELAY_MS", &v)?;
        }
        if let Some(v) = get("GATEWAY_MAX_RETRY_DELAY_MS") {
            self.upstream.max_retry_delay_ms = parse_env("GATEWAY_MAX_RETRY_DELAY_MS", &v)?;
        }
        if let Some(v) = get("GATEWAY_CACHE_ENABLED") {
            self.cache.enabled = parse_env("GATEWAY_CACHE_ENABLED", &v)?;
        }
        if let Some(v) = get("GATEWAY_CACHE_TTL_SECS") {
            self.cache.ttl_secs = parse_env("GATEWAY_CACHE_TTL_SECS", &v)?;
        }
        if let Some(v) = get("GATEWAY_CACHE_MAX_SIZE") {
            self.cache.max_size = parse_env("GATEWAY_CACHE_MAX_SIZE", &v)?;
        }
        if let Some(v) = get("GATEWAY_DEFAULT_MODEL") {
            self.default_model = v;
        }
        if let Some(v) = get("GATEWAY_DIFFUSION_DEFAULT_STEPS") {
            self.diffusion.default_steps = parse_env("GATEWAY_DIFFUSION_DEFAULT_STEPS", &v)?;
        }
        if let Some(v) = get("GATEWAY_DIFFUSION_MAX_STEPS") {
            self.diffusion.max_steps = parse_env("GATEWAY_DIFFUSION_MAX_STEPS", &v)?;
        }
        if let Some(v) = get("GATEWAY_DIFFUSION_DEFAULT_TEMPERATURE") {
            self.diffusion.default_temperature =
                parse_env("GATEWAY_DIFFUSION_DEFAULT_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("GATEWAY_DIFFUSION_STABILITY_THRESHOLD") {
            self.diffusion.stability_threshold =
                parse_env("GATEWAY_DIFFUSION_STABILITY_THRESHOLD", &v)?;
        }
        if let Some(v) = get("GATEWAY_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = get("GATEWAY_LOG_FORMAT") {
            self.logging.format = LogFormat::from_str(&v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.upstream.api_key.trim().is_empty() {
            return Err(invalid(
                "upstream.api_key",
                "API key is required (set GATEWAY_API_KEY)",
            ));
        }
        match url::Url::parse(&self.upstream.base_url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            Ok(u) => {
                return Err(invalid(
                    "upstream.base_url",
                    format!("Unsupported URL scheme '{}'", u.scheme()),
                ))
            }
            Err(e) => {
                return Err(invalid(
                    "upstream.base_url",
                    format!("Invalid base URL '{}': {}", self.upstream.base_url, e),
                ))
            }
        }
        if self.upstream.timeout_ms == 0 {
            return Err(invalid("upstream.timeout_ms", "Timeout must be positive"));
        }
        if self.cache.max_size == 0 {
            return Err(invalid("cache.max_size", "Cache size must be positive"));
        }
        let d = &self.diffusion;
        if d.max_steps == 0 || d.max_steps > 100 {
            return Err(invalid(
                "diffusion.max_steps",
                "Max diffusion steps must be between 1 and 100",
            ));
        }
        if d.default_steps == 0 || d.default_steps > d.max_steps {
            return Err(invalid(
                "diffusion.default_steps",
                format!("Default steps must be between 1 and {}", d.max_steps),
            ));
        }
        if !(0.0..=2.0).contains(&d.default_temperature) {
            return Err(invalid(
                "diffusion.default_temperature",
                "Temperature must be between 0 and 2",
            ));
        }
        if !(0.0..=1.0).contains(&d.stability_threshold) {
            return Err(invalid(
                "diffusion.stability_threshold",
                "Stability threshold must be between 0 and 1",
            ));
        }
        if self.default_model.trim().is_empty() {
            return Err(invalid("default_model", "Default model must not be empty"));
        }
        Ok(())
    }
}

fn invalid(field: &str, msg: impl Into<String>) -> Error {
    Error::configuration_with_context(
        msg,
        ErrorContext::new()
            .with_field_path(field)
            .with_source("config_validator"),
    )
}

fn parse_env<T: FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| {
        Error::configuration_with_context(
            format!("Invalid value for {}: {}", name, e),
            ErrorContext::new()
                .with_field_path(name)
                .with_details(raw.to_string())
                .with_source("config_loader"),
        )
    })
}
