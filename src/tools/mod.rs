//! # Tools Module
//!
//! The gateway's tool surface: the dispatcher, the wire shapes it speaks, and
//! the four diffusion-LLM tools.
//!
//! | Tool | Upstream call |
//! |------|---------------|
//! | `chat_completion` | `POST /chat/completions` |
//! | `chat_completion_stream` | `POST /chat/completions` with `stream: true` |
//! | `fim_completion` | `POST /fim/completions` |
//! | `list_models` | `GET /models` |
//!
//! Handlers never let an upstream failure escape as `Err`; they classify it
//! into an [`ErrorEnvelope`] so callers see a `type` they can act on.

pub mod chat;
pub mod dispatcher;
pub mod envelope;
pub mod fim;
pub mod models;
pub mod stream;

pub use chat::ChatCompletionTool;
pub use dispatcher::{Tool, ToolDispatcher, ToolDispatcherBuilder};
pub use envelope::{ContentBlock, ErrorEnvelope, ToolDescriptor, ToolInvocation, ToolResponse};
pub use fim::FimCompletionTool;
pub use models::ListModelsTool;
pub use stream::StreamingChatTool;

use crate::cache::ResponseCache;
use crate::client::UpstreamClient;
use crate::config::{DiffusionConfig, GatewayConfig};
use crate::error::ErrorContext;
use crate::error_kind::ErrorKind;
use crate::{Error, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Shared state handed to every tool.
#[derive(Clone)]
pub struct ToolContext {
    pub client: Arc<UpstreamClient>,
    pub cache: Arc<ResponseCache>,
    pub config: Arc<GatewayConfig>,
}

impl ToolContext {
    pub fn new(client: Arc<UpstreamClient>, cache: Arc<ResponseCache>, config: Arc<GatewayConfig>) -> Self {
        Self {
            client,
            cache,
            config,
        }
    }
}

/// Dispatcher with all four tools registered.
pub fn default_dispatcher(ctx: &ToolContext) -> Result<ToolDispatcher> {
    ToolDispatcher::builder()
        .register(Arc::new(ChatCompletionTool::new(ctx.clone())))
        .register(Arc::new(StreamingChatTool::new(ctx.clone())))
        .register(Arc::new(FimCompletionTool::new(ctx.clone())))
        .register(Arc::new(ListModelsTool::new(ctx.clone())))
        .build()
}

/// Unset or zero temperature; only these results are cached.
pub(crate) fn is_deterministic(params: &Value) -> bool {
    match params.get("temperature") {
        None | Some(Value::Null) => true,
        Some(t) => t.as_f64() == Some(0.0),
    }
}

/// Requested steps, or the default, clamped to `max_steps`.
pub(crate) fn resolve_steps(requested: Option<u32>, diffusion: &DiffusionConfig) -> u32 {
    requested
        .unwrap_or(diffusion.default_steps)
        .clamp(1, diffusion.max_steps.max(1))
}

/// Envelope for an upstream failure; convergence failures get a step hint.
///
/// A convergence failure whose body carried no diagnostics is reported
/// against the steps that were requested.
pub(crate) fn failure_envelope(err: &Error, steps: u32, diffusion: &DiffusionConfig) -> ErrorEnvelope {
    let mut envelope = ErrorEnvelope::from_error(err);
    if envelope.kind != ErrorKind::ModelConvergence {
        return envelope;
    }
    if envelope.metadata.is_none() {
        let retry_after = envelope.retry_after;
        envelope = ErrorEnvelope::from_error(&Error::Convergence {
            steps_completed: steps,
            confidence: None,
        });
        envelope.retry_after = retry_after;
    }
    let suggested = ((steps as f64 * 1.5).ceil() as u32).min(diffusion.max_steps);
    envelope.with_field("suggested_steps", suggested)
}

/// Arguments that passed the schema but do not decode into the request type.
pub(crate) fn invalid_arguments(err: serde_json::Error) -> Error {
    Error::validation_with_context(
        format!("Invalid input parameters: {}", err),
        ErrorContext::new().with_source("tool_arguments"),
    )
}

pub(crate) fn tokens_per_second(tokens: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        tokens as f64 / secs
    } else {
        0.0
    }
}

pub(crate) fn performance(tokens: u64, elapsed: Duration) -> Value {
    json!({
        "latency_ms": elapsed.as_millis() as u64,
        "tokens_per_second": tokens_per_second(tokens, elapsed),
    })
}

/// Fill in the configured default model when the caller left it out.
pub(crate) fn with_default_model(mut params: Value, config: &GatewayConfig) -> Value {
    if let Some(obj) = params.as_object_mut() {
        let missing = obj
            .get("model")
            .and_then(Value::as_str)
            .map_or(true, str::is_empty);
        if missing {
            obj.insert("model".into(), json!(config.default_model));
        }
    }
    params
}

/// Input schema for a chat message list.
pub(crate) fn messages_schema() -> Value {
    json!({
        "type": "array",
        "description": "Conversation so far, oldest first",
        "minItems": 1,
        "errorMessage": {"minItems": "At least one message is required"},
        "items": {
            "type": "object",
            "properties": {
                "role": {
                    "type": "string",
                    "enum": ["system", "user", "assistant"]
                },
                "content": {
                    "type": "string",
                    "minLength": 1,
                    "errorMessage": {"minLength": "Message content cannot be empty"}
                },
                "name": {"type": "string"}
            },
            "required": ["role", "content"]
        }
    })
}
