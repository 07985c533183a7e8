use super::dispatcher::Tool;
use super::envelope::{ErrorEnvelope, ToolDescriptor, ToolResponse};
use super::{
    failure_envelope, invalid_arguments, is_deterministic, messages_schema, performance,
    resolve_steps, with_default_model, ToolContext,
};
use crate::cache::ResponseCache;
use crate::types::ChatCompletionRequest;
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{info, warn};

pub const CHAT_TOOL: &str = "chat_completion";

/// Single-shot chat completion. Deterministic requests are served from cache.
pub struct ChatCompletionTool {
    ctx: ToolContext,
}

impl ChatCompletionTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

/// Input schema shared by the buffered and streaming chat tools.
pub(crate) fn chat_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "model": {
                "type": "string",
                "description": "Model id; defaults to the gateway's configured model"
            },
            "messages": messages_schema(),
            "temperature": {"type": "number", "minimum": 0, "maximum": 2},
            "max_tokens": {"type": "integer", "minimum": 1, "maximum": 32000},
            "top_p": {"type": "number", "minimum": 0, "maximum": 1},
            "frequency_penalty": {"type": "number", "minimum": -2, "maximum": 2},
            "presence_penalty": {"type": "number", "minimum": -2, "maximum": 2},
            "stop": {
                "anyOf": [
                    {"type": "string"},
                    {"type": "array", "items": {"type": "string"}}
                ]
            },
            "user": {"type": "string"},
            "tools": {"type": "array", "items": function_tool_schema()},
            "tool_choice": {
                "anyOf": [
                    {"type": "string", "enum": ["none", "auto"]},
                    {
                        "type": "object",
                        "properties": {
                            "type": {"const": "function"},
                            "function": {
                                "type": "object",
                                "properties": {"name": {"type": "string"}},
                                "required": ["name"]
                            }
                        },
                        "required": ["type", "function"]
                    }
                ]
            },
            "diffusion_steps": {
                "type": "integer",
                "minimum": 1,
                "maximum": 100,
                "description": "Denoising steps; more steps trade latency for quality"
            },
            "noise_schedule": {
                "type": "string",
                "enum": ["linear", "cosine", "exponential"]
            }
        },
        "required": ["messages"]
    })
}

/// A function the model may call.
fn function_tool_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "type": {"const": "function"},
            "function": {
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "description": {"type": "string"},
                    "parameters": {"type": "object"}
                },
                "required": ["name", "description", "parameters"]
            }
        },
        "required": ["type", "function"]
    })
}

/// Typed request with gateway defaults applied.
pub(crate) fn build_request(params: Value, ctx: &ToolContext) -> Result<ChatCompletionRequest> {
    let diffusion = &ctx.config.diffusion;
    let mut request: ChatCompletionRequest =
        serde_json::from_value(with_default_model(params, &ctx.config)).map_err(invalid_arguments)?;
    request.diffusion_steps = Some(resolve_steps(request.diffusion_steps, diffusion));
    request.temperature = Some(request.temperature.unwrap_or(diffusion.default_temperature));
    Ok(request)
}

#[async_trait]
impl Tool for ChatCompletionTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: CHAT_TOOL.to_string(),
            description: "Generate a chat completion with the diffusion model. All tokens are \
                          refined in parallel over `diffusion_steps` denoising passes; raise the \
                          step count for harder prompts."
                .to_string(),
            input_schema: chat_schema(),
        }
    }

    async fn run(&self, params: Value) -> Result<ToolResponse> {
        let start = Instant::now();
        let cache = &self.ctx.cache;
        let diffusion = &self.ctx.config.diffusion;

        let cache_key = is_deterministic(&params).then(|| ResponseCache::generate_key("chat", &params));
        if let Some(key) = &cache_key {
            if let Some(hit) = cache.get::<ToolResponse>(key).await {
                info!(tool = CHAT_TOOL, "served from cache");
                return Ok(hit);
            }
        }

        let request = match build_request(params, &self.ctx) {
            Ok(request) => request,
            Err(err) => return Ok(ErrorEnvelope::from_error(&err).into_response()),
        };
        let steps = request.diffusion_steps.unwrap_or(diffusion.default_steps);
        info!(
            tool = CHAT_TOOL,
            model = request.model.as_str(),
            messages = request.messages.len(),
            diffusion_steps = steps,
            "sending chat completion"
        );

        let (response, stats) = match self.ctx.client.chat_completion(&request).await {
            Ok(ok) => ok,
            Err(err) => {
                warn!(tool = CHAT_TOOL, error = %err, "chat completion failed");
                return Ok(failure_envelope(&err, steps, diffusion).into_response());
            }
        };
        let elapsed = start.elapsed();

        let Some(choice) = response.first_choice() else {
            return Err(crate::Error::runtime("upstream returned no choices"));
        };
        if let Some(meta) = &choice.diffusion_metadata {
            if meta.confidence_score < diffusion.stability_threshold {
                warn!(
                    score = meta.confidence_score,
                    threshold = diffusion.stability_threshold,
                    "low confidence generation"
                );
            }
        }

        let text = match (&choice.message.content, &choice.message.tool_calls) {
            (Some(content), _) => content.clone(),
            (None, Some(calls)) => serde_json::to_string_pretty(calls)?,
            (None, None) => String::new(),
        };
        let usage = response.usage.clone().unwrap_or_default();
        let mut metadata = json!({
            "model": response.model,
            "usage": usage,
            "finish_reason": choice.finish_reason,
            "performance": performance(usage.completion_tokens, elapsed),
            "diffusion": choice.diffusion_metadata,
            "attempts": stats.total_attempts(),
        });
        if let Some(calls) = &choice.message.tool_calls {
            metadata["tool_calls"] = serde_json::to_value(calls)?;
        }
        let result = ToolResponse::text(text).with_metadata(metadata);

        if let Some(key) = &cache_key {
            cache.set(key, &result, None).await;
        }

        info!(
            tool = CHAT_TOOL,
            duration_ms = elapsed.as_millis() as u64,
            total_tokens = usage.total_tokens,
            finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
            "chat completion succeeded"
        );
        Ok(result)
    }
}
