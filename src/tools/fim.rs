use super::dispatcher::Tool;
use super::envelope::{ErrorEnvelope, ToolDescriptor, ToolResponse};
use super::{
    failure_envelope, invalid_arguments, is_deterministic, performance, resolve_steps,
    with_default_model, ToolContext,
};
use crate::cache::ResponseCache;
use crate::types::FimCompletionRequest;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{info, warn};

pub const FIM_TOOL: &str = "fim_completion";

const DEFAULT_MAX_TOKENS: u32 = 256;
const DEFAULT_TEMPERATURE: f64 = 0.2;
const LOW_CONFIDENCE: f64 = 0.7;
const CACHEABLE_CONFIDENCE: f64 = 0.8;

/// Fill-in-the-middle completion between a prefix and a suffix.
///
/// Several alternatives may be generated; the highest-confidence one becomes
/// the response text and all of them are reported in metadata.
pub struct FimCompletionTool {
    ctx: ToolContext,
}

impl FimCompletionTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    fn build_request(&self, params: Value) -> Result<FimCompletionRequest> {
        let diffusion = &self.ctx.config.diffusion;
        let mut request: FimCompletionRequest =
            serde_json::from_value(with_default_model(params, &self.ctx.config)).map_err(invalid_arguments)?;
        request.max_tokens = Some(
            request
                .max_middle_tokens
                .or(request.max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
        );
        request.diffusion_steps = Some(resolve_steps(request.diffusion_steps, diffusion));
        request.temperature = Some(request.temperature.unwrap_or(DEFAULT_TEMPERATURE));
        request.alternative_completions = Some(request.alternative_completions.unwrap_or(1));
        Ok(request)
    }
}

fn fim_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "model": {"type": "string"},
            "prompt": {"type": "string", "description": "Code before the insertion point"},
            "suffix": {"type": "string", "description": "Code after the insertion point"},
            "max_tokens": {"type": "integer", "minimum": 1, "maximum": 4096},
            "temperature": {"type": "number", "minimum": 0, "maximum": 2},
            "top_p": {"type": "number", "minimum": 0, "maximum": 1},
            "stop": {
                "anyOf": [
                    {"type": "string"},
                    {"type": "array", "items": {"type": "string"}}
                ]
            },
            "max_middle_tokens": {
                "type": "integer",
                "minimum": 1,
                "maximum": 2048,
                "description": "Tokens to generate between prefix and suffix"
            },
            "diffusion_steps": {"type": "integer", "minimum": 1, "maximum": 100},
            "alternative_completions": {
                "type": "integer",
                "minimum": 1,
                "maximum": 5,
                "description": "Candidates to generate; the most confident one is returned"
            }
        },
        "required": ["prompt", "suffix"]
    })
}

#[async_trait]
impl Tool for FimCompletionTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: FIM_TOOL.to_string(),
            description: "Fill in code between a prefix and a suffix. The diffusion model sees \
                          both sides at once, so the middle fits the surrounding code."
                .to_string(),
            input_schema: fim_schema(),
        }
    }

    async fn run(&self, params: Value) -> Result<ToolResponse> {
        let start = Instant::now();
        let cache = &self.ctx.cache;
        let diffusion = &self.ctx.config.diffusion;

        let is_empty = |key: &str| params.get(key).and_then(Value::as_str).map_or(true, str::is_empty);
        if is_empty("prompt") && is_empty("suffix") {
            let err = Error::FimBoundary {
                message: "At least one of prompt or suffix must be provided".to_string(),
            };
            return Ok(ErrorEnvelope::from_error(&err).into_response());
        }

        let cache_key = is_deterministic(&params).then(|| ResponseCache::generate_key("fim", &params));
        if let Some(key) = &cache_key {
            if let Some(hit) = cache.get::<ToolResponse>(key).await {
                info!(tool = FIM_TOOL, "served from cache");
                return Ok(hit);
            }
        }

        let request = match self.build_request(params) {
            Ok(request) => request,
            Err(err) => return Ok(ErrorEnvelope::from_error(&err).into_response()),
        };
        let steps = request.diffusion_steps.unwrap_or(diffusion.default_steps);
        let wanted = request.alternative_completions.unwrap_or(1).max(1) as usize;
        info!(
            tool = FIM_TOOL,
            model = request.model.as_str(),
            prefix_len = request.prompt.len(),
            suffix_len = request.suffix.len(),
            alternatives = wanted,
            "sending FIM completion"
        );

        let (mut response, stats) = match self.ctx.client.fim_completion(&request).await {
            Ok(ok) => ok,
            Err(err) => {
                warn!(tool = FIM_TOOL, error = %err, "FIM completion failed");
                return Ok(failure_envelope(&err, steps, diffusion).into_response());
            }
        };
        let elapsed = start.elapsed();

        response.choices.truncate(wanted);
        let Some(best) = response.best_choice().cloned() else {
            return Err(Error::runtime("upstream returned no completions"));
        };

        if let Some(meta) = &response.fim_metadata {
            if meta.best_confidence_score < LOW_CONFIDENCE {
                warn!(
                    score = meta.best_confidence_score,
                    alternatives = meta.alternatives_generated,
                    "low FIM confidence"
                );
            }
        }

        let alternatives: Vec<Value> = response
            .choices
            .iter()
            .map(|c| json!({"text": c.text, "confidence": c.confidence_score}))
            .collect();
        let usage = response.usage.clone().unwrap_or_default();
        let result = ToolResponse::text(best.text.clone()).with_metadata(json!({
            "model": response.model,
            "usage": usage,
            "finish_reason": best.finish_reason,
            "confidence": best.confidence_score,
            "alternatives": alternatives,
            "performance": performance(usage.completion_tokens, elapsed),
            "fim": response.fim_metadata,
            "attempts": stats.total_attempts(),
        }));

        let confident = best.confidence_score.map_or(false, |c| c > CACHEABLE_CONFIDENCE);
        if let (Some(key), true) = (&cache_key, confident) {
            cache.set(key, &result, Some(cache.default_ttl() * 2)).await;
        }

        info!(
            tool = FIM_TOOL,
            duration_ms = elapsed.as_millis() as u64,
            completion_tokens = usage.completion_tokens,
            confidence = best.confidence_score.unwrap_or_default(),
            alternatives = alternatives.len(),
            "FIM completion succeeded"
        );
        Ok(result)
    }
}
