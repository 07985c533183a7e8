use super::dispatcher::Tool;
use super::envelope::{ErrorEnvelope, ToolDescriptor, ToolResponse};
use super::ToolContext;
use crate::types::Model;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

pub const MODELS_TOOL: &str = "list_models";

const CACHE_KEY: &str = "models:list";
const CACHE_TTL: Duration = Duration::from_secs(3600);
const DEFAULT_CONTEXT_WINDOW: u64 = 32768;

/// Lists upstream models, enriched with what the gateway knows about them.
pub struct ListModelsTool {
    ctx: ToolContext,
}

impl ListModelsTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

fn recommended_use_cases(model_id: &str) -> Vec<&'static str> {
    match model_id {
        "mercury-coder-small" => vec![
            "Code generation and completion",
            "Fill-in-the-middle code editing",
            "Technical documentation",
            "API development",
            "Bug fixing and refactoring",
        ],
        "mercury-coder-large" => vec![
            "Complex code generation",
            "Large-scale refactoring",
            "Architecture design",
            "Multi-file code analysis",
            "Advanced algorithm implementation",
        ],
        "mercury-general" => vec![
            "General text generation",
            "Content creation",
            "Summarization",
            "Translation",
            "Question answering",
        ],
        _ => vec!["General purpose text generation"],
    }
}

fn iso_created(secs: i64) -> Option<String> {
    DateTime::from_timestamp(secs, 0).map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub(crate) fn enrich(model: &Model) -> Value {
    json!({
        "id": model.id,
        "name": model.id,
        "owned_by": model.owned_by,
        "created": iso_created(model.created),
        "capabilities": model.capabilities.clone().unwrap_or_default(),
        "specifications": {
            "context_window": model.context_window.unwrap_or(DEFAULT_CONTEXT_WINDOW),
            "training_cutoff": model.training_cutoff.as_deref().unwrap_or("Unknown"),
            "supports_fim": model.id.contains("coder"),
            "supports_streaming": true,
            "supports_tools": true,
            "diffusion_based": true,
            "recommended_use_cases": recommended_use_cases(&model.id),
        }
    })
}

/// Returned alongside a failure so callers can still pick a model.
fn fallback(default_model: &str) -> Value {
    json!({
        "models": [{
            "id": default_model,
            "owned_by": "inception-labs",
            "capabilities": ["chat", "fim", "streaming"],
            "specifications": {
                "context_window": DEFAULT_CONTEXT_WINDOW,
                "supports_fim": default_model.contains("coder"),
                "supports_streaming": true,
                "supports_tools": true,
                "diffusion_based": true
            }
        }]
    })
}

#[async_trait]
impl Tool for ListModelsTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: MODELS_TOOL.to_string(),
            description: "List available diffusion models with context windows, FIM support \
                          and recommended use cases."
                .to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        }
    }

    async fn run(&self, _params: Value) -> Result<ToolResponse> {
        let start = Instant::now();
        let cache = &self.ctx.cache;
        let default_model = self.ctx.config.default_model.as_str();

        if let Some(hit) = cache.get::<ToolResponse>(CACHE_KEY).await {
            info!(tool = MODELS_TOOL, "served from cache");
            return Ok(hit);
        }

        let (list, _stats) = match self.ctx.client.list_models().await {
            Ok(ok) => ok,
            Err(err) => {
                warn!(tool = MODELS_TOOL, error = %err, "model listing failed");
                return Ok(ErrorEnvelope::from_error(&err)
                    .with_field("fallback", fallback(default_model))
                    .into_response());
            }
        };
        let elapsed = start.elapsed();

        let models: Vec<Value> = list.data.iter().map(enrich).collect();
        let count = models.len();
        let result = ToolResponse::json(&json!({
            "models": models,
            "default_model": default_model,
            "total_models": count,
        }))
        .with_metadata(json!({
            "cached": false,
            "fetch_duration_ms": elapsed.as_millis() as u64,
            "model_count": count,
        }));

        cache.set(CACHE_KEY, &result, Some(CACHE_TTL)).await;

        info!(
            tool = MODELS_TOOL,
            duration_ms = elapsed.as_millis() as u64,
            models = count,
            "model list fetched"
        );
        Ok(result)
    }
}
