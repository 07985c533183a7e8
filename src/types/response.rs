//! Upstream response bodies.

use super::message::MessageRole;
use super::tool::ToolCall;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Per-choice diagnostics from the diffusion process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffusionMetadata {
    #[serde(default)]
    pub steps_completed: u32,
    #[serde(default)]
    pub noise_reduction_ratio: f64,
    #[serde(default)]
    pub confidence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default = "assistant_role")]
    pub role: MessageRole,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

fn assistant_role() -> MessageRole {
    MessageRole::Assistant
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: u32,
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diffusion_metadata: Option<DiffusionMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatCompletionResponse {
    /// Text of the first choice, empty when the model returned none.
    pub fn content(&self) -> &str {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or("")
    }

    pub fn first_choice(&self) -> Option<&ChatChoice> {
        self.choices.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FimChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FimMetadata {
    #[serde(default)]
    pub alternatives_generated: u32,
    #[serde(default)]
    pub best_confidence_score: f64,
    #[serde(default)]
    pub diffusion_steps_used: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FimCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<FimChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fim_metadata: Option<FimMetadata>,
}

impl FimCompletionResponse {
    /// The choice with the highest confidence; ties and missing scores keep
    /// the upstream order.
    pub fn best_choice(&self) -> Option<&FimChoice> {
        self.choices.iter().fold(None, |best: Option<&FimChoice>, c| match best {
            Some(b) if b.confidence_score.unwrap_or(0.0) >= c.confidence_score.unwrap_or(0.0) => {
                Some(b)
            }
            _ => Some(c),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub owned_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_cutoff: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelList {
    #[serde(default)]
    pub data: Vec<Model>,
}

/// Upstream error body: `{error: {message, type, code?}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default = "api_error_type")]
    pub error_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

fn api_error_type() -> String {
    "api_error".to_string()
}

impl ApiErrorBody {
    /// Parses an error body, falling back to `{message: <body or status text>,
    /// type: "api_error", code: <status>}` when it is absent or not JSON.
    pub fn parse(body: &[u8], status: u16, reason: &str) -> (Self, Option<Value>) {
        if let Ok(raw) = serde_json::from_slice::<Value>(body) {
            if let Some(detail) = raw.get("error").filter(|e| e.is_object()) {
                if let Ok(parsed) = serde_json::from_value::<ApiErrorDetail>(detail.clone()) {
                    let details = Some(detail.clone());
                    return (ApiErrorBody { error: parsed }, details);
                }
            }
        }
        let text = String::from_utf8_lossy(body);
        let message = if text.trim().is_empty() {
            reason.to_string()
        } else {
            text.trim().to_string()
        };
        let fallback = ApiErrorBody {
            error: ApiErrorDetail {
                message,
                error_type: api_error_type(),
                code: Some(Value::from(status)),
                param: None,
            },
        };
        (fallback, None)
    }
}
