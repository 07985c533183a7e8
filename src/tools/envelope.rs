//! Tool wire shapes: descriptors, responses, and error envelopes.

use crate::client::classify;
use crate::error_kind::ErrorKind;
use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;

/// A tool as advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique within a dispatcher.
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's arguments.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// A `tools/call` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Content block within a tool response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            text: text.into(),
        }
    }
}

/// Result of a tool call; failures are data, not `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    #[serde(rename = "isError", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            is_error: false,
            content: vec![ContentBlock::text(text)],
            metadata: None,
        }
    }

    /// Pretty-printed JSON as a single text block.
    pub fn json(value: &Value) -> Self {
        let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        Self::text(text)
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Concatenated text of all content blocks.
    pub fn text_content(&self) -> String {
        self.content.iter().map(|c| c.text.as_str()).collect()
    }

    /// The inner `error` object of an error response.
    pub fn error_body(&self) -> Option<Value> {
        if !self.is_error {
            return None;
        }
        let first = self.content.first()?;
        let mut parsed: Value = serde_json::from_str(&first.text).ok()?;
        parsed.get_mut("error").map(Value::take)
    }

    /// `error.type` of an error response.
    pub fn error_type(&self) -> Option<String> {
        self.error_body()?
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Structured error rendered as `{"error": {"type", "message", ...}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEnvelope {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    pub retry_after: Option<Duration>,
    pub suggested_fix: Option<String>,
    pub metadata: Option<Value>,
    /// Kind-specific fields placed next to `type` and `message`
    pub extra: Map<String, Value>,
}

impl ErrorEnvelope {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.retryable(),
            retry_after: None,
            suggested_fix: kind.suggested_fix().map(str::to_string),
            metadata: None,
            extra: Map::new(),
        }
    }

    /// Classify `err` and carry its retry hint and metadata.
    pub fn from_error(err: &Error) -> Self {
        let c = classify(err);
        let mut env = Self::new(c.kind, err.user_message());
        env.retryable = c.retryable;
        env.retry_after = c.retry_after;
        env.metadata = c.metadata;
        match (c.kind, c.retry_after) {
            (ErrorKind::RateLimit, Some(wait)) => {
                env.with_suggested_fix(format!("Wait {} seconds before retrying", secs_ceil(wait)))
            }
            _ => env,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn with_suggested_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }

    pub fn to_value(&self) -> Value {
        let mut body = Map::new();
        body.insert("type".into(), json!(self.kind.name()));
        body.insert("message".into(), json!(self.message));
        body.insert("retryable".into(), json!(self.retryable));
        if let Some(wait) = self.retry_after {
            body.insert("retry_after".into(), json!(secs_ceil(wait)));
        }
        if let Some(fix) = &self.suggested_fix {
            body.insert("suggested_fix".into(), json!(fix));
        }
        if let Some(meta) = &self.metadata {
            body.insert("metadata".into(), meta.clone());
        }
        for (k, v) in &self.extra {
            body.entry(k.clone()).or_insert_with(|| v.clone());
        }
        json!({ "error": body })
    }

    pub fn into_response(self) -> ToolResponse {
        ToolResponse {
            is_error: true,
            content: vec![ContentBlock::text(self.to_value().to_string())],
            metadata: None,
        }
    }
}

impl From<ErrorEnvelope> for ToolResponse {
    fn from(envelope: ErrorEnvelope) -> Self {
        envelope.into_response()
    }
}

// Whole seconds, rounded up so a client never retries early
fn secs_ceil(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_response_omits_is_error() {
        let resp = ToolResponse::text("hello").with_metadata(json!({"model": "m"}));
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            v,
            json!({"content": [{"type": "text", "text": "hello"}], "metadata": {"model": "m"}})
        );
        assert!(resp.error_body().is_none());
    }

    #[test]
    fn test_envelope_wire_shape() {
        let resp = ErrorEnvelope::new(ErrorKind::ToolNotFound, "Unknown tool: nope")
            .with_field("available_tools", json!(["a", "b"]))
            .into_response();
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["isError"], true);
        assert_eq!(v["content"][0]["type"], "text");

        let body = resp.error_body().unwrap();
        assert_eq!(body["type"], "tool_not_found");
        assert_eq!(body["message"], "Unknown tool: nope");
        assert_eq!(body["retryable"], false);
        assert_eq!(body["available_tools"], json!(["a", "b"]));
        assert_eq!(
            body["suggested_fix"],
            "Call tools/list and use one of the available tool names"
        );
        assert!(body.get("retry_after").is_none());
    }

    #[test]
    fn test_extra_fields_do_not_override_core_fields() {
        let body = ErrorEnvelope::new(ErrorKind::Execution, "boom")
            .with_field("type", "other")
            .to_value();
        assert_eq!(body["error"]["type"], "execution_error");
    }

    #[test]
    fn test_from_rate_limited_remote_error() {
        let err = Error::Remote {
            status: 429,
            error_type: "rate_limit_exceeded".into(),
            code: None,
            message: "Too many requests".into(),
            retry_after: Some(Duration::from_millis(4500)),
            details: None,
        };
        let body = ErrorEnvelope::from_error(&err).to_value();
        assert_eq!(body["error"]["type"], "rate_limit_error");
        assert_eq!(body["error"]["message"], "Too many requests");
        assert_eq!(body["error"]["retryable"], true);
        assert_eq!(body["error"]["retry_after"], 5);
        assert_eq!(body["error"]["suggested_fix"], "Wait 5 seconds before retrying");
    }

    #[test]
    fn test_convergence_envelope_carries_hint() {
        let err = Error::Convergence {
            steps_completed: 20,
            confidence: Some(0.4),
        };
        let env = ErrorEnvelope::from_error(&err);
        assert_eq!(env.kind, ErrorKind::ModelConvergence);
        assert_eq!(
            env.suggested_fix.as_deref(),
            Some("Increase diffusion_steps or adjust temperature")
        );
        assert_eq!(env.metadata.unwrap()["steps_completed"], 20);
    }
}
