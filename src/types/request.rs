//! Upstream request bodies.

use super::message::Message;
use super::tool::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One stop string or a list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopSequence {
    One(String),
    Many(Vec<String>),
}

/// How noise is removed across diffusion steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseSchedule {
    Linear,
    Cosine,
    Exponential,
}

/// `POST /chat/completions` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopSequence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    /// `"none"`, `"auto"`, or `{type: "function", function: {name}}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diffusion_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_schedule: Option<NoiseSchedule>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

impl ChatCompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop: None,
            user: None,
            tools: None,
            tool_choice: None,
            diffusion_steps: None,
            noise_schedule: None,
            stream: false,
        }
    }
}

/// `POST /fim/completions` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FimCompletionRequest {
    pub model: String,
    /// Code before the cursor
    pub prompt: String,
    /// Code after the cursor
    pub suffix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopSequence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_middle_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diffusion_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative_completions: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_request_omits_unset_fields() {
        let mut req = ChatCompletionRequest::new("mercury-coder-small", vec![Message::user("hi")]);
        req.diffusion_steps = Some(20);
        req.stop = Some(StopSequence::One("\n".into()));
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(
            v,
            json!({
                "model": "mercury-coder-small",
                "messages": [{"role": "user", "content": "hi"}],
                "stop": "\n",
                "diffusion_steps": 20
            })
        );

        req.stream = true;
        req.noise_schedule = Some(NoiseSchedule::Cosine);
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["stream"], true);
        assert_eq!(v["noise_schedule"], "cosine");
    }

    #[test]
    fn test_stop_accepts_string_or_list() {
        let one: StopSequence = serde_json::from_value(json!("END")).unwrap();
        assert_eq!(one, StopSequence::One("END".into()));
        let many: StopSequence = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert_eq!(many, StopSequence::Many(vec!["a".into(), "b".into()]));
    }
}
