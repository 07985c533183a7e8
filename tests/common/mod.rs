//! Shared fixtures: a scripted transport and canned upstream bodies.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use diffusion_gateway::client::{Operation, RequestSpec, RetryPolicy, UpstreamClientBuilder};
use diffusion_gateway::transport::{HttpReply, Transport, TransportError};
use diffusion_gateway::{Error, Result, UpstreamClient};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted upstream reaction.
pub enum Step {
    Reply {
        status: u16,
        retry_after: Option<Duration>,
        body: Vec<Result<Bytes>>,
    },
    ConnectionError(&'static str),
    /// Never answers; only a timeout ends the attempt
    Hang,
}

impl Step {
    pub fn json(status: u16, body: Value) -> Self {
        Step::Reply {
            status,
            retry_after: None,
            body: vec![Ok(Bytes::from(body.to_string()))],
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::json(200, body)
    }

    pub fn error(status: u16, error_type: &str, message: &str) -> Self {
        Self::json(
            status,
            json!({"error": {"message": message, "type": error_type}}),
        )
    }

    pub fn rate_limited(retry_after: Duration) -> Self {
        Step::Reply {
            status: 429,
            retry_after: Some(retry_after),
            body: vec![Ok(Bytes::from(
                json!({"error": {"message": "Too many requests", "type": "rate_limit_exceeded"}})
                    .to_string(),
            ))],
        }
    }

    /// SSE body, one read per event, terminated by `[DONE]`.
    pub fn sse(events: &[Value]) -> Self {
        let mut body: Vec<Result<Bytes>> = events
            .iter()
            .map(|e| Ok(Bytes::from(format!("data: {}\n\n", e))))
            .collect();
        body.push(Ok(Bytes::from_static(b"data: [DONE]\n\n")));
        Step::Reply {
            status: 200,
            retry_after: None,
            body,
        }
    }

    /// SSE body that breaks after `events`.
    pub fn sse_then_reset(events: &[Value]) -> Self {
        let mut body: Vec<Result<Bytes>> = events
            .iter()
            .map(|e| Ok(Bytes::from(format!("data: {}\n\n", e))))
            .collect();
        body.push(Err(Error::Transport(TransportError::Connection(
            "connection reset by peer".to_string(),
        ))));
        Step::Reply {
            status: 200,
            retry_after: None,
            body,
        }
    }
}

/// What the transport was asked to send.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub operation: Operation,
    pub body: Option<Value>,
    pub request_id: String,
    pub stream: bool,
}

pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    seen: Mutex<Vec<Recorded>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, spec: &RequestSpec, request_id: &str) -> Result<HttpReply> {
        self.seen.lock().unwrap().push(Recorded {
            operation: spec.operation,
            body: spec.body.clone(),
            request_id: request_id.to_string(),
            stream: spec.stream,
        });
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            None => Err(Error::runtime("script exhausted")),
            Some(Step::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Some(Step::ConnectionError(msg)) => Err(Error::Transport(TransportError::Connection(
                msg.to_string(),
            ))),
            Some(Step::Reply {
                status,
                retry_after,
                body,
            }) => Ok(HttpReply {
                status,
                reason: String::new(),
                retry_after,
                upstream_request_id: Some(format!("up-{}", request_id)),
                body: Box::pin(futures::stream::iter(body)),
            }),
        }
    }
}

pub fn policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries, Duration::from_secs(1), Duration::from_secs(10))
}

pub fn client(transport: &Arc<ScriptedTransport>, policy: RetryPolicy) -> UpstreamClient {
    let transport: Arc<dyn Transport> = transport.clone();
    UpstreamClientBuilder::new()
        .api_key("test-key")
        .timeout(Duration::from_secs(30))
        .retry_policy(policy)
        .with_transport(transport)
        .build()
        .unwrap()
}

pub fn chat_body(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "created": 1_700_000_000,
        "model": "mercury-coder-small",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop",
            "diffusion_metadata": {
                "steps_completed": 20,
                "noise_reduction_ratio": 0.97,
                "confidence_score": 0.93
            }
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
    })
}

pub fn delta(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "model": "mercury-coder-small",
        "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
    })
}

pub fn fim_body(choices: &[(&str, f64)]) -> Value {
    let choices: Vec<Value> = choices
        .iter()
        .enumerate()
        .map(|(i, (text, conf))| {
            json!({"index": i, "text": text, "finish_reason": "stop", "confidence_score": conf})
        })
        .collect();
    json!({
        "id": "fim-1",
        "created": 1_700_000_000,
        "model": "mercury-coder-small",
        "choices": choices,
        "usage": {"prompt_tokens": 30, "completion_tokens": 6, "total_tokens": 36}
    })
}
